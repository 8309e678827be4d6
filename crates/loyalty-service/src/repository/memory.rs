//! 内存存储
//!
//! 同时实现订单仓储和流水仓储，所有数据放在同一把锁下，
//! 作为库内适配器供测试使用，进程退出即丢失。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::traits::{LedgerRepositoryTrait, OrderRepositoryTrait};
use crate::error::{LoyaltyError, Result};
use crate::models::{
    AccrualVerdict, Balance, LedgerEntry, Order, OrderStatus, SubmitOutcome, WithdrawalOutcome,
};

#[derive(Debug, Default)]
struct State {
    /// 按提交顺序保存
    orders: Vec<Order>,
    index: HashMap<String, usize>,
    ledger: Vec<LedgerEntry>,
    next_entry_id: i64,
}

impl State {
    fn order(&self, number: &str) -> Option<&Order> {
        self.index.get(number).map(|&i| &self.orders[i])
    }

    fn push_entry(&mut self, order_number: &str, owner: &str, amount: i64) -> LedgerEntry {
        self.next_entry_id += 1;
        let entry = LedgerEntry {
            id: self.next_entry_id,
            order_number: order_number.to_string(),
            owner: owner.to_string(),
            amount,
            recorded_at: Utc::now(),
        };
        self.ledger.push(entry.clone());
        entry
    }
}

/// 故障注入计划，每项触发一次后清除
#[derive(Debug, Default)]
struct Faults {
    scan: bool,
    /// 应用第 n 条判定时失败
    apply_at: Option<usize>,
}

/// 单条判定的暂存结果，提交阶段统一写入
struct Staged {
    index: usize,
    status: OrderStatus,
    accrual: i64,
    credit: Option<(String, i64)>,
}

/// 内存订单与流水存储
///
/// 判定批次先全部暂存，全部成功后再一次性提交，失败时状态不变
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 下一次扫描待处理订单时返回存储错误
    pub fn fail_next_scan(&self) {
        self.faults.lock().scan = true;
    }

    /// 下一次应用判定批次时，在处理第 `at` 条（从 0 开始）时返回存储错误
    pub fn fail_next_apply_at(&self, at: usize) {
        self.faults.lock().apply_at = Some(at);
    }

    /// 按订单号读取订单
    pub fn order(&self, number: &str) -> Option<Order> {
        self.state.lock().order(number).cloned()
    }

    /// 全部流水
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.state.lock().ledger.clone()
    }

    /// 某个订单关联的流水
    pub fn entries_for_order(&self, number: &str) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .ledger
            .iter()
            .filter(|e| e.order_number == number)
            .cloned()
            .collect()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }

    fn stage(
        state: &State,
        staged: &HashMap<String, Staged>,
        verdict: &AccrualVerdict,
    ) -> Option<Staged> {
        let (index, current) = match staged.get(&verdict.order) {
            Some(s) => (s.index, s.status),
            None => {
                let index = *state.index.get(&verdict.order)?;
                (index, state.orders[index].status)
            }
        };

        let allowed = match verdict.status {
            OrderStatus::New => false,
            OrderStatus::Processing => current == OrderStatus::New,
            OrderStatus::Invalid | OrderStatus::Processed => !current.is_terminal(),
        };
        if !allowed {
            return None;
        }

        let accrual = match verdict.status {
            OrderStatus::Processing => state.orders[index].accrual,
            _ => verdict.accrual,
        };
        let credit = (verdict.status == OrderStatus::Processed && verdict.accrual > 0)
            .then(|| (state.orders[index].owner.clone(), verdict.accrual));

        Some(Staged {
            index,
            status: verdict.status,
            accrual,
            credit,
        })
    }
}

#[async_trait]
impl OrderRepositoryTrait for MemoryStore {
    async fn submit(&self, number: &str, owner: &str) -> Result<SubmitOutcome> {
        let mut state = self.state.lock();

        if let Some(existing) = state.order(number) {
            return Ok(if existing.owner == owner {
                SubmitOutcome::AlreadyOwnedBySelf
            } else {
                SubmitOutcome::AlreadyOwnedByOther
            });
        }

        let index = state.orders.len();
        state.orders.push(Order::new(number, owner));
        state.index.insert(number.to_string(), index);
        Ok(SubmitOutcome::Created)
    }

    async fn list_for_user(&self, owner: &str) -> Result<Vec<Order>> {
        let state = self.state.lock();
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.owner == owner)
            .cloned()
            .collect();
        // 稳定排序，时间相同时保持提交顺序
        orders.sort_by_key(|o| o.submitted_at);
        Ok(orders)
    }

    async fn list_pending(&self) -> Result<Vec<String>> {
        if std::mem::take(&mut self.faults.lock().scan) {
            return Err(LoyaltyError::Storage("injected scan failure".to_string()));
        }

        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .filter(|o| !o.status.is_terminal())
            .map(|o| o.number.clone())
            .collect())
    }

    async fn apply_verdicts(&self, verdicts: &[AccrualVerdict]) -> Result<u64> {
        let fail_at = self.faults.lock().apply_at.take();
        let mut state = self.state.lock();

        let mut staged: HashMap<String, Staged> = HashMap::new();
        let mut credits: Vec<(String, String, i64)> = Vec::new();
        let mut applied = 0u64;

        for (i, verdict) in verdicts.iter().enumerate() {
            if fail_at == Some(i) {
                return Err(LoyaltyError::Storage(format!(
                    "injected apply failure at verdict {}",
                    i
                )));
            }

            if let Some(mut change) = Self::stage(&state, &staged, verdict) {
                if let Some((owner, amount)) = change.credit.take() {
                    credits.push((verdict.order.clone(), owner, amount));
                }
                staged.insert(verdict.order.clone(), change);
                applied += 1;
            }
        }

        // 提交阶段
        for change in staged.into_values() {
            let order = &mut state.orders[change.index];
            order.status = change.status;
            order.accrual = change.accrual;
        }
        for (order_number, owner, amount) in credits {
            state.push_entry(&order_number, &owner, amount);
        }

        Ok(applied)
    }
}

#[async_trait]
impl LedgerRepositoryTrait for MemoryStore {
    async fn append(&self, order_number: &str, amount: i64) -> Result<LedgerEntry> {
        let mut state = self.state.lock();
        let owner = state
            .order(order_number)
            .map(|o| o.owner.clone())
            .ok_or_else(|| LoyaltyError::OrderNotFound(order_number.to_string()))?;
        Ok(state.push_entry(order_number, &owner, amount))
    }

    async fn entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock();
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.owner == owner)
            .cloned()
            .collect())
    }

    async fn withdrawal_entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        let state = self.state.lock();
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.owner == owner && e.is_withdrawal())
            .cloned()
            .collect())
    }

    async fn append_withdrawal(
        &self,
        owner: &str,
        order_number: &str,
        amount: i64,
    ) -> Result<WithdrawalOutcome> {
        let mut state = self.state.lock();
        if state.order(order_number).is_some_and(|o| o.owner != owner) {
            return Err(LoyaltyError::OrderOwnedByOther {
                number: order_number.to_string(),
            });
        }

        let balance = Balance::from_entries(state.ledger.iter().filter(|e| e.owner == owner));

        if !balance.covers(amount) {
            return Ok(WithdrawalOutcome::InsufficientFunds {
                available: balance.current,
            });
        }

        Ok(WithdrawalOutcome::Recorded(state.push_entry(
            order_number,
            owner,
            -amount,
        )))
    }
}
