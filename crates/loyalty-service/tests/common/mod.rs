//! 集成测试公共工具
//!
//! 提供按脚本应答的积分系统替身和常用的数据准备函数

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use loyalty::{
    AccrualClient, AccrualError, AccrualPoller, AccrualVerdict, LedgerRepositoryTrait, MemoryStore,
    OrderRepositoryTrait, OrderStatus, PollerConfig,
};
use parking_lot::Mutex;

/// 积分系统的一次应答
#[derive(Debug, Clone)]
pub enum Reply {
    Registered,
    Processing,
    Processed(i64),
    Invalid,
    NotRegistered,
    ServerError,
    RateLimited(Duration),
    /// 永不返回，用于验证停止信号能打断查询阶段
    Hang,
}

/// 按脚本应答的积分系统替身
///
/// 每个订单一个应答队列，队列只剩最后一条时重复返回它；
/// 未配置脚本的订单视为尚未登记
#[derive(Default)]
pub struct ScriptedAccrual {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
}

impl ScriptedAccrual {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, number: &str, replies: impl IntoIterator<Item = Reply>) {
        self.replies
            .lock()
            .insert(number.to_string(), replies.into_iter().collect());
    }

    pub fn calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, number: &str) -> usize {
        self.calls.lock().get(number).copied().unwrap_or(0)
    }

    fn next_reply(&self, number: &str) -> Reply {
        let mut replies = self.replies.lock();
        match replies.get_mut(number) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::NotRegistered),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::NotRegistered),
            None => Reply::NotRegistered,
        }
    }
}

#[async_trait]
impl AccrualClient for ScriptedAccrual {
    async fn fetch(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(number.to_string()).or_default() += 1;

        let reply = self.next_reply(number);
        match reply {
            Reply::Registered => Ok(AccrualVerdict {
                order: number.to_string(),
                status: OrderStatus::New,
                accrual: 0,
            }),
            Reply::Processing => Ok(AccrualVerdict::processing(number)),
            Reply::Processed(accrual) => Ok(AccrualVerdict::processed(number, accrual)),
            Reply::Invalid => Ok(AccrualVerdict::invalid(number)),
            Reply::NotRegistered => Err(AccrualError::NotRegistered),
            Reply::ServerError => Err(AccrualError::Server(503)),
            Reply::RateLimited(retry_after) => Err(AccrualError::RateLimited { retry_after }),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// 间隔很短的轮询器，用于 run 循环测试
pub fn fast_poller(store: &MemoryStore, client: Arc<ScriptedAccrual>) -> AccrualPoller {
    AccrualPoller::new(
        Arc::new(store.clone()),
        client,
        PollerConfig {
            interval: Duration::from_millis(10),
            max_in_flight: 4,
        },
    )
}

pub fn poller(store: &MemoryStore, client: Arc<ScriptedAccrual>) -> AccrualPoller {
    AccrualPoller::new(Arc::new(store.clone()), client, PollerConfig::default())
}

/// 提交订单并直接入账，作为提现测试的初始余额
pub async fn seed_credit(store: &MemoryStore, owner: &str, number: &str, amount: i64) {
    store.submit(number, owner).await.unwrap();
    store.append(number, amount).await.unwrap();
}

/// 轮询 `check` 直到返回 true 或超时
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
