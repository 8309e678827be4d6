//! 积分流水与余额

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 积分流水记录
///
/// 只追加，不修改不删除。amount 为正表示入账，为负表示提现。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub order_number: String,
    pub owner: String,
    pub amount: i64,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_withdrawal(&self) -> bool {
        self.amount < 0
    }
}

/// 用户积分余额（最小货币单位）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// 当前可用余额
    pub current: i64,
    /// 累计提现
    pub withdrawn: i64,
}

impl Balance {
    /// 折叠流水得到余额
    ///
    /// 结果与流水顺序无关
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        entries.into_iter().fold(Self::default(), |mut acc, entry| {
            acc.apply(entry.amount);
            acc
        })
    }

    /// 计入一笔金额
    pub fn apply(&mut self, amount: i64) {
        self.current += amount;
        if amount < 0 {
            self.withdrawn -= amount;
        }
    }

    /// 余额是否足以支付 amount
    pub fn covers(&self, amount: i64) -> bool {
        amount <= self.current
    }
}

/// 提现写入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalOutcome {
    /// 已记录提现流水
    Recorded(LedgerEntry),
    /// 余额不足，未写入
    InsufficientFunds { available: i64 },
}
