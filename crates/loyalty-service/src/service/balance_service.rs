//! 余额服务
//!
//! 余额不单独存储，每次查询由用户流水折叠得到

use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::models::{Balance, LedgerEntry};
use crate::repository::LedgerRepositoryTrait;

/// 余额服务
pub struct BalanceService<LR>
where
    LR: LedgerRepositoryTrait,
{
    ledger_repo: Arc<LR>,
}

impl<LR> BalanceService<LR>
where
    LR: LedgerRepositoryTrait,
{
    pub fn new(ledger_repo: Arc<LR>) -> Self {
        Self { ledger_repo }
    }

    /// 当前余额与累计提现
    ///
    /// 只读一次流水，结果对应同一时刻的快照
    #[instrument(skip(self))]
    pub async fn balance(&self, owner: &str) -> Result<Balance> {
        let entries = self.ledger_repo.entries_for_user(owner).await?;
        Ok(Balance::from_entries(&entries))
    }

    /// 提现记录，按时间升序
    #[instrument(skip(self))]
    pub async fn withdrawals(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        self.ledger_repo.withdrawal_entries_for_user(owner).await
    }
}
