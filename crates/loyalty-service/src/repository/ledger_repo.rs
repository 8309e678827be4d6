//! 积分流水仓储
//!
//! 流水只追加不修改，余额由流水折叠得到

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::traits::LedgerRepositoryTrait;
use crate::error::{LoyaltyError, Result};
use crate::models::{LedgerEntry, WithdrawalOutcome};

/// 积分流水仓储
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 在事务中写入流水
    pub async fn create_in_tx(
        tx: &mut PgConnection,
        order_number: &str,
        owner: &str,
        amount: i64,
    ) -> Result<LedgerEntry> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger (order_number, owner, amount, recorded_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, order_number, owner, amount, recorded_at
            "#,
        )
        .bind(order_number)
        .bind(owner)
        .bind(amount)
        .fetch_one(tx)
        .await?;

        Ok(entry)
    }

    /// 追加流水，归属用户取自订单表
    pub async fn append(&self, order_number: &str, amount: i64) -> Result<LedgerEntry> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO ledger (order_number, owner, amount, recorded_at)
            SELECT number, owner, $2, NOW()
            FROM orders
            WHERE number = $1
            RETURNING id, order_number, owner, amount, recorded_at
            "#,
        )
        .bind(order_number)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        entry.ok_or_else(|| LoyaltyError::OrderNotFound(order_number.to_string()))
    }

    /// 用户全部流水
    ///
    /// 单条查询，读到的是同一快照
    pub async fn entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, order_number, owner, amount, recorded_at
            FROM ledger
            WHERE owner = $1
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// 用户提现流水
    pub async fn withdrawal_entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, order_number, owner, amount, recorded_at
            FROM ledger
            WHERE owner = $1 AND amount < 0
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// 条件提现
    ///
    /// 事务级 advisory lock 按用户串行化提现，锁内重新计算余额后再写入，
    /// 同一用户的并发提现不会透支。锁在事务结束时自动释放。
    /// 订单号已由其他用户提交时返回 `OrderOwnedByOther`。
    pub async fn append_withdrawal(
        &self,
        owner: &str,
        order_number: &str,
        amount: i64,
    ) -> Result<WithdrawalOutcome> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        let registered: Option<String> =
            sqlx::query_scalar("SELECT owner FROM orders WHERE number = $1")
                .bind(order_number)
                .fetch_optional(&mut *tx)
                .await?;

        if registered.is_some_and(|o| o != owner) {
            tx.rollback().await?;
            return Err(LoyaltyError::OrderOwnedByOther {
                number: order_number.to_string(),
            });
        }

        let available: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM ledger WHERE owner = $1",
        )
        .bind(owner)
        .fetch_one(&mut *tx)
        .await?;

        if amount > available {
            tx.rollback().await?;
            return Ok(WithdrawalOutcome::InsufficientFunds { available });
        }

        let entry = Self::create_in_tx(&mut tx, order_number, owner, -amount).await?;
        tx.commit().await?;

        Ok(WithdrawalOutcome::Recorded(entry))
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn append(&self, order_number: &str, amount: i64) -> Result<LedgerEntry> {
        self.append(order_number, amount).await
    }

    async fn entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        self.entries_for_user(owner).await
    }

    async fn withdrawal_entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>> {
        self.withdrawal_entries_for_user(owner).await
    }

    async fn append_withdrawal(
        &self,
        owner: &str,
        order_number: &str,
        amount: i64,
    ) -> Result<WithdrawalOutcome> {
        self.append_withdrawal(owner, order_number, amount).await
    }
}
