//! 订单仓储
//!
//! 订单表的数据访问，以及积分判定的原子落库

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use super::ledger_repo::LedgerRepository;
use super::traits::OrderRepositoryTrait;
use crate::error::{LoyaltyError, Result};
use crate::models::{AccrualVerdict, Order, OrderStatus, SubmitOutcome};

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 提交订单
    ///
    /// 依赖主键唯一约束判重，并发提交同一订单号时只有一方能插入成功
    pub async fn submit(&self, number: &str, owner: &str) -> Result<SubmitOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (number, owner, submitted_at, status, accrual)
            VALUES ($1, $2, NOW(), $3, 0)
            ON CONFLICT (number) DO NOTHING
            "#,
        )
        .bind(number)
        .bind(owner)
        .bind(OrderStatus::New)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(SubmitOutcome::Created);
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT owner FROM orders WHERE number = $1")
                .bind(number)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            Some(existing) if existing == owner => Ok(SubmitOutcome::AlreadyOwnedBySelf),
            Some(_) => Ok(SubmitOutcome::AlreadyOwnedByOther),
            // 订单不会被删除，冲突后查不到说明存储状态异常
            None => Err(LoyaltyError::Internal(format!(
                "订单 {} 插入冲突但记录不存在",
                number
            ))),
        }
    }

    /// 用户订单列表，按提交时间升序
    pub async fn list_for_user(&self, owner: &str) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, owner, submitted_at, status, accrual
            FROM orders
            WHERE owner = $1
            ORDER BY submitted_at ASC, number ASC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// 非终态订单号，先提交的先查询
    pub async fn list_pending(&self) -> Result<Vec<String>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT number
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY submitted_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }

    /// 在一个事务中应用一批判定
    ///
    /// 任一条失败则整批回滚，返回实际改变了状态的订单数
    pub async fn apply_verdicts(&self, verdicts: &[AccrualVerdict]) -> Result<u64> {
        if verdicts.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut applied = 0u64;

        for verdict in verdicts {
            if Self::apply_verdict_in_tx(&mut tx, verdict).await? {
                applied += 1;
            }
        }

        tx.commit().await?;
        Ok(applied)
    }

    /// 在事务中应用单条判定
    ///
    /// 条件更新保证终态不可回退：PROCESSING 只能从 NEW 推进，
    /// 终态只能从 NEW / PROCESSING 推进。PROCESSED 且积分大于 0 时
    /// 写入一条入账流水，与状态变更同生共死。
    pub async fn apply_verdict_in_tx(
        tx: &mut PgConnection,
        verdict: &AccrualVerdict,
    ) -> Result<bool> {
        let owner: Option<String> = match verdict.status {
            OrderStatus::New => return Ok(false),
            OrderStatus::Processing => {
                sqlx::query_scalar(
                    r#"
                    UPDATE orders SET status = $1
                    WHERE number = $2 AND status = 'NEW'
                    RETURNING owner
                    "#,
                )
                .bind(verdict.status)
                .bind(&verdict.order)
                .fetch_optional(&mut *tx)
                .await?
            }
            OrderStatus::Invalid | OrderStatus::Processed => {
                sqlx::query_scalar(
                    r#"
                    UPDATE orders SET status = $1, accrual = $2
                    WHERE number = $3 AND status IN ('NEW', 'PROCESSING')
                    RETURNING owner
                    "#,
                )
                .bind(verdict.status)
                .bind(verdict.accrual)
                .bind(&verdict.order)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let Some(owner) = owner else {
            debug!(order = %verdict.order, status = %verdict.status, "判定未生效，订单已处于终态或不存在");
            return Ok(false);
        };

        if verdict.status == OrderStatus::Processed && verdict.accrual > 0 {
            LedgerRepository::create_in_tx(tx, &verdict.order, &owner, verdict.accrual).await?;
        }

        Ok(true)
    }
}

#[async_trait]
impl OrderRepositoryTrait for OrderRepository {
    async fn submit(&self, number: &str, owner: &str) -> Result<SubmitOutcome> {
        self.submit(number, owner).await
    }

    async fn list_for_user(&self, owner: &str) -> Result<Vec<Order>> {
        self.list_for_user(owner).await
    }

    async fn list_pending(&self) -> Result<Vec<String>> {
        self.list_pending().await
    }

    async fn apply_verdicts(&self, verdicts: &[AccrualVerdict]) -> Result<u64> {
        self.apply_verdicts(verdicts).await
    }
}
