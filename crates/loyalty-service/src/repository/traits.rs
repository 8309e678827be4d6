//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层和轮询器依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AccrualVerdict, LedgerEntry, Order, SubmitOutcome, WithdrawalOutcome};

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 提交订单，依赖存储的唯一约束判重
    async fn submit(&self, number: &str, owner: &str) -> Result<SubmitOutcome>;

    /// 用户订单，按提交时间升序
    async fn list_for_user(&self, owner: &str) -> Result<Vec<Order>>;

    /// 非终态（NEW / PROCESSING）订单号
    async fn list_pending(&self) -> Result<Vec<String>>;

    /// 原子地应用一批判定，返回实际生效的条数
    ///
    /// 只更新仍处于非终态的订单；PROCESSED 判定在同一事务内写入积分入账流水。
    async fn apply_verdicts(&self, verdicts: &[AccrualVerdict]) -> Result<u64>;
}

/// 积分流水仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// 追加一条流水，归属用户取自订单
    async fn append(&self, order_number: &str, amount: i64) -> Result<LedgerEntry>;

    /// 用户全部流水，按记录时间升序
    async fn entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>>;

    /// 用户提现流水（负数金额），按记录时间升序
    async fn withdrawal_entries_for_user(&self, owner: &str) -> Result<Vec<LedgerEntry>>;

    /// 条件提现：余额足够时才追加 -amount 流水
    ///
    /// 余额检查与写入在同一个按用户串行化的临界区内完成。
    async fn append_withdrawal(
        &self,
        owner: &str,
        order_number: &str,
        amount: i64,
    ) -> Result<WithdrawalOutcome>;
}
