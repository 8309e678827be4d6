//! 数据库仓储层
//!
//! 提供订单与积分流水的数据访问接口，封装 SQL 操作细节。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 使用 SQLx 进行数据库操作，迁移脚本通过 `MIGRATOR` 嵌入二进制
//! - 需要跨表原子性的操作（判定落库、条件提现）在仓储内以单个事务完成
//! - 定义 trait 接口以支持 mock 测试和内存实现

mod ledger_repo;
mod memory;
mod order_repo;
mod traits;

pub use ledger_repo::LedgerRepository;
pub use memory::MemoryStore;
pub use order_repo::OrderRepository;
pub use traits::*;

/// 嵌入的数据库迁移脚本
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
