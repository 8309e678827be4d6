//! 积分服务
//!
//! 用户提交订单号后，由后台轮询器与第三方积分计算系统对账，
//! 计算完成的积分写入只追加的积分流水，余额始终由流水折叠得到。
//!
//! ## 核心功能
//!
//! - **订单提交**：Luhn 校验，订单号全局唯一，同一用户重复提交幂等
//! - **积分对账**：周期性查询非终态订单，判定整体原子落库，每个订单至多入账一次
//! - **余额查询**：当前余额与累计提现
//! - **积分提现**：余额检查与扣减在同一临界区内完成，并发提现不会透支
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `luhn`: 订单号校验
//! - `repository`: 数据库仓储层（PostgreSQL 与内存实现）
//! - `service`: 业务服务层
//! - `accrual`: 积分系统客户端与对账轮询器

pub mod accrual;
pub mod error;
pub mod luhn;
pub mod models;
pub mod repository;
pub mod service;

pub use accrual::{
    AccrualClient, AccrualError, AccrualHttpClient, AccrualPoller, CycleReport, PollerConfig,
};
pub use error::{LoyaltyError, Result};
pub use models::*;
pub use repository::{
    LedgerRepository, LedgerRepositoryTrait, MemoryStore, OrderRepository, OrderRepositoryTrait,
};
pub use service::{BalanceService, OrderService, WithdrawalService};
