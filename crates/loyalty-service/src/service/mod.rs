//! 服务层
//!
//! 实现积分业务逻辑，协调仓储层。
//!
//! ## 模块结构
//!
//! - `order_service`: 订单提交与查询
//! - `balance_service`: 余额与提现记录查询（只读）
//! - `withdrawal_service`: 积分提现

pub mod balance_service;
pub mod order_service;
pub mod withdrawal_service;

pub use balance_service::BalanceService;
pub use order_service::OrderService;
pub use withdrawal_service::WithdrawalService;
