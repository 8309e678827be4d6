//! 积分计算系统对接
//!
//! - `client`: 积分系统 HTTP 客户端及其抽象接口
//! - `poller`: 后台轮询器，将积分系统的判定同步到本地订单和流水

pub mod client;
pub mod poller;

pub use client::{AccrualClient, AccrualError, AccrualHttpClient};
pub use poller::{AccrualPoller, CycleReport, PollerConfig};
