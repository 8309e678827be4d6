//! 积分计算系统 HTTP 客户端
//!
//! `GET {base_url}/api/orders/{number}`：
//! - 200：`{"order", "status", "accrual"?}`，accrual 为主货币单位的小数
//! - 204：订单尚未登记
//! - 429：限流，`Retry-After` 给出等待秒数
//! - 5xx / 网络错误 / 超时 / 无法解析的响应体：暂时性失败
//!
//! 通过 `AccrualClient` trait 抽象 HTTP 调用，便于测试时注入 mock 实现。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::{AccrualVerdict, OrderStatus};

/// 未携带 Retry-After 时的默认限流等待时间
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// 积分系统调用错误
///
/// 只在轮询器内部流转，不会返回给用户
#[derive(Debug, Error)]
pub enum AccrualError {
    #[error("订单尚未在积分系统登记")]
    NotRegistered,

    #[error("积分系统限流，{}s 后重试", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("积分系统服务端错误: HTTP {0}")]
    Server(u16),

    #[error("积分系统请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("积分系统响应无法解析: {0}")]
    Malformed(String),

    #[error("积分系统返回非预期状态码: HTTP {0}")]
    UnexpectedStatus(u16),
}

impl AccrualError {
    /// 是否为可预期的暂时性失败
    ///
    /// 非预期状态码同样会在下一轮重试，但需要按错误级别记录
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::UnexpectedStatus(_))
    }

    /// 错误分类（用于指标标签）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server(_) => "server",
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
            Self::UnexpectedStatus(_) => "unexpected_status",
        }
    }
}

/// 积分系统客户端抽象接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// 查询单个订单的判定
    async fn fetch(&self, number: &str) -> Result<AccrualVerdict, AccrualError>;
}

/// 积分系统响应中的订单状态
#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum WireStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

#[derive(Debug, Deserialize)]
struct WireVerdict {
    order: String,
    status: WireStatus,
    #[serde(default)]
    accrual: Option<Decimal>,
}

/// 主货币单位转换为最小货币单位（分）
///
/// 十进制运算，保留两位小数，中点远离零舍入；负数或溢出返回 None
pub fn to_minor_units(major: Decimal) -> Option<i64> {
    if major.is_sign_negative() && !major.is_zero() {
        return None;
    }
    major
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// 解析 200 响应体
///
/// 响应中的订单号必须与查询的订单号一致
fn parse_verdict(number: &str, body: &[u8]) -> Result<AccrualVerdict, AccrualError> {
    let wire: WireVerdict =
        serde_json::from_slice(body).map_err(|e| AccrualError::Malformed(e.to_string()))?;

    if wire.order != number {
        return Err(AccrualError::Malformed(format!(
            "响应订单号 {} 与查询订单号 {} 不一致",
            wire.order, number
        )));
    }

    let verdict = match wire.status {
        WireStatus::Registered => AccrualVerdict {
            order: wire.order,
            status: OrderStatus::New,
            accrual: 0,
        },
        WireStatus::Invalid => AccrualVerdict::invalid(wire.order),
        WireStatus::Processing => AccrualVerdict::processing(wire.order),
        WireStatus::Processed => {
            let major = wire.accrual.unwrap_or(Decimal::ZERO);
            let accrual = to_minor_units(major)
                .ok_or_else(|| AccrualError::Malformed(format!("积分金额无效: {}", major)))?;
            AccrualVerdict::processed(wire.order, accrual)
        }
    };

    Ok(verdict)
}

/// 解析 Retry-After（秒），缺失或无法解析时使用默认值
fn retry_after(headers: &reqwest::header::HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// 基于 reqwest 的积分系统客户端
///
/// reqwest::Client 内部带连接池，clone 是廉价操作
#[derive(Clone)]
pub struct AccrualHttpClient {
    http: reqwest::Client,
    base_url: String,
}

impl AccrualHttpClient {
    /// 创建客户端，每个请求受 `timeout` 限制
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AccrualError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, number: &str) -> String {
        format!("{}/api/orders/{}", self.base_url, number)
    }
}

#[async_trait]
impl AccrualClient for AccrualHttpClient {
    async fn fetch(&self, number: &str) -> Result<AccrualVerdict, AccrualError> {
        let resp = self.http.get(self.order_url(number)).send().await?;
        let status = resp.status();
        debug!(order = number, status = status.as_u16(), "积分系统响应");

        match status {
            StatusCode::OK => {
                let body = resp.bytes().await?;
                parse_verdict(number, &body)
            }
            StatusCode::NO_CONTENT => Err(AccrualError::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => Err(AccrualError::RateLimited {
                retry_after: retry_after(resp.headers()),
            }),
            s if s.is_server_error() => Err(AccrualError::Server(s.as_u16())),
            s => Err(AccrualError::UnexpectedStatus(s.as_u16())),
        }
    }
}
