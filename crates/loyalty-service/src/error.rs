//! 积分服务错误类型
//!
//! 定义服务层的业务错误和系统错误。业务错误（订单号无效、订单冲突、余额不足）
//! 同步返回给调用方，系统错误（存储不可用）可重试。

use loyalty_shared::error::SharedError;
use thiserror::Error;

/// 积分服务错误类型
#[derive(Debug, Error)]
pub enum LoyaltyError {
    // === 校验错误 ===
    #[error("订单号格式无效: {0}")]
    InvalidOrderNumber(String),

    #[error("金额必须为正数: {0}")]
    InvalidAmount(i64),

    // === 订单相关错误 ===
    #[error("订单号已被其他用户提交: {number}")]
    OrderOwnedByOther { number: String },

    #[error("订单不存在: {0}")]
    OrderNotFound(String),

    // === 积分相关错误 ===
    #[error("积分余额不足: 需要 {requested}, 可用 {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error(transparent)]
    Shared(#[from] SharedError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 积分服务 Result 类型别名
pub type Result<T> = std::result::Result<T, LoyaltyError>;

impl LoyaltyError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::Storage(_) => true,
            Self::Shared(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOrderNumber(_)
                | Self::InvalidAmount(_)
                | Self::OrderOwnedByOther { .. }
                | Self::OrderNotFound(_)
                | Self::InsufficientFunds { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidOrderNumber(_) => "INVALID_ORDER_NUMBER",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::OrderOwnedByOther { .. } => "ORDER_OWNED_BY_OTHER",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Shared(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
