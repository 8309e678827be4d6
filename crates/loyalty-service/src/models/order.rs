//! 订单模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// 用户提交的订单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub number: String,
    pub owner: String,
    pub submitted_at: DateTime<Utc>,
    pub status: OrderStatus,
    /// 积分（最小货币单位），仅用于展示，余额以流水为准
    pub accrual: i64,
}

impl Order {
    pub fn new(number: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            owner: owner.into(),
            submitted_at: Utc::now(),
            status: OrderStatus::New,
            accrual: 0,
        }
    }
}

/// 订单提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 新订单已创建
    Created,
    /// 同一用户重复提交，不产生新记录
    AlreadyOwnedBySelf,
    /// 订单号已被其他用户占用
    AlreadyOwnedByOther,
}

/// 积分系统对某个订单的判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualVerdict {
    pub order: String,
    pub status: OrderStatus,
    /// 积分（最小货币单位），非 PROCESSED 时为 0
    pub accrual: i64,
}

impl AccrualVerdict {
    pub fn processed(order: impl Into<String>, accrual: i64) -> Self {
        Self {
            order: order.into(),
            status: OrderStatus::Processed,
            accrual,
        }
    }

    pub fn invalid(order: impl Into<String>) -> Self {
        Self {
            order: order.into(),
            status: OrderStatus::Invalid,
            accrual: 0,
        }
    }

    pub fn processing(order: impl Into<String>) -> Self {
        Self {
            order: order.into(),
            status: OrderStatus::Processing,
            accrual: 0,
        }
    }

    /// 是否需要写入存储
    ///
    /// 积分系统仅登记（NEW）的判定不会改变本地状态
    pub fn changes_state(&self) -> bool {
        self.status != OrderStatus::New
    }
}
