//! 订单服务
//!
//! 处理用户提交订单号：格式校验 -> 唯一约束判重 -> 返回提交结果。
//! 提交成功的订单由后台轮询器与积分系统对账。

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{LoyaltyError, Result};
use crate::luhn;
use crate::models::{Order, SubmitOutcome};
use crate::repository::OrderRepositoryTrait;

/// 订单服务
pub struct OrderService<OR>
where
    OR: OrderRepositoryTrait,
{
    order_repo: Arc<OR>,
}

impl<OR> OrderService<OR>
where
    OR: OrderRepositoryTrait,
{
    pub fn new(order_repo: Arc<OR>) -> Self {
        Self { order_repo }
    }

    /// 提交订单
    ///
    /// 返回 `Created` 或 `AlreadyOwnedBySelf`（重复提交不产生新记录）；
    /// 订单号已属于其他用户时返回 `OrderOwnedByOther`。
    #[instrument(skip(self))]
    pub async fn submit(&self, number: &str, owner: &str) -> Result<SubmitOutcome> {
        if !luhn::is_valid(number) {
            return Err(LoyaltyError::InvalidOrderNumber(number.to_string()));
        }

        let outcome = self.order_repo.submit(number, owner).await?;
        match outcome {
            SubmitOutcome::Created => info!("订单已提交"),
            SubmitOutcome::AlreadyOwnedBySelf => info!("订单重复提交"),
            SubmitOutcome::AlreadyOwnedByOther => {
                warn!("订单号已被其他用户提交");
                return Err(LoyaltyError::OrderOwnedByOther {
                    number: number.to_string(),
                });
            }
        }

        Ok(outcome)
    }

    /// 用户订单列表，按提交时间升序
    #[instrument(skip(self))]
    pub async fn list_orders(&self, owner: &str) -> Result<Vec<Order>> {
        self.order_repo.list_for_user(owner).await
    }
}
