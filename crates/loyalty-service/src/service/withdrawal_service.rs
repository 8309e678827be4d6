//! 提现服务
//!
//! 提现流程：订单号格式校验 -> 金额校验 -> 条件写入。
//! 余额检查与扣减由仓储的 `append_withdrawal` 在同一临界区内完成，
//! 服务层不做先查后写。

use std::sync::Arc;

use loyalty_shared::observability::metrics as app_metrics;
use tracing::{info, instrument, warn};

use crate::error::{LoyaltyError, Result};
use crate::luhn;
use crate::models::{LedgerEntry, WithdrawalOutcome};
use crate::repository::LedgerRepositoryTrait;

/// 提现服务
pub struct WithdrawalService<LR>
where
    LR: LedgerRepositoryTrait,
{
    ledger_repo: Arc<LR>,
}

impl<LR> WithdrawalService<LR>
where
    LR: LedgerRepositoryTrait,
{
    pub fn new(ledger_repo: Arc<LR>) -> Self {
        Self { ledger_repo }
    }

    /// 提现
    ///
    /// 提现订单号只做格式校验，不要求是已提交的订单，
    /// 但不能是其他用户已提交的订单
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        owner: &str,
        order_number: &str,
        amount: i64,
    ) -> Result<LedgerEntry> {
        if !luhn::is_valid(order_number) {
            app_metrics::record_withdrawal("invalid_order_number");
            return Err(LoyaltyError::InvalidOrderNumber(order_number.to_string()));
        }
        if amount <= 0 {
            app_metrics::record_withdrawal("invalid_amount");
            return Err(LoyaltyError::InvalidAmount(amount));
        }

        let outcome = match self
            .ledger_repo
            .append_withdrawal(owner, order_number, amount)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, LoyaltyError::OrderOwnedByOther { .. }) {
                    app_metrics::record_withdrawal("order_owned_by_other");
                    warn!("订单号属于其他用户");
                }
                return Err(e);
            }
        };

        match outcome {
            WithdrawalOutcome::Recorded(entry) => {
                app_metrics::record_withdrawal("recorded");
                info!(entry_id = entry.id, "提现成功");
                Ok(entry)
            }
            WithdrawalOutcome::InsufficientFunds { available } => {
                app_metrics::record_withdrawal("insufficient_funds");
                warn!(available, "余额不足");
                Err(LoyaltyError::InsufficientFunds {
                    requested: amount,
                    available,
                })
            }
        }
    }
}
