//! 领域模型定义

mod enums;
mod ledger;
mod order;

pub use enums::OrderStatus;
pub use ledger::{Balance, LedgerEntry, WithdrawalOutcome};
pub use order::{AccrualVerdict, Order, SubmitOutcome};
