use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{AssetId, PaymentId, ReservationId, ReservationStatus, UserId};

pub type Result<T, E = MarketError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("asset {asset_id} is already reserved between {start} and {end}")]
    DuplicateBooking {
        asset_id: AssetId,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("user {user_id} has insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Decimal,
        required: Decimal,
    },

    #[error("no unsettled payments found for host {host_id}")]
    NoEligiblePayments { host_id: UserId },

    #[error("percentage must be between 0 and 100, got {0}")]
    InvalidPercentage(Decimal),

    #[error("reservation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("reservation end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("amount must not be negative, got {0}")]
    InvalidAmount(Decimal),

    #[error("refund tiers are inconsistent: {0}")]
    InvalidRefundTiers(String),

    #[error("asset {0} is not available for booking")]
    AssetUnavailable(AssetId),

    #[error("payment {0} has already been settled")]
    PaymentSettled(PaymentId),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }
}
