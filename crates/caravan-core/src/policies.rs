use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{MarketError, Result};
use crate::models::MONEY_SCALE;

pub trait PricingStrategy: Send + Sync {
    /// Discount to take off `base_price`. Callers clamp to `[0, base_price]`.
    fn discount(&self, base_price: Decimal) -> Decimal;
}

pub trait FeeStrategy: Send + Sync {
    /// Platform fee taken from `amount`. Callers clamp to `[0, amount]`.
    fn fee(&self, amount: Decimal) -> Decimal;
}

pub trait RefundStrategy: Send + Sync {
    fn refund(
        &self,
        original_amount: Decimal,
        reservation_start: NaiveDate,
        as_of: NaiveDate,
    ) -> Decimal;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscount;

impl PricingStrategy for NoDiscount {
    fn discount(&self, _base_price: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFee;

impl FeeStrategy for NoFee {
    fn fee(&self, _amount: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PercentageDiscount {
    percent: Decimal,
}

impl PercentageDiscount {
    pub fn new(percent: Decimal) -> Result<Self> {
        Ok(Self {
            percent: validate_percentage(percent)?,
        })
    }
}

impl PricingStrategy for PercentageDiscount {
    fn discount(&self, base_price: Decimal) -> Decimal {
        percent_of(base_price, self.percent)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PercentageFee {
    percent: Decimal,
}

impl PercentageFee {
    pub fn new(percent: Decimal) -> Result<Self> {
        Ok(Self {
            percent: validate_percentage(percent)?,
        })
    }

    pub fn percent(&self) -> Decimal {
        self.percent
    }
}

impl FeeStrategy for PercentageFee {
    fn fee(&self, amount: Decimal) -> Decimal {
        percent_of(amount, self.percent)
    }
}

/// Lead-time based refund: full refund at or beyond `full_refund_days`,
/// `partial_ratio` of the amount at or beyond `partial_refund_days`,
/// nothing otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TieredRefund {
    full_refund_days: i64,
    partial_refund_days: i64,
    partial_ratio: Decimal,
}

impl TieredRefund {
    pub fn new(
        full_refund_days: i64,
        partial_refund_days: i64,
        partial_ratio: Decimal,
    ) -> Result<Self> {
        if partial_refund_days > full_refund_days {
            return Err(MarketError::InvalidRefundTiers(format!(
                "partial tier ({partial_refund_days} days) starts after full tier ({full_refund_days} days)"
            )));
        }
        if partial_ratio < Decimal::ZERO || partial_ratio > Decimal::ONE {
            return Err(MarketError::InvalidRefundTiers(format!(
                "partial ratio {partial_ratio} is outside 0..=1"
            )));
        }

        Ok(Self {
            full_refund_days,
            partial_refund_days,
            partial_ratio,
        })
    }
}

impl Default for TieredRefund {
    fn default() -> Self {
        FLEXIBLE_REFUND
    }
}

impl RefundStrategy for TieredRefund {
    fn refund(
        &self,
        original_amount: Decimal,
        reservation_start: NaiveDate,
        as_of: NaiveDate,
    ) -> Decimal {
        let lead_days = (reservation_start - as_of).num_days();

        if lead_days >= self.full_refund_days {
            original_amount
        } else if lead_days >= self.partial_refund_days {
            (original_amount * self.partial_ratio).round_dp(MONEY_SCALE)
        } else {
            Decimal::ZERO
        }
    }
}

pub const NO_DISCOUNT: NoDiscount = NoDiscount;
pub const NO_FEE: NoFee = NoFee;
pub const FLEXIBLE_REFUND: TieredRefund = TieredRefund {
    full_refund_days: 7,
    partial_refund_days: 3,
    partial_ratio: Decimal::from_parts(5, 0, 0, false, 1),
};

/// Bounds a strategy output into `[0, ceiling]` at money scale.
pub fn clamp_amount(value: Decimal, ceiling: Decimal) -> Decimal {
    value
        .max(Decimal::ZERO)
        .min(ceiling.max(Decimal::ZERO))
        .round_dp(MONEY_SCALE)
}

fn validate_percentage(percent: Decimal) -> Result<Decimal> {
    if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(MarketError::InvalidPercentage(percent));
    }
    Ok(percent)
}

fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    (amount * percent / Decimal::ONE_HUNDRED).round_dp(MONEY_SCALE)
}
