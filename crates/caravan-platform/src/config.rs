use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use caravan_core::{
    FeeStrategy, NoDiscount, NoFee, PercentageDiscount, PercentageFee, PricingStrategy,
    RefundStrategy, TieredRefund,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marketplace defaults, read from `CARAVAN_*` environment variables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub platform_fee_percent: Decimal,
    pub discount_percent: Decimal,
    pub refund_full_days: i64,
    pub refund_partial_days: i64,
    pub refund_partial_percent: Decimal,
    pub log_filter: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            platform_fee_percent: Decimal::ZERO,
            discount_percent: Decimal::ZERO,
            refund_full_days: 7,
            refund_partial_days: 3,
            refund_partial_percent: Decimal::from(50),
            log_filter: "caravan=info".to_string(),
        }
    }
}

impl MarketplaceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset keys keep their defaults; set keys must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            platform_fee_percent: parse_or(
                &lookup,
                "CARAVAN_PLATFORM_FEE_PERCENT",
                defaults.platform_fee_percent,
            )?,
            discount_percent: parse_or(
                &lookup,
                "CARAVAN_DISCOUNT_PERCENT",
                defaults.discount_percent,
            )?,
            refund_full_days: parse_or(
                &lookup,
                "CARAVAN_REFUND_FULL_DAYS",
                defaults.refund_full_days,
            )?,
            refund_partial_days: parse_or(
                &lookup,
                "CARAVAN_REFUND_PARTIAL_DAYS",
                defaults.refund_partial_days,
            )?,
            refund_partial_percent: parse_or(
                &lookup,
                "CARAVAN_REFUND_PARTIAL_PERCENT",
                defaults.refund_partial_percent,
            )?,
            log_filter: lookup("CARAVAN_LOG").unwrap_or(defaults.log_filter),
        })
    }

    /// Builds the default strategies described by this config.
    pub fn policies(&self) -> caravan_core::Result<Policies> {
        let pricing: Arc<dyn PricingStrategy> = if self.discount_percent.is_zero() {
            Arc::new(NoDiscount)
        } else {
            Arc::new(PercentageDiscount::new(self.discount_percent)?)
        };
        let fee: Arc<dyn FeeStrategy> = if self.platform_fee_percent.is_zero() {
            Arc::new(NoFee)
        } else {
            Arc::new(PercentageFee::new(self.platform_fee_percent)?)
        };
        let refund = TieredRefund::new(
            self.refund_full_days,
            self.refund_partial_days,
            self.refund_partial_percent / Decimal::ONE_HUNDRED,
        )?;

        Ok(Policies {
            pricing,
            fee,
            refund: Arc::new(refund),
        })
    }
}

/// Strategies used when a caller does not supply its own.
#[derive(Clone)]
pub struct Policies {
    pub pricing: Arc<dyn PricingStrategy>,
    pub fee: Arc<dyn FeeStrategy>,
    pub refund: Arc<dyn RefundStrategy>,
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}")),
        None => Ok(default),
    }
}
