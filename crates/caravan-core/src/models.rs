use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::storage::Entity;

pub type UserId = u64;
pub type AssetId = u64;
pub type ReservationId = u64;
pub type PaymentId = u64;
pub type SettlementId = u64;

/// Decimal places kept on every computed money amount.
pub const MONEY_SCALE: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub contact: String,
    pub is_host: bool,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Available,
    Maintenance,
}

/// A rentable caravan owned by a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub id: AssetId,
    pub host_id: UserId,
    pub name: String,
    pub capacity: u32,
    pub location: String,
    pub status: AssetStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Paid,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Active reservations block overlapping bookings on the same asset.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Paid | Self::Approved | Self::Completed
        )
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid)
                | (Self::Pending, Self::Cancelled)
                | (Self::Paid, Self::Approved)
                | (Self::Paid, Self::Rejected)
                | (Self::Approved, Self::Cancelled)
                | (Self::Approved, Self::Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A booking of one asset over an inclusive date range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub renter_id: UserId,
    pub asset_id: AssetId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price: Decimal,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Closed-interval intersection: touching dates overlap.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end_date && end >= self.start_date
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Completed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub id: PaymentId,
    pub reservation_id: ReservationId,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub refunded_amount: Decimal,
    pub status: PaymentStatus,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn net_amount(&self) -> Decimal {
        (self.amount - self.platform_fee).round_dp(MONEY_SCALE)
    }

    pub fn is_settleable(&self) -> bool {
        self.status == PaymentStatus::Completed && !self.settled
    }
}

/// An immutable payout batch closing over a disjoint set of payments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub id: SettlementId,
    pub host_id: UserId,
    pub amount: Decimal,
    pub payment_ids: Vec<PaymentId>,
    pub created_at: DateTime<Utc>,
}

/// Input to the booking workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingRequest {
    pub renter_id: UserId,
    pub asset_id: AssetId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_price: Decimal,
}

macro_rules! impl_entity {
    ($ty:ty, $kind:literal) => {
        impl Entity for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> u64 {
                self.id
            }

            fn assign_id(&mut self, id: u64) {
                self.id = id;
            }
        }
    };
}

impl_entity!(User, "User");
impl_entity!(Asset, "Asset");
impl_entity!(Reservation, "Reservation");
impl_entity!(Payment, "Payment");
impl_entity!(Settlement, "Settlement");
