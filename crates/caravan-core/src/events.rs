use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Payment, Reservation, Settlement};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DomainEventKind {
    ReservationCreated,
    ReservationApproved,
    ReservationRejected,
    ReservationCancelled,
    ReviewRequested,
    PaymentCompleted,
    PaymentRefunded,
    SettlementCreated,
}

impl DomainEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReservationCreated => "reservation_created",
            Self::ReservationApproved => "reservation_approved",
            Self::ReservationRejected => "reservation_rejected",
            Self::ReservationCancelled => "reservation_cancelled",
            Self::ReviewRequested => "review_requested",
            Self::PaymentCompleted => "payment_completed",
            Self::PaymentRefunded => "payment_refunded",
            Self::SettlementCreated => "settlement_created",
        }
    }
}

impl fmt::Display for DomainEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component that published an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Reservations,
    Ledger,
    Settlement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Reservation(Reservation),
    Payment(Payment),
    Settlement(Settlement),
}

impl EventPayload {
    pub fn aggregate_id(&self) -> u64 {
        match self {
            Self::Reservation(reservation) => reservation.id,
            Self::Payment(payment) => payment.id,
            Self::Settlement(settlement) => settlement.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub kind: DomainEventKind,
    pub source: EventSource,
    pub aggregate_id: u64,
    pub occurred_at: DateTime<Utc>,
    pub payload: EventPayload,
}

impl DomainEvent {
    pub fn new(source: EventSource, kind: DomainEventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source,
            aggregate_id: payload.aggregate_id(),
            occurred_at: Utc::now(),
            payload,
        }
    }
}
