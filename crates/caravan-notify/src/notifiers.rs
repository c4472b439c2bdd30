//! Subscribers that turn domain events into notifications for the people
//! involved. Events a notifier does not care about are ignored.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use caravan_core::{
    DomainEvent, DomainEventKind, EventPayload, EventSource, Payment, Reservation,
    ReservationId, Stores, Subscriber, User, UserId,
};

use crate::channel::{Notification, NotificationChannel};

async fn user(stores: &Stores, user_id: UserId) -> anyhow::Result<User> {
    stores
        .users
        .get(user_id)
        .await?
        .with_context(|| format!("user {user_id} not found"))
}

async fn reservation(
    stores: &Stores,
    reservation_id: ReservationId,
) -> anyhow::Result<Reservation> {
    stores
        .reservations
        .get(reservation_id)
        .await?
        .with_context(|| format!("reservation {reservation_id} not found"))
}

async fn host_of(stores: &Stores, reservation: &Reservation) -> anyhow::Result<User> {
    let asset = stores
        .assets
        .get(reservation.asset_id)
        .await?
        .with_context(|| format!("asset {} not found", reservation.asset_id))?;
    user(stores, asset.host_id).await
}

async fn renter_of_payment(stores: &Stores, payment: &Payment) -> anyhow::Result<User> {
    let reservation = reservation(stores, payment.reservation_id).await?;
    user(stores, reservation.renter_id).await
}

/// Tells hosts about new bookings and payouts.
pub struct HostNotifier {
    stores: Stores,
    channel: Arc<dyn NotificationChannel>,
}

impl HostNotifier {
    pub fn new(stores: Stores, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { stores, channel }
    }
}

#[async_trait]
impl Subscriber for HostNotifier {
    fn name(&self) -> &str {
        "host-notifier"
    }

    async fn update(&self, _source: EventSource, event: &DomainEvent) -> anyhow::Result<()> {
        let notification = match (event.kind, &event.payload) {
            (DomainEventKind::ReservationCreated, EventPayload::Reservation(booking)) => {
                let host = host_of(&self.stores, booking).await?;
                Notification::new(
                    host.contact,
                    "New reservation",
                    format!(
                        "Reservation #{} booked your caravan from {} to {} for {}.",
                        booking.id, booking.start_date, booking.end_date, booking.price
                    ),
                )
            }
            (DomainEventKind::SettlementCreated, EventPayload::Settlement(settlement)) => {
                let host = user(&self.stores, settlement.host_id).await?;
                Notification::new(
                    host.contact,
                    "Payout settled",
                    format!(
                        "Settlement #{} pays out {} for {} payment(s).",
                        settlement.id,
                        settlement.amount,
                        settlement.payment_ids.len()
                    ),
                )
            }
            _ => return Ok(()),
        };
        self.channel.send(notification).await
    }
}

/// Tells renters about their payments and reservation decisions.
pub struct GuestNotifier {
    stores: Stores,
    channel: Arc<dyn NotificationChannel>,
}

impl GuestNotifier {
    pub fn new(stores: Stores, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { stores, channel }
    }
}

#[async_trait]
impl Subscriber for GuestNotifier {
    fn name(&self) -> &str {
        "guest-notifier"
    }

    async fn update(&self, _source: EventSource, event: &DomainEvent) -> anyhow::Result<()> {
        let notification = match (event.kind, &event.payload) {
            (DomainEventKind::PaymentCompleted, EventPayload::Payment(payment)) => {
                let renter = renter_of_payment(&self.stores, payment).await?;
                Notification::new(
                    renter.contact,
                    "Payment received",
                    format!(
                        "We charged {} for reservation #{}.",
                        payment.amount, payment.reservation_id
                    ),
                )
            }
            (DomainEventKind::PaymentRefunded, EventPayload::Payment(payment)) => {
                let renter = renter_of_payment(&self.stores, payment).await?;
                Notification::new(
                    renter.contact,
                    "Payment refunded",
                    format!(
                        "{} of {} was refunded for reservation #{}.",
                        payment.refunded_amount, payment.amount, payment.reservation_id
                    ),
                )
            }
            (
                DomainEventKind::ReservationApproved
                | DomainEventKind::ReservationRejected
                | DomainEventKind::ReservationCancelled,
                EventPayload::Reservation(booking),
            ) => {
                let renter = user(&self.stores, booking.renter_id).await?;
                Notification::new(
                    renter.contact,
                    format!("Reservation {}", booking.status),
                    format!(
                        "Reservation #{} from {} to {} is now {}.",
                        booking.id, booking.start_date, booking.end_date, booking.status
                    ),
                )
            }
            _ => return Ok(()),
        };
        self.channel.send(notification).await
    }
}

/// Asks renters to review a finished stay.
pub struct ReviewRequestNotifier {
    stores: Stores,
    channel: Arc<dyn NotificationChannel>,
}

impl ReviewRequestNotifier {
    pub fn new(stores: Stores, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { stores, channel }
    }
}

#[async_trait]
impl Subscriber for ReviewRequestNotifier {
    fn name(&self) -> &str {
        "review-request-notifier"
    }

    async fn update(&self, _source: EventSource, event: &DomainEvent) -> anyhow::Result<()> {
        let (DomainEventKind::ReviewRequested, EventPayload::Reservation(booking)) =
            (event.kind, &event.payload)
        else {
            return Ok(());
        };

        let renter = user(&self.stores, booking.renter_id).await?;
        self.channel
            .send(Notification::new(
                renter.contact,
                "How was your trip?",
                format!(
                    "Your stay for reservation #{} has ended. Please leave a review.",
                    booking.id
                ),
            ))
            .await
    }
}
