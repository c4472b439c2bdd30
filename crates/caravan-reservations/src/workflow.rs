use std::sync::Arc;

use caravan_core::{
    AssetId, BookingRequest, DomainEventKind, EventBus, EventPayload, EventSource, FeeStrategy,
    KeyedLocks, MONEY_SCALE, MarketError, Payment, PricingStrategy, Reservation, ReservationId,
    ReservationStatus, Result, Stores, clamp_amount,
};
use caravan_finance::PaymentLedger;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::validation::ValidationGate;

/// Drives a reservation through its lifecycle.
///
/// Every status write happens under the asset's lock, which also covers the
/// overlap check and insert of a new booking. The ledger's balance lock is
/// only ever taken while the asset lock is held, never the other way round.
/// Events, including the ledger's `payment_completed`, go out after the
/// asset lock is released.
pub struct ReservationWorkflow {
    stores: Stores,
    gate: ValidationGate,
    ledger: Arc<PaymentLedger>,
    bus: Arc<EventBus>,
    asset_locks: KeyedLocks<AssetId>,
}

impl ReservationWorkflow {
    pub fn new(stores: Stores, ledger: Arc<PaymentLedger>, bus: Arc<EventBus>) -> Self {
        Self {
            gate: ValidationGate::new(stores.clone()),
            stores,
            ledger,
            bus,
            asset_locks: KeyedLocks::new(),
        }
    }

    /// Books the asset and charges the renter.
    ///
    /// When the charge fails the reservation is kept at `pending` and the
    /// ledger error is returned; [`Self::pay`] can settle it later.
    pub async fn create(
        &self,
        request: &BookingRequest,
        pricing: &dyn PricingStrategy,
        fee: &dyn FeeStrategy,
    ) -> Result<Reservation> {
        self.gate
            .ensure_date_range(request.start_date, request.end_date)?;
        if request.base_price < Decimal::ZERO {
            return Err(MarketError::InvalidAmount(request.base_price));
        }
        self.gate.ensure_user(request.renter_id).await?;
        let asset = self.gate.ensure_asset(request.asset_id).await?;
        self.gate.ensure_bookable(&asset)?;

        let base_price = request.base_price.round_dp(MONEY_SCALE);
        let discount = clamp_amount(pricing.discount(base_price), base_price);
        let price = (base_price - discount).round_dp(MONEY_SCALE);

        let (reservation, payment) = {
            let _asset = self.asset_locks.lock(asset.id).await;
            self.gate
                .ensure_no_overlap(asset.id, request.start_date, request.end_date)
                .await?;

            let pending = self
                .stores
                .reservations
                .insert(Reservation {
                    id: 0,
                    renter_id: request.renter_id,
                    asset_id: asset.id,
                    start_date: request.start_date,
                    end_date: request.end_date,
                    price,
                    status: ReservationStatus::Pending,
                    created_at: Utc::now(),
                })
                .await?;

            self.charge(pending, fee).await?
        };

        info!(
            reservation_id = reservation.id,
            asset_id = reservation.asset_id,
            renter_id = reservation.renter_id,
            price = %reservation.price,
            "reservation created"
        );
        self.ledger.publish_completed(&payment).await;
        self.publish(DomainEventKind::ReservationCreated, &reservation)
            .await;

        Ok(reservation)
    }

    /// Retries the charge for a reservation left at `pending`.
    pub async fn pay(
        &self,
        reservation_id: ReservationId,
        fee: &dyn FeeStrategy,
    ) -> Result<Reservation> {
        let asset_id = self.get(reservation_id).await?.asset_id;

        let (reservation, payment) = {
            let _asset = self.asset_locks.lock(asset_id).await;
            let current = self.get(reservation_id).await?;
            if current.status != ReservationStatus::Pending {
                return Err(MarketError::InvalidTransition {
                    id: reservation_id,
                    from: current.status,
                    to: ReservationStatus::Paid,
                });
            }
            self.charge(current, fee).await?
        };

        info!(reservation_id, price = %reservation.price, "pending reservation paid");
        self.ledger.publish_completed(&payment).await;
        self.publish(DomainEventKind::ReservationCreated, &reservation)
            .await;

        Ok(reservation)
    }

    pub async fn approve(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.transition(
            reservation_id,
            ReservationStatus::Approved,
            DomainEventKind::ReservationApproved,
        )
        .await
    }

    pub async fn reject(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.transition(
            reservation_id,
            ReservationStatus::Rejected,
            DomainEventKind::ReservationRejected,
        )
        .await
    }

    pub async fn cancel(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.transition(
            reservation_id,
            ReservationStatus::Cancelled,
            DomainEventKind::ReservationCancelled,
        )
        .await
    }

    /// Marks the stay as finished and asks downstream for a review.
    pub async fn complete(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.transition(
            reservation_id,
            ReservationStatus::Completed,
            DomainEventKind::ReviewRequested,
        )
        .await
    }

    pub async fn get(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.stores
            .reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Reservation", reservation_id))
    }

    pub fn validation(&self) -> &ValidationGate {
        &self.gate
    }

    // Caller holds the asset lock and publishes the payment after release.
    // A failed status write voids the payment so the renter is not charged
    // for a reservation that is still pending.
    async fn charge(
        &self,
        mut reservation: Reservation,
        fee: &dyn FeeStrategy,
    ) -> Result<(Reservation, Payment)> {
        let payment = match self
            .ledger
            .record_debit(reservation.renter_id, reservation.id, reservation.price, fee)
            .await
        {
            Ok(payment) => payment,
            Err(err) => {
                warn!(
                    reservation_id = reservation.id,
                    renter_id = reservation.renter_id,
                    "reservation left pending: {err}"
                );
                return Err(err);
            }
        };

        reservation.status = ReservationStatus::Paid;
        if let Err(err) = self.stores.reservations.update(reservation.clone()).await {
            if let Err(void_err) = self
                .ledger
                .void_payment(reservation.renter_id, &payment)
                .await
            {
                error!(
                    reservation_id = reservation.id,
                    payment_id = payment.id,
                    "failed to void payment after status write failed: {void_err}"
                );
            }
            return Err(err);
        }
        info!(
            reservation_id = reservation.id,
            payment_id = payment.id,
            "reservation paid"
        );
        Ok((reservation, payment))
    }

    async fn transition(
        &self,
        reservation_id: ReservationId,
        next: ReservationStatus,
        kind: DomainEventKind,
    ) -> Result<Reservation> {
        let asset_id = self.get(reservation_id).await?.asset_id;

        let reservation = {
            let _asset = self.asset_locks.lock(asset_id).await;
            let mut current = self.get(reservation_id).await?;
            if !current.status.can_transition_to(next) {
                return Err(MarketError::InvalidTransition {
                    id: reservation_id,
                    from: current.status,
                    to: next,
                });
            }
            current.status = next;
            self.stores.reservations.update(current.clone()).await?;
            current
        };

        info!(reservation_id, status = %next, "reservation transitioned");
        self.publish(kind, &reservation).await;

        Ok(reservation)
    }

    async fn publish(&self, kind: DomainEventKind, reservation: &Reservation) {
        self.bus
            .publish(
                EventSource::Reservations,
                kind,
                EventPayload::Reservation(reservation.clone()),
            )
            .await;
    }
}
