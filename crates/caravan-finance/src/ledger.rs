use std::sync::Arc;

use caravan_core::{
    DomainEventKind, EventBus, EventPayload, EventSource, FeeStrategy, KeyedLocks, MONEY_SCALE,
    MarketError, Payment, PaymentStatus, RefundStrategy, Reservation, ReservationId, Result,
    Stores, User, UserId, clamp_amount,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};

/// Moves money between user balances and the payment record.
///
/// Balance read-modify-write is serialized per user. Refunds additionally
/// hold the host lock shared with [`crate::SettlementAggregator`], so a
/// payment cannot be refunded while it is being claimed by a settlement.
pub struct PaymentLedger {
    stores: Stores,
    bus: Arc<EventBus>,
    balance_locks: KeyedLocks<UserId>,
    host_locks: Arc<KeyedLocks<UserId>>,
}

impl PaymentLedger {
    pub fn new(
        stores: Stores,
        bus: Arc<EventBus>,
        host_locks: Arc<KeyedLocks<UserId>>,
    ) -> Self {
        Self {
            stores,
            bus,
            balance_locks: KeyedLocks::new(),
            host_locks,
        }
    }

    /// Takes `amount` from the user's balance and records a completed payment
    /// for `reservation_id`, then publishes `payment_completed`. Nothing is
    /// written when the balance is too low.
    pub async fn debit(
        &self,
        user_id: UserId,
        reservation_id: ReservationId,
        amount: Decimal,
        fee_strategy: &dyn FeeStrategy,
    ) -> Result<Payment> {
        let payment = self
            .record_debit(user_id, reservation_id, amount, fee_strategy)
            .await?;
        self.publish_completed(&payment).await;
        Ok(payment)
    }

    /// Commit half of [`Self::debit`]: moves the money without publishing.
    /// Callers that hold their own locks publish with
    /// [`Self::publish_completed`] once those are released.
    pub async fn record_debit(
        &self,
        user_id: UserId,
        reservation_id: ReservationId,
        amount: Decimal,
        fee_strategy: &dyn FeeStrategy,
    ) -> Result<Payment> {
        if amount < Decimal::ZERO {
            return Err(MarketError::InvalidAmount(amount));
        }
        let amount = amount.round_dp(MONEY_SCALE);
        let platform_fee = clamp_amount(fee_strategy.fee(amount), amount);

        let payment = {
            let _balance = self.balance_locks.lock(user_id).await;
            let mut user = self.load_user(user_id).await?;
            if user.balance < amount {
                return Err(MarketError::InsufficientFunds {
                    user_id,
                    balance: user.balance,
                    required: amount,
                });
            }

            let previous_balance = user.balance;
            user.balance = (user.balance - amount).round_dp(MONEY_SCALE);
            self.stores.users.update(user.clone()).await?;

            let draft = Payment {
                id: 0,
                reservation_id,
                amount,
                platform_fee,
                refunded_amount: Decimal::ZERO,
                status: PaymentStatus::Completed,
                settled: false,
                created_at: Utc::now(),
            };
            match self.stores.payments.insert(draft).await {
                Ok(payment) => payment,
                Err(err) => {
                    user.balance = previous_balance;
                    self.restore_user(user).await;
                    return Err(err);
                }
            }
        };

        info!(
            payment_id = payment.id,
            reservation_id,
            user_id,
            amount = %payment.amount,
            fee = %payment.platform_fee,
            "payment completed"
        );
        Ok(payment)
    }

    pub async fn publish_completed(&self, payment: &Payment) {
        self.bus
            .publish(
                EventSource::Ledger,
                DomainEventKind::PaymentCompleted,
                EventPayload::Payment(payment.clone()),
            )
            .await;
    }

    /// Reverses an unpublished debit whose surrounding operation failed: the
    /// full amount goes back to `user_id` and the payment is closed as
    /// refunded so it can never be settled.
    pub async fn void_payment(&self, user_id: UserId, payment: &Payment) -> Result<Payment> {
        let _balance = self.balance_locks.lock(user_id).await;

        let mut voided = payment.clone();
        voided.status = PaymentStatus::Refunded;
        voided.refunded_amount = payment.amount;
        self.stores.payments.update(voided.clone()).await?;

        let credited = match self.load_user(user_id).await {
            Ok(mut user) => {
                user.balance = (user.balance + payment.amount).round_dp(MONEY_SCALE);
                self.stores.users.update(user).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = credited {
            if let Err(undo) = self.stores.payments.update(payment.clone()).await {
                error!(payment_id = payment.id, "failed to reopen payment after void: {undo}");
            }
            return Err(err);
        }

        warn!(
            payment_id = payment.id,
            user_id,
            amount = %payment.amount,
            "payment voided"
        );
        Ok(voided)
    }

    /// Refunds the completed payment of `reservation` to its renter, sized by
    /// `refund_strategy` from the lead time between `as_of` and the start date.
    pub async fn credit_refund(
        &self,
        reservation: &Reservation,
        as_of: NaiveDate,
        refund_strategy: &dyn RefundStrategy,
    ) -> Result<Payment> {
        let asset = self
            .stores
            .assets
            .get(reservation.asset_id)
            .await?
            .ok_or_else(|| MarketError::not_found("Asset", reservation.asset_id))?;

        let payment = {
            let _host = self.host_locks.lock(asset.host_id).await;

            let mut payment = self
                .completed_payment_for(reservation.id)
                .await?
                .ok_or_else(|| MarketError::not_found("Payment", reservation.id))?;
            if payment.settled {
                return Err(MarketError::PaymentSettled(payment.id));
            }

            let refund_amount = clamp_amount(
                refund_strategy.refund(payment.amount, reservation.start_date, as_of),
                payment.amount,
            );

            let _balance = self.balance_locks.lock(reservation.renter_id).await;
            let mut renter = self.load_user(reservation.renter_id).await?;
            let previous_balance = renter.balance;
            renter.balance = (renter.balance + refund_amount).round_dp(MONEY_SCALE);
            self.stores.users.update(renter.clone()).await?;

            payment.status = PaymentStatus::Refunded;
            payment.refunded_amount = refund_amount;
            if let Err(err) = self.stores.payments.update(payment.clone()).await {
                renter.balance = previous_balance;
                self.restore_user(renter).await;
                return Err(err);
            }
            payment
        };

        info!(
            payment_id = payment.id,
            reservation_id = reservation.id,
            refunded = %payment.refunded_amount,
            "payment refunded"
        );
        self.bus
            .publish(
                EventSource::Ledger,
                DomainEventKind::PaymentRefunded,
                EventPayload::Payment(payment.clone()),
            )
            .await;

        Ok(payment)
    }

    /// Tops up a user's balance.
    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<User> {
        if amount < Decimal::ZERO {
            return Err(MarketError::InvalidAmount(amount));
        }

        let _balance = self.balance_locks.lock(user_id).await;
        let mut user = self.load_user(user_id).await?;
        user.balance = (user.balance + amount).round_dp(MONEY_SCALE);
        self.stores.users.update(user.clone()).await?;

        info!(user_id, amount = %amount, balance = %user.balance, "balance deposited");
        Ok(user)
    }

    /// All payments recorded against a reservation, oldest first.
    pub async fn payments_for_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Vec<Payment>> {
        let payments = self
            .stores
            .payments
            .matching(&|_: PaymentStatus, _: bool| true)
            .await?;
        Ok(payments
            .into_iter()
            .filter(|payment| payment.reservation_id == reservation_id)
            .collect())
    }

    async fn completed_payment_for(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Payment>> {
        let completed = self
            .stores
            .payments
            .matching(&|status: PaymentStatus, _: bool| status == PaymentStatus::Completed)
            .await?;
        Ok(completed
            .into_iter()
            .find(|payment| payment.reservation_id == reservation_id))
    }

    async fn load_user(&self, user_id: UserId) -> Result<User> {
        self.stores
            .users
            .get(user_id)
            .await?
            .ok_or_else(|| MarketError::not_found("User", user_id))
    }

    async fn restore_user(&self, user: User) {
        let user_id = user.id;
        if let Err(err) = self.stores.users.update(user).await {
            error!(user_id, "failed to restore balance after aborted ledger write: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use caravan_core::{
        Asset, AssetStatus, FLEXIBLE_REFUND, NO_FEE, PercentageFee, ReservationStatus,
    };
    use caravan_store::{InMemoryEventJournal, in_memory_stores};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use super::*;

    struct Fixture {
        stores: Stores,
        bus: Arc<EventBus>,
        ledger: PaymentLedger,
        guest: User,
        reservation: Reservation,
    }

    async fn fixture(balance: Decimal) -> Fixture {
        let stores = in_memory_stores();
        let host = stores
            .users
            .insert(User {
                id: 0,
                name: "Host".to_string(),
                contact: "host@example.com".to_string(),
                is_host: true,
                balance: Decimal::ZERO,
            })
            .await
            .unwrap();
        let guest = stores
            .users
            .insert(User {
                id: 0,
                name: "Guest".to_string(),
                contact: "guest@example.com".to_string(),
                is_host: false,
                balance,
            })
            .await
            .unwrap();
        let asset = stores
            .assets
            .insert(Asset {
                id: 0,
                host_id: host.id,
                name: "Cozy Caravan".to_string(),
                capacity: 4,
                location: "Mountain View".to_string(),
                status: AssetStatus::Available,
            })
            .await
            .unwrap();
        let start = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let reservation = stores
            .reservations
            .insert(Reservation {
                id: 0,
                renter_id: guest.id,
                asset_id: asset.id,
                start_date: start,
                end_date: start + Duration::days(3),
                price: dec!(200),
                status: ReservationStatus::Pending,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let bus = Arc::new(EventBus::new());
        let ledger = PaymentLedger::new(stores.clone(), bus.clone(), Arc::new(KeyedLocks::new()));
        Fixture {
            stores,
            bus,
            ledger,
            guest,
            reservation,
        }
    }

    async fn balance(stores: &Stores, user_id: UserId) -> Decimal {
        stores.users.get(user_id).await.unwrap().unwrap().balance
    }

    #[tokio::test]
    async fn debit_records_payment_with_fee() {
        let fx = fixture(dec!(500)).await;
        let fee = PercentageFee::new(dec!(10)).unwrap();

        let payment = fx
            .ledger
            .debit(fx.guest.id, fx.reservation.id, dec!(200), &fee)
            .await
            .unwrap();

        assert_eq!(payment.amount, dec!(200));
        assert_eq!(payment.platform_fee, dec!(20));
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(!payment.settled);
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(300));
    }

    #[tokio::test]
    async fn recorded_debit_is_silent_until_published() {
        let fx = fixture(dec!(500)).await;
        let journal = Arc::new(InMemoryEventJournal::new());
        fx.bus.subscribe(journal.clone()).await;

        let payment = fx
            .ledger
            .record_debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap();
        assert!(journal.entries().await.is_empty());

        fx.ledger.publish_completed(&payment).await;
        let completed = journal.of_kind(DomainEventKind::PaymentCompleted).await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].event.aggregate_id, payment.id);
    }

    #[tokio::test]
    async fn void_restores_balance_and_closes_payment() {
        let fx = fixture(dec!(500)).await;
        let payment = fx
            .ledger
            .record_debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap();
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(300));

        let voided = fx.ledger.void_payment(fx.guest.id, &payment).await.unwrap();

        assert_eq!(voided.status, PaymentStatus::Refunded);
        assert_eq!(voided.refunded_amount, dec!(200));
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(500));
        assert_eq!(
            fx.stores.payments.get(payment.id).await.unwrap().unwrap(),
            voided
        );
        assert_eq!(
            fx.ledger
                .credit_refund(&fx.reservation, fx.reservation.start_date, &FLEXIBLE_REFUND)
                .await
                .unwrap_err(),
            MarketError::not_found("Payment", fx.reservation.id)
        );
    }

    #[tokio::test]
    async fn insufficient_funds_writes_nothing() {
        let fx = fixture(dec!(100)).await;

        let err = fx
            .ledger
            .debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            MarketError::InsufficientFunds {
                user_id: fx.guest.id,
                balance: dec!(100),
                required: dec!(200),
            }
        );
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(100));
        assert!(fx.stores.payments.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn debit_rejects_negative_amount_and_unknown_user() {
        let fx = fixture(dec!(100)).await;
        assert_eq!(
            fx.ledger
                .debit(fx.guest.id, fx.reservation.id, dec!(-1), &NO_FEE)
                .await
                .unwrap_err(),
            MarketError::InvalidAmount(dec!(-1))
        );
        assert_eq!(
            fx.ledger
                .debit(404, fx.reservation.id, dec!(1), &NO_FEE)
                .await
                .unwrap_err(),
            MarketError::not_found("User", 404)
        );
    }

    #[tokio::test]
    async fn refund_follows_lead_time_policy() {
        let fx = fixture(dec!(500)).await;
        fx.ledger
            .debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap();

        let as_of = fx.reservation.start_date - Duration::days(4);
        let refunded = fx
            .ledger
            .credit_refund(&fx.reservation, as_of, &FLEXIBLE_REFUND)
            .await
            .unwrap();

        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.refunded_amount, dec!(100));
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(400));
    }

    #[tokio::test]
    async fn refund_without_completed_payment_is_not_found() {
        let fx = fixture(dec!(500)).await;
        let err = fx
            .ledger
            .credit_refund(&fx.reservation, fx.reservation.start_date, &FLEXIBLE_REFUND)
            .await
            .unwrap_err();
        assert_eq!(err, MarketError::not_found("Payment", fx.reservation.id));
    }

    #[tokio::test]
    async fn second_refund_is_not_found() {
        let fx = fixture(dec!(500)).await;
        fx.ledger
            .debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap();
        let as_of = fx.reservation.start_date - Duration::days(10);
        fx.ledger
            .credit_refund(&fx.reservation, as_of, &FLEXIBLE_REFUND)
            .await
            .unwrap();

        let err = fx
            .ledger
            .credit_refund(&fx.reservation, as_of, &FLEXIBLE_REFUND)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "Payment", .. }));
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(500));
    }

    #[tokio::test]
    async fn settled_payment_cannot_be_refunded() {
        let fx = fixture(dec!(500)).await;
        let mut payment = fx
            .ledger
            .debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap();
        payment.settled = true;
        fx.stores.payments.update(payment.clone()).await.unwrap();

        let err = fx
            .ledger
            .credit_refund(&fx.reservation, fx.reservation.start_date, &FLEXIBLE_REFUND)
            .await
            .unwrap_err();
        assert_eq!(err, MarketError::PaymentSettled(payment.id));
        assert_eq!(balance(&fx.stores, fx.guest.id).await, dec!(300));
    }

    #[tokio::test]
    async fn deposit_tops_up_balance() {
        let fx = fixture(dec!(10)).await;
        let user = fx.ledger.deposit(fx.guest.id, dec!(15.5)).await.unwrap();
        assert_eq!(user.balance, dec!(25.5));
        assert_eq!(
            fx.ledger.deposit(fx.guest.id, dec!(-3)).await.unwrap_err(),
            MarketError::InvalidAmount(dec!(-3))
        );
    }

    #[tokio::test]
    async fn payments_are_listed_per_reservation() {
        let fx = fixture(dec!(1000)).await;
        fx.ledger
            .debit(fx.guest.id, fx.reservation.id, dec!(200), &NO_FEE)
            .await
            .unwrap();
        fx.ledger
            .debit(fx.guest.id, fx.reservation.id + 1, dec!(50), &NO_FEE)
            .await
            .unwrap();

        let payments = fx
            .ledger
            .payments_for_reservation(fx.reservation.id)
            .await
            .unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, dec!(200));
    }
}
