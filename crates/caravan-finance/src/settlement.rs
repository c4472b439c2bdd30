use std::collections::HashSet;
use std::sync::Arc;

use caravan_core::{
    DomainEventKind, EventBus, EventPayload, EventSource, KeyedLocks, MONEY_SCALE, MarketError,
    Payment, PaymentStatus, Result, Settlement, Stores, User, UserId,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info};

/// Folds a host's completed, unsettled payments into payout batches.
pub struct SettlementAggregator {
    stores: Stores,
    bus: Arc<EventBus>,
    host_locks: Arc<KeyedLocks<UserId>>,
}

impl SettlementAggregator {
    pub fn new(
        stores: Stores,
        bus: Arc<EventBus>,
        host_locks: Arc<KeyedLocks<UserId>>,
    ) -> Self {
        Self {
            stores,
            bus,
            host_locks,
        }
    }

    /// Claims every eligible payment on the host's assets and records one
    /// settlement for them. Claiming and recording happen under the host lock.
    pub async fn settle_for_host(&self, host_id: UserId) -> Result<Settlement> {
        let settlement = {
            let _host = self.host_locks.lock(host_id).await;
            let host = self.load_host(host_id).await?;

            let eligible = self.eligible_payments(host.id).await?;
            if eligible.is_empty() {
                return Err(MarketError::NoEligiblePayments { host_id });
            }

            let amount = eligible
                .iter()
                .map(Payment::net_amount)
                .sum::<Decimal>()
                .round_dp(MONEY_SCALE);
            let payment_ids: Vec<_> = eligible.iter().map(|payment| payment.id).collect();

            self.mark_settled(&eligible).await?;

            let draft = Settlement {
                id: 0,
                host_id,
                amount,
                payment_ids,
                created_at: Utc::now(),
            };
            match self.stores.settlements.insert(draft).await {
                Ok(settlement) => settlement,
                Err(err) => {
                    self.unmark(&eligible).await;
                    return Err(err);
                }
            }
        };

        info!(
            settlement_id = settlement.id,
            host_id,
            payments = settlement.payment_ids.len(),
            amount = %settlement.amount,
            "settlement created"
        );
        self.bus
            .publish(
                EventSource::Settlement,
                DomainEventKind::SettlementCreated,
                EventPayload::Settlement(settlement.clone()),
            )
            .await;

        Ok(settlement)
    }

    pub async fn settlements_for_host(&self, host_id: UserId) -> Result<Vec<Settlement>> {
        let settlements = self.stores.settlements.list_all().await?;
        Ok(settlements
            .into_iter()
            .filter(|settlement| settlement.host_id == host_id)
            .collect())
    }

    /// Completed, unsettled payments on reservations of the host's assets,
    /// in ascending id order.
    pub async fn eligible_payments(&self, host_id: UserId) -> Result<Vec<Payment>> {
        let asset_ids: HashSet<_> = self
            .stores
            .assets
            .list_all()
            .await?
            .into_iter()
            .filter(|asset| asset.host_id == host_id)
            .map(|asset| asset.id)
            .collect();
        if asset_ids.is_empty() {
            return Ok(Vec::new());
        }

        let reservation_ids: HashSet<_> = self
            .stores
            .reservations
            .list_all()
            .await?
            .into_iter()
            .filter(|reservation| asset_ids.contains(&reservation.asset_id))
            .map(|reservation| reservation.id)
            .collect();

        let open = self
            .stores
            .payments
            .matching(&|status: PaymentStatus, settled: bool| {
                status == PaymentStatus::Completed && !settled
            })
            .await?;
        Ok(open
            .into_iter()
            .filter(|payment| reservation_ids.contains(&payment.reservation_id))
            .collect())
    }

    async fn load_host(&self, host_id: UserId) -> Result<User> {
        self.stores
            .users
            .get(host_id)
            .await?
            .filter(|user| user.is_host)
            .ok_or_else(|| MarketError::not_found("Host", host_id))
    }

    async fn mark_settled(&self, payments: &[Payment]) -> Result<()> {
        for (index, payment) in payments.iter().enumerate() {
            let mut claimed = payment.clone();
            claimed.settled = true;
            if let Err(err) = self.stores.payments.update(claimed).await {
                self.unmark(&payments[..index]).await;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn unmark(&self, payments: &[Payment]) {
        for payment in payments {
            if let Err(err) = self.stores.payments.update(payment.clone()).await {
                error!(
                    payment_id = payment.id,
                    "failed to release payment after aborted settlement: {err}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use caravan_core::{
        Asset, AssetStatus, NO_FEE, PercentageFee, Reservation, ReservationStatus,
    };
    use caravan_store::in_memory_stores;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::PaymentLedger;

    struct Fixture {
        stores: Stores,
        ledger: PaymentLedger,
        aggregator: SettlementAggregator,
    }

    fn fixture() -> Fixture {
        let stores = in_memory_stores();
        let bus = Arc::new(EventBus::new());
        let host_locks = Arc::new(KeyedLocks::new());
        Fixture {
            ledger: PaymentLedger::new(stores.clone(), bus.clone(), host_locks.clone()),
            aggregator: SettlementAggregator::new(stores.clone(), bus, host_locks),
            stores,
        }
    }

    async fn add_user(stores: &Stores, name: &str, is_host: bool) -> User {
        stores
            .users
            .insert(User {
                id: 0,
                name: name.to_string(),
                contact: format!("{name}@example.com"),
                is_host,
                balance: dec!(10000),
            })
            .await
            .unwrap()
    }

    async fn add_asset(stores: &Stores, host: &User) -> Asset {
        stores
            .assets
            .insert(Asset {
                id: 0,
                host_id: host.id,
                name: format!("{}'s caravan", host.name),
                capacity: 2,
                location: "Lakeside".to_string(),
                status: AssetStatus::Available,
            })
            .await
            .unwrap()
    }

    async fn add_reservation(stores: &Stores, guest: &User, asset: &Asset) -> Reservation {
        let day = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        stores
            .reservations
            .insert(Reservation {
                id: 0,
                renter_id: guest.id,
                asset_id: asset.id,
                start_date: day,
                end_date: day,
                price: dec!(200),
                status: ReservationStatus::Paid,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn payout_is_net_of_fees() {
        let fx = fixture();
        let host = add_user(&fx.stores, "host", true).await;
        let guest = add_user(&fx.stores, "guest", false).await;
        let asset = add_asset(&fx.stores, &host).await;
        let first = add_reservation(&fx.stores, &guest, &asset).await;
        let second = add_reservation(&fx.stores, &guest, &asset).await;
        let fee = PercentageFee::new(dec!(10)).unwrap();
        let p1 = fx
            .ledger
            .debit(guest.id, first.id, dec!(100), &fee)
            .await
            .unwrap();
        let p2 = fx
            .ledger
            .debit(guest.id, second.id, dec!(200), &fee)
            .await
            .unwrap();

        let settlement = fx.aggregator.settle_for_host(host.id).await.unwrap();

        assert_eq!(settlement.amount, dec!(270));
        assert_eq!(settlement.payment_ids, vec![p1.id, p2.id]);
        assert_eq!(settlement.host_id, host.id);
        for id in [p1.id, p2.id] {
            assert!(fx.stores.payments.get(id).await.unwrap().unwrap().settled);
        }
    }

    #[tokio::test]
    async fn rerun_has_nothing_left() {
        let fx = fixture();
        let host = add_user(&fx.stores, "host", true).await;
        let guest = add_user(&fx.stores, "guest", false).await;
        let asset = add_asset(&fx.stores, &host).await;
        let reservation = add_reservation(&fx.stores, &guest, &asset).await;
        fx.ledger
            .debit(guest.id, reservation.id, dec!(80), &NO_FEE)
            .await
            .unwrap();

        fx.aggregator.settle_for_host(host.id).await.unwrap();
        assert_eq!(
            fx.aggregator.settle_for_host(host.id).await.unwrap_err(),
            MarketError::NoEligiblePayments { host_id: host.id }
        );
        assert_eq!(fx.aggregator.settlements_for_host(host.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn only_the_hosts_own_assets_are_settled() {
        let fx = fixture();
        let alice = add_user(&fx.stores, "alice", true).await;
        let bob = add_user(&fx.stores, "bob", true).await;
        let guest = add_user(&fx.stores, "guest", false).await;
        let alice_asset = add_asset(&fx.stores, &alice).await;
        let bob_asset = add_asset(&fx.stores, &bob).await;
        let on_alice = add_reservation(&fx.stores, &guest, &alice_asset).await;
        let on_bob = add_reservation(&fx.stores, &guest, &bob_asset).await;
        fx.ledger
            .debit(guest.id, on_alice.id, dec!(100), &NO_FEE)
            .await
            .unwrap();
        let bob_payment = fx
            .ledger
            .debit(guest.id, on_bob.id, dec!(300), &NO_FEE)
            .await
            .unwrap();

        let settlement = fx.aggregator.settle_for_host(alice.id).await.unwrap();
        assert_eq!(settlement.amount, dec!(100));

        let untouched = fx.stores.payments.get(bob_payment.id).await.unwrap().unwrap();
        assert!(!untouched.settled);
        let bob_settlement = fx.aggregator.settle_for_host(bob.id).await.unwrap();
        assert_eq!(bob_settlement.payment_ids, vec![bob_payment.id]);
    }

    #[tokio::test]
    async fn refunded_payments_are_excluded() {
        let fx = fixture();
        let host = add_user(&fx.stores, "host", true).await;
        let guest = add_user(&fx.stores, "guest", false).await;
        let asset = add_asset(&fx.stores, &host).await;
        let reservation = add_reservation(&fx.stores, &guest, &asset).await;
        let mut payment = fx
            .ledger
            .debit(guest.id, reservation.id, dec!(80), &NO_FEE)
            .await
            .unwrap();
        payment.status = PaymentStatus::Refunded;
        fx.stores.payments.update(payment).await.unwrap();

        assert_eq!(
            fx.aggregator.settle_for_host(host.id).await.unwrap_err(),
            MarketError::NoEligiblePayments { host_id: host.id }
        );
    }

    #[tokio::test]
    async fn guests_and_unknown_users_are_not_hosts() {
        let fx = fixture();
        let guest = add_user(&fx.stores, "guest", false).await;

        assert_eq!(
            fx.aggregator.settle_for_host(guest.id).await.unwrap_err(),
            MarketError::not_found("Host", guest.id)
        );
        assert_eq!(
            fx.aggregator.settle_for_host(999).await.unwrap_err(),
            MarketError::not_found("Host", 999)
        );
    }
}
