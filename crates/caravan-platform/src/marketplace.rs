use std::sync::Arc;

use caravan_core::{
    Asset, AssetId, AssetStatus, BookingRequest, EventBus, FeeStrategy, KeyedLocks, MONEY_SCALE,
    MarketError, Payment, PricingStrategy, RefundStrategy, Reservation, ReservationId, Result,
    Settlement, Stores, Subscriber, User, UserId,
};
use caravan_finance::{PaymentLedger, SettlementAggregator};
use caravan_notify::{GuestNotifier, HostNotifier, NotificationChannel, ReviewRequestNotifier};
use caravan_reservations::ReservationWorkflow;
use caravan_store::in_memory_stores;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::config::{MarketplaceConfig, Policies};

/// In-process entry point wiring stores, ledger, workflow and settlement
/// around one event bus.
pub struct Marketplace {
    stores: Stores,
    bus: Arc<EventBus>,
    ledger: Arc<PaymentLedger>,
    workflow: ReservationWorkflow,
    settlements: SettlementAggregator,
    policies: Policies,
}

impl Marketplace {
    pub fn new(config: &MarketplaceConfig, stores: Stores) -> Result<Self> {
        let policies = config.policies()?;
        let bus = Arc::new(EventBus::new());
        let host_locks = Arc::new(KeyedLocks::new());
        let ledger = Arc::new(PaymentLedger::new(
            stores.clone(),
            bus.clone(),
            host_locks.clone(),
        ));

        info!(
            fee_percent = %config.platform_fee_percent,
            discount_percent = %config.discount_percent,
            "marketplace ready"
        );

        Ok(Self {
            workflow: ReservationWorkflow::new(stores.clone(), ledger.clone(), bus.clone()),
            settlements: SettlementAggregator::new(stores.clone(), bus.clone(), host_locks),
            stores,
            bus,
            ledger,
            policies,
        })
    }

    pub fn in_memory(config: &MarketplaceConfig) -> Result<Self> {
        Self::new(config, in_memory_stores())
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        self.bus.subscribe(subscriber).await;
    }

    /// Registers the host, guest and review notifiers on `channel`.
    pub async fn notify_via(&self, channel: Arc<dyn NotificationChannel>) {
        self.subscribe(Arc::new(HostNotifier::new(
            self.stores.clone(),
            channel.clone(),
        )))
        .await;
        self.subscribe(Arc::new(GuestNotifier::new(
            self.stores.clone(),
            channel.clone(),
        )))
        .await;
        self.subscribe(Arc::new(ReviewRequestNotifier::new(
            self.stores.clone(),
            channel,
        )))
        .await;
    }

    pub async fn register_user(
        &self,
        name: &str,
        contact: &str,
        is_host: bool,
        balance: Decimal,
    ) -> Result<User> {
        if balance < Decimal::ZERO {
            return Err(MarketError::InvalidAmount(balance));
        }
        let user = self
            .stores
            .users
            .insert(User {
                id: 0,
                name: name.to_string(),
                contact: contact.to_string(),
                is_host,
                balance: balance.round_dp(MONEY_SCALE),
            })
            .await?;

        info!(user_id = user.id, is_host, "user registered");
        Ok(user)
    }

    pub async fn register_asset(
        &self,
        host_id: UserId,
        name: &str,
        capacity: u32,
        location: &str,
    ) -> Result<Asset> {
        self.workflow.validation().ensure_host(host_id).await?;
        let asset = self
            .stores
            .assets
            .insert(Asset {
                id: 0,
                host_id,
                name: name.to_string(),
                capacity,
                location: location.to_string(),
                status: AssetStatus::Available,
            })
            .await?;

        info!(asset_id = asset.id, host_id, "asset registered");
        Ok(asset)
    }

    pub async fn set_asset_status(&self, asset_id: AssetId, status: AssetStatus) -> Result<Asset> {
        let mut asset = self.workflow.validation().ensure_asset(asset_id).await?;
        asset.status = status;
        self.stores.assets.update(asset.clone()).await?;
        Ok(asset)
    }

    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<User> {
        self.ledger.deposit(user_id, amount).await
    }

    pub async fn user(&self, user_id: UserId) -> Result<User> {
        self.workflow.validation().ensure_user(user_id).await
    }

    pub async fn reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.workflow.get(reservation_id).await
    }

    pub async fn payments_for_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Vec<Payment>> {
        self.ledger.payments_for_reservation(reservation_id).await
    }

    pub async fn create_reservation(&self, request: &BookingRequest) -> Result<Reservation> {
        self.create_reservation_with(
            request,
            self.policies.pricing.as_ref(),
            self.policies.fee.as_ref(),
        )
        .await
    }

    pub async fn create_reservation_with(
        &self,
        request: &BookingRequest,
        pricing: &dyn PricingStrategy,
        fee: &dyn FeeStrategy,
    ) -> Result<Reservation> {
        self.workflow.create(request, pricing, fee).await
    }

    pub async fn approve_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.workflow.approve(reservation_id).await
    }

    pub async fn reject_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.workflow.reject(reservation_id).await
    }

    pub async fn cancel_reservation(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.workflow.cancel(reservation_id).await
    }

    pub async fn complete_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation> {
        self.workflow.complete(reservation_id).await
    }

    /// Charges a reservation still waiting at `pending`.
    pub async fn process_payment(&self, reservation_id: ReservationId) -> Result<Reservation> {
        self.process_payment_with(reservation_id, self.policies.fee.as_ref())
            .await
    }

    pub async fn process_payment_with(
        &self,
        reservation_id: ReservationId,
        fee: &dyn FeeStrategy,
    ) -> Result<Reservation> {
        self.workflow.pay(reservation_id, fee).await
    }

    pub async fn refund_payment(
        &self,
        reservation_id: ReservationId,
        as_of: NaiveDate,
    ) -> Result<Payment> {
        self.refund_payment_with(reservation_id, as_of, self.policies.refund.as_ref())
            .await
    }

    pub async fn refund_payment_with(
        &self,
        reservation_id: ReservationId,
        as_of: NaiveDate,
        refund: &dyn RefundStrategy,
    ) -> Result<Payment> {
        let reservation = self.workflow.get(reservation_id).await?;
        self.ledger.credit_refund(&reservation, as_of, refund).await
    }

    pub async fn settle_for_host(&self, host_id: UserId) -> Result<Settlement> {
        self.settlements.settle_for_host(host_id).await
    }

    pub async fn settlements_for_host(&self, host_id: UserId) -> Result<Vec<Settlement>> {
        self.settlements.settlements_for_host(host_id).await
    }
}
