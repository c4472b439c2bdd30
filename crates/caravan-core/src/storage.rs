use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Asset, AssetId, Payment, PaymentStatus, Reservation, Settlement, User};

/// A record kept in a keyed store. Identity is assigned by the store on insert.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> u64;
    fn assign_id(&mut self, id: u64);
}

#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<T>>;
    async fn list_all(&self) -> Result<Vec<T>>;
    /// Stores `entity` under a fresh id and returns it with that id set.
    async fn insert(&self, entity: T) -> Result<T>;
    async fn update(&self, entity: T) -> Result<()>;
}

#[async_trait]
pub trait ReservationRepository: Repository<Reservation> {
    /// Reservations of any status on `asset_id` whose range intersects `[start, end]`.
    async fn overlapping(
        &self,
        asset_id: AssetId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>>;
}

pub type PaymentPredicate = dyn Fn(PaymentStatus, bool) -> bool + Send + Sync;

#[async_trait]
pub trait PaymentRepository: Repository<Payment> {
    /// Payments for which `predicate(status, settled)` holds, in id order.
    async fn matching(&self, predicate: &PaymentPredicate) -> Result<Vec<Payment>>;
}

/// The set of collaborating stores the marketplace core runs against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn Repository<User>>,
    pub assets: Arc<dyn Repository<Asset>>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub settlements: Arc<dyn Repository<Settlement>>,
}
