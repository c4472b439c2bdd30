pub mod journal;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use caravan_core::{
    Asset, AssetId, Entity, MarketError, Payment, PaymentPredicate, PaymentRepository,
    Repository, Reservation, ReservationRepository, Result, Settlement, Stores, User,
};
use chrono::NaiveDate;
use tokio::sync::RwLock;

pub use journal::{InMemoryEventJournal, JournalEntry};

/// Map plus monotonic counter. Ids start at 1 and are never reused.
pub struct InMemoryStore<T> {
    records: RwLock<BTreeMap<u64, T>>,
    sequence: RwLock<u64>,
}

impl<T: Entity> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            sequence: RwLock::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl<T: Entity> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryStore<T> {
    async fn get(&self, id: u64) -> Result<Option<T>> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<T>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }

    async fn insert(&self, mut entity: T) -> Result<T> {
        let mut sequence_guard = self.sequence.write().await;
        *sequence_guard += 1;
        entity.assign_id(*sequence_guard);

        let mut records = self.records.write().await;
        records.insert(entity.id(), entity.clone());

        Ok(entity)
    }

    async fn update(&self, entity: T) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&entity.id()) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(MarketError::not_found(T::KIND, entity.id())),
        }
    }
}

#[async_trait]
impl ReservationRepository for InMemoryStore<Reservation> {
    async fn overlapping(
        &self,
        asset_id: AssetId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Reservation>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|reservation| reservation.asset_id == asset_id)
            .filter(|reservation| reservation.overlaps(start, end))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore<Payment> {
    async fn matching(&self, predicate: &PaymentPredicate) -> Result<Vec<Payment>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|payment| predicate(payment.status, payment.settled))
            .cloned()
            .collect())
    }
}

/// A fresh, empty set of in-memory stores.
pub fn in_memory_stores() -> Stores {
    Stores {
        users: Arc::new(InMemoryStore::<User>::new()),
        assets: Arc::new(InMemoryStore::<Asset>::new()),
        reservations: Arc::new(InMemoryStore::<Reservation>::new()),
        payments: Arc::new(InMemoryStore::<Payment>::new()),
        settlements: Arc::new(InMemoryStore::<Settlement>::new()),
    }
}
