use async_trait::async_trait;
use caravan_core::{DomainEvent, DomainEventKind, EventSource, Subscriber};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub source: EventSource,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

/// Append-only audit trail of every event seen on the bus.
#[derive(Default)]
pub struct InMemoryEventJournal {
    entries: RwLock<Vec<JournalEntry>>,
    sequence: RwLock<u64>,
}

impl InMemoryEventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, source: EventSource, event: DomainEvent) -> JournalEntry {
        let mut sequence_guard = self.sequence.write().await;
        *sequence_guard += 1;

        let entry = JournalEntry {
            sequence: *sequence_guard,
            source,
            event,
            stored_at: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        entries.push(entry.clone());

        entry
    }

    pub async fn entries(&self) -> Vec<JournalEntry> {
        self.entries.read().await.clone()
    }

    pub async fn of_kind(&self, kind: DomainEventKind) -> Vec<JournalEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|entry| entry.event.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn kinds(&self) -> Vec<DomainEventKind> {
        let entries = self.entries.read().await;
        entries.iter().map(|entry| entry.event.kind).collect()
    }
}

#[async_trait]
impl Subscriber for InMemoryEventJournal {
    fn name(&self) -> &str {
        "event-journal"
    }

    async fn update(&self, source: EventSource, event: &DomainEvent) -> anyhow::Result<()> {
        let entry = self.append(source, event.clone()).await;
        debug!(sequence = entry.sequence, event = %event.kind, "event journaled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use caravan_core::{EventBus, EventPayload, Payment, PaymentStatus};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    fn payment(id: u64) -> EventPayload {
        EventPayload::Payment(Payment {
            id,
            reservation_id: 1,
            amount: dec!(50),
            platform_fee: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            status: PaymentStatus::Completed,
            settled: false,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn journal_sequences_bus_events() {
        let bus = EventBus::new();
        let journal = Arc::new(InMemoryEventJournal::new());
        bus.subscribe(journal.clone()).await;

        bus.publish(EventSource::Ledger, DomainEventKind::PaymentCompleted, payment(1))
            .await;
        bus.publish(EventSource::Ledger, DomainEventKind::PaymentRefunded, payment(1))
            .await;

        let entries = journal.entries().await;
        assert_eq!(
            entries.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(
            journal.kinds().await,
            vec![
                DomainEventKind::PaymentCompleted,
                DomainEventKind::PaymentRefunded
            ]
        );
        assert_eq!(journal.of_kind(DomainEventKind::PaymentRefunded).await.len(), 1);
        assert_eq!(entries[0].source, EventSource::Ledger);
    }
}
