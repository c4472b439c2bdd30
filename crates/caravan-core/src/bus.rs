use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::events::{DomainEvent, DomainEventKind, EventPayload, EventSource};

/// A listener notified of every published domain event.
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    async fn update(&self, source: EventSource, event: &DomainEvent) -> anyhow::Result<()>;
}

/// Outcome of a single `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered, append-only fanout of domain events.
///
/// Subscribers are invoked one after another in subscription order. An error
/// or panic in one subscriber is logged and counted, then delivery continues
/// with the next; nothing is propagated to the publisher.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) {
        debug!(subscriber = subscriber.name(), "subscriber registered");
        self.subscribers.write().await.push(subscriber);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn publish(
        &self,
        source: EventSource,
        kind: DomainEventKind,
        payload: EventPayload,
    ) -> DeliveryReport {
        let event = DomainEvent::new(source, kind, payload);
        self.dispatch(source, &event).await
    }

    pub async fn dispatch(&self, source: EventSource, event: &DomainEvent) -> DeliveryReport {
        // Snapshot so a subscriber may itself subscribe without deadlocking.
        let subscribers = self.subscribers.read().await.clone();
        let mut report = DeliveryReport::default();

        for subscriber in subscribers {
            let outcome = AssertUnwindSafe(subscriber.update(source, event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(
                        subscriber = subscriber.name(),
                        event = %event.kind,
                        "subscriber failed: {err:#}"
                    );
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        subscriber = subscriber.name(),
                        event = %event.kind,
                        "subscriber panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
