// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Typed publish/subscribe channel for provider events

use shared_types::ProviderEvent;
use tokio::sync::broadcast;
use tracing::debug;

use crate::exporter;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Broadcast bus for [`ProviderEvent`]s
///
/// Cloning the bus shares the same channel. Publishing never fails: with no
/// subscribers the event is simply counted and dropped, and subscribers that fall
/// more than the channel capacity behind skip the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProviderEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcast an event to every current subscriber
    pub fn publish(&self, event: ProviderEvent) {
        exporter::record_event(&event);
        debug!(
            kind = event.kind(),
            source = event.source(),
            provider = event.provider(),
            "provider event"
        );
        // No receivers is not an error for a fire-and-forget bus.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn event(provider: &str) -> ProviderEvent {
        ProviderEvent::RateLimited {
            source: "bitcoin".to_string(),
            provider: provider.to_string(),
            retry_after_ms: 1000,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_event() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(event("blockstream.info"));

        assert_eq!(first.recv().await.unwrap().provider(), "blockstream.info");
        assert_eq!(second.recv().await.unwrap().provider(), "blockstream.info");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(event("mempool.space"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let bus = EventBus::new(4);
        let mut receiver = bus.subscribe();
        bus.clone().publish(event("blockchain.com"));
        assert_eq!(receiver.recv().await.unwrap().provider(), "blockchain.com");
    }
}
