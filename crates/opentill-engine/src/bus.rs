//! # Notification Bus
//!
//! Broadcast channel carrying till events to whoever is listening:
//! kitchen displays, floor views, logging taps.
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     At-Least-Once, Fire-and-Forget                      │
//! │                                                                         │
//! │  publish() ──► broadcast::Sender ──┬──► subscriber A (kitchen display) │
//! │                                    ├──► subscriber B (floor view)      │
//! │                                    └──► subscriber C (late joiner:     │
//! │                                         misses old events, refetches   │
//! │                                         the feed instead)              │
//! │                                                                         │
//! │  • Zero subscribers is fine: the send error is ignored.                │
//! │  • A lagging subscriber gets RecvError::Lagged, not a crash; its       │
//! │    recovery is to refetch state, the same as a late joiner.            │
//! │  • Events are notifications, never the source of truth. The            │
//! │    database rows are.                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use opentill_core::ContextKey;

/// Buffered events per subscriber before laggards start losing history.
const BUS_CAPACITY: usize = 256;

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TillEvent {
    /// A new kitchen ticket was dispatched.
    TicketCreated {
        ticket_id: String,
        context_key: ContextKey,
        at: DateTime<Utc>,
    },
    /// The kitchen acknowledged a ticket as ready.
    TicketReady { ticket_id: String },
    /// A whole pending ticket was cancelled.
    TicketVoided { ticket_id: String },
    /// A sent line was voided; the kitchen must stop making it.
    LineVoided {
        context_key: ContextKey,
        name: String,
        quantity: i64,
    },
}

// =============================================================================
// Bus
// =============================================================================

/// The broadcast bus. Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<TillEvent>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    /// Creates a bus with the default buffer capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        NotificationBus { tx }
    }

    /// Publishes an event to every current subscriber.
    ///
    /// Publishing never fails: with zero subscribers the event is simply
    /// dropped, which is correct for a notification.
    pub fn publish(&self, event: TillEvent) {
        debug!(?event, "Publishing till event");
        let _ = self.tx.send(event);
    }

    /// Subscribes to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TillEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = NotificationBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(TillEvent::TicketReady {
            ticket_id: "t1".to_string(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            TillEvent::TicketReady { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            TillEvent::TicketReady { .. }
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let bus = NotificationBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        // Must not panic or error.
        bus.publish(TillEvent::TicketVoided {
            ticket_id: "t1".to_string(),
        });
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = NotificationBus::new();

        bus.publish(TillEvent::TicketReady {
            ticket_id: "before".to_string(),
        });

        let mut rx = bus.subscribe();
        bus.publish(TillEvent::TicketReady {
            ticket_id: "after".to_string(),
        });

        match rx.recv().await.unwrap() {
            TillEvent::TicketReady { ticket_id } => assert_eq!(ticket_id, "after"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
