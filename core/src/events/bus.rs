//! Event bus for orchestrator components.
//!
//! A thin wrapper over `tokio::sync::broadcast`, grounded in the teacher's
//! `events::bus::EventBus`. Persistence is dropped: the teacher persists
//! events to RocksDB for replay across process restarts, but this
//! orchestrator's state (blueprints, task trees, checkpoints) is already
//! durable in its own managers, so the bus here is purely in-process
//! fan-out, matching what every subscriber (CLI status line, a future log
//! sink) actually needs.

use super::types::DevForgeEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("failed to send event: {0}")]
    SendFailed(String),
    #[error("event channel closed")]
    ChannelClosed,
}

pub type EventBusResult<T> = Result<T, EventBusError>;
pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<DevForgeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    pub fn publish(&self, event: DevForgeEvent) -> EventBusResult<()> {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "event published");
                Ok(())
            }
            Err(_) => {
                // No subscribers is not an error: events are fire-and-forget
                // when nobody's listening.
                warn!(event_type, "event published with no subscribers");
                Ok(())
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DevForgeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::BlueprintId;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(DevForgeEvent::PhaseChanged {
            blueprint_id: BlueprintId::from("bp-1"),
            from: "draft".into(),
            to: "in_review".into(),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "phase_changed");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        let result = bus.publish(DevForgeEvent::CycleReset {
            blueprint_id: BlueprintId::from("bp-1"),
            trigger: "wall_clock_threshold".into(),
            summary: "reset".into(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_ok());
    }
}
