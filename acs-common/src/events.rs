//! Event types for the audio channel service
//!
//! Every registry mutation and every notification outcome is published on an
//! [`EventBus`]. Nothing in the arbitration path depends on anyone listening;
//! the bus exists for diagnostics, logging sinks and the scenario replay tool.

use crate::channel::{ChannelCategory, PlayState};
use crate::ids::{AgentId, GroupId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Audio channel service events
///
/// Serializable so they can be written out as JSON lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    /// A new agent joined the registry
    AgentRegistered {
        agent_id: AgentId,
        category: ChannelCategory,
        group_id: GroupId,
        timestamp: DateTime<Utc>,
    },

    /// An agent started playing and received its initial state
    PlaybackStarted {
        agent_id: AgentId,
        category: ChannelCategory,
        state: PlayState,
        timestamp: DateTime<Utc>,
    },

    /// An agent stopped playing
    PlaybackStopped {
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    },

    /// An agent reported a visibility change
    VisibilityChanged {
        agent_id: AgentId,
        visible: bool,
        timestamp: DateTime<Utc>,
    },

    /// Arbitration changed the state of an already playing agent
    ///
    /// One event per changed agent per recompute pass; a matching
    /// notification is queued for the agent's listener.
    PlayStateChanged {
        agent_id: AgentId,
        old_state: PlayState,
        new_state: PlayState,
        timestamp: DateTime<Utc>,
    },

    /// A listener callback returned an error or panicked
    DeliveryFailed {
        agent_id: AgentId,
        state: PlayState,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// An agent left the registry
    AgentUnregistered {
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    },
}

impl ChannelEvent {
    /// Agent the event refers to
    pub fn agent_id(&self) -> AgentId {
        match self {
            ChannelEvent::AgentRegistered { agent_id, .. }
            | ChannelEvent::PlaybackStarted { agent_id, .. }
            | ChannelEvent::PlaybackStopped { agent_id, .. }
            | ChannelEvent::VisibilityChanged { agent_id, .. }
            | ChannelEvent::PlayStateChanged { agent_id, .. }
            | ChannelEvent::DeliveryFailed { agent_id, .. }
            | ChannelEvent::AgentUnregistered { agent_id, .. } => *agent_id,
        }
    }
}

/// Event distribution bus backed by `tokio::sync::broadcast`
///
/// - Non-blocking publish (slow subscribers never block arbitration)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChannelEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.tx.subscribe()
    }

    /// Emit an event
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ChannelEvent,
    ) -> Result<usize, broadcast::error::SendError<ChannelEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let agent_id = AgentId::new();

        bus.emit(ChannelEvent::PlaybackStopped {
            agent_id,
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.agent_id(), agent_id);
        assert!(matches!(event, ChannelEvent::PlaybackStopped { .. }));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        let event = ChannelEvent::AgentUnregistered {
            agent_id: AgentId::new(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy variant must not panic
        bus.emit_lossy(event);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ChannelEvent::PlayStateChanged {
            agent_id: AgentId::new(),
            old_state: PlayState::Normal,
            new_state: PlayState::Faded,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PlayStateChanged");
        assert_eq!(json["old_state"], "normal");
        assert_eq!(json["new_state"], "faded");
    }
}
