//! Audio channel service
//!
//! The arbitration authority. Owns the registry behind a single async mutex,
//! so every mutation and the recompute that follows it observe one
//! consistent snapshot. Notifications leave through the dispatcher after the
//! registry has been updated.
//!
//! Constructed explicitly and shared via `Arc`; any number of independent
//! instances may exist (tests create one each).

use crate::agent::PlayStateListener;
use crate::arbiter::{self, Transition};
use crate::dispatcher::NotificationDispatcher;
use crate::registry::{AgentRegistry, AgentSnapshot, VisibilityChange};
use acs_common::config::ServiceConfig;
use acs_common::events::{ChannelEvent, EventBus};
use acs_common::{AgentId, ChannelCategory, GroupId, PlayState, Result};
use chrono::Utc;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub struct AudioChannelService {
    registry: Mutex<AgentRegistry>,
    dispatcher: NotificationDispatcher,
    events: EventBus,
    config: ServiceConfig,
}

impl AudioChannelService {
    /// Create a service and spawn its notification dispatcher
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: ServiceConfig) -> Arc<Self> {
        let events = EventBus::new(config.event_capacity);
        let dispatcher = NotificationDispatcher::spawn(events.clone());
        info!(
            "Audio channel service started (delivery timeout {:?})",
            config.delivery_timeout
        );
        Arc::new(Self {
            registry: Mutex::new(AgentRegistry::new()),
            dispatcher,
            events,
            config,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to registry and delivery events
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Register a new agent: invisible and not playing
    pub async fn register(
        &self,
        category: ChannelCategory,
        group: Option<GroupId>,
        listener: Option<Weak<dyn PlayStateListener>>,
    ) -> AgentId {
        let group_id = group.unwrap_or_default();
        let agent_id = {
            let mut registry = self.registry.lock().await;
            registry.register(category, Some(group_id), listener)
        };

        info!("Registered {} agent {} (group {})", category, agent_id, group_id);
        self.events.emit_lossy(ChannelEvent::AgentRegistered {
            agent_id,
            category,
            group_id,
            timestamp: Utc::now(),
        });
        agent_id
    }

    /// Start playback and return the agent's arbitrated state
    ///
    /// Fails with `AlreadyPlaying` if the agent has not been stopped since
    /// its last start. The agent itself is not notified of this state; the
    /// return value is its notification.
    pub async fn start_playing(&self, id: AgentId) -> Result<PlayState> {
        let mut registry = self.registry.lock().await;
        registry.begin_playing(id)?;
        self.rearbitrate(&mut registry, Some(id));

        let record = registry.get(id)?;
        let state = record.state;
        info!("Agent {} ({}) started playing: {}", id, record.category, state);
        self.events.emit_lossy(ChannelEvent::PlaybackStarted {
            agent_id: id,
            category: record.category,
            state,
            timestamp: Utc::now(),
        });
        Ok(state)
    }

    /// Stop playback
    ///
    /// Waits first for notifications already queued for this agent, bounded
    /// by the configured delivery timeout. Stopping an agent that is not
    /// playing is a no-op.
    pub async fn stop_playing(&self, id: AgentId) -> Result<()> {
        self.await_pending_delivery(id).await?;

        let mut registry = self.registry.lock().await;
        self.stop_locked(&mut registry, id)
    }

    /// Report a visibility change
    ///
    /// Re-arbitrates when the agent is playing. The agent's own listener is
    /// notified if its state changes; delivery happens after this returns.
    pub async fn set_visibility(&self, id: AgentId, visible: bool) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let change = registry.set_visibility(id, visible)?;
        if change == VisibilityChange::Unchanged {
            return Ok(());
        }

        debug!("Agent {} visibility -> {}", id, visible);
        self.events.emit_lossy(ChannelEvent::VisibilityChanged {
            agent_id: id,
            visible,
            timestamp: Utc::now(),
        });

        if change.needs_recompute() {
            self.rearbitrate(&mut registry, None);
        }
        Ok(())
    }

    /// Remove an agent, stopping it first if it is still playing
    pub async fn unregister(&self, id: AgentId) -> Result<()> {
        self.await_pending_delivery(id).await?;

        let mut registry = self.registry.lock().await;
        self.stop_locked(&mut registry, id)?;
        registry.unregister(id)?;

        info!("Unregistered agent {}", id);
        self.events.emit_lossy(ChannelEvent::AgentUnregistered {
            agent_id: id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Last arbitrated state; `Muted` for an agent that is not playing
    pub async fn play_state(&self, id: AgentId) -> Result<PlayState> {
        let registry = self.registry.lock().await;
        Ok(registry.get(id)?.state)
    }

    pub async fn snapshot(&self) -> Vec<AgentSnapshot> {
        let registry = self.registry.lock().await;
        let mut agents = registry.snapshot();
        agents.sort_by_key(|a| a.id);
        agents
    }

    async fn await_pending_delivery(&self, id: AgentId) -> Result<()> {
        let barrier = {
            let registry = self.registry.lock().await;
            registry.get(id)?.delivery.barrier()
        };

        if !barrier.wait(self.config.delivery_timeout).await {
            warn!(
                "Agent {} still has undelivered notifications after {:?}, proceeding",
                id, self.config.delivery_timeout
            );
        }
        Ok(())
    }

    fn stop_locked(&self, registry: &mut AgentRegistry, id: AgentId) -> Result<()> {
        if !registry.get(id)?.playing {
            debug!("Agent {} is not playing, nothing to stop", id);
            return Ok(());
        }

        registry.end_playing(id)?;
        self.rearbitrate(registry, None);

        info!("Agent {} stopped playing", id);
        self.events.emit_lossy(ChannelEvent::PlaybackStopped {
            agent_id: id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Recompute, persist, and notify every agent whose state changed
    ///
    /// `initiator` receives its state as a return value instead of a
    /// notification.
    fn rearbitrate(&self, registry: &mut AgentRegistry, initiator: Option<AgentId>) {
        let decisions = arbiter::recompute(registry);
        let changes = arbiter::transitions(registry, &decisions);
        registry.apply(&decisions);

        for transition in changes {
            if Some(transition.agent) == initiator {
                continue;
            }
            self.notify(registry, transition);
        }
    }

    fn notify(&self, registry: &mut AgentRegistry, transition: Transition) {
        let Transition { agent, old, new } = transition;
        let Ok(record) = registry.get_mut(agent) else {
            return;
        };

        debug!("Agent {} state {} -> {}", agent, old, new);
        self.dispatcher.dispatch(record.delivery.notification(agent, new));
        self.events.emit_lossy(ChannelEvent::PlayStateChanged {
            agent_id: agent,
            old_state: old,
            new_state: new,
            timestamp: Utc::now(),
        });
    }
}
