//! Agent facade
//!
//! The handle media playback code holds for one audio producer. It wraps an
//! agent id registered with an [`AudioChannelService`] and forwards every
//! call to the service.
//!
//! Listeners are held weakly: dropping the listener silently stops
//! notifications, it never keeps the producer alive.

use crate::service::AudioChannelService;
use acs_common::{AgentId, ChannelCategory, GroupId, PlayState, Result};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Receives play-state changes caused by other agents or by visibility
///
/// Called on the dispatcher task. Implementations should return quickly; an
/// error or panic is logged and reported as a `DeliveryFailed` event without
/// affecting other agents.
pub trait PlayStateListener: Send + Sync {
    fn on_play_state_changed(&self, state: PlayState) -> anyhow::Result<()>;
}

impl<F> PlayStateListener for F
where
    F: Fn(PlayState) -> anyhow::Result<()> + Send + Sync,
{
    fn on_play_state_changed(&self, state: PlayState) -> anyhow::Result<()> {
        self(state)
    }
}

pub struct AudioChannelAgent {
    service: Arc<AudioChannelService>,
    id: AgentId,
    category: ChannelCategory,
    released: bool,
}

impl AudioChannelAgent {
    /// Register a new agent in a group of its own
    pub async fn init<L>(
        service: &Arc<AudioChannelService>,
        category: ChannelCategory,
        listener: &Arc<L>,
    ) -> Self
    where
        L: PlayStateListener + 'static,
    {
        Self::register(service, category, None, Some(downgrade(listener))).await
    }

    /// Register a new agent sharing background behavior with `group`
    pub async fn init_in_group<L>(
        service: &Arc<AudioChannelService>,
        category: ChannelCategory,
        group: GroupId,
        listener: &Arc<L>,
    ) -> Self
    where
        L: PlayStateListener + 'static,
    {
        Self::register(service, category, Some(group), Some(downgrade(listener))).await
    }

    async fn register(
        service: &Arc<AudioChannelService>,
        category: ChannelCategory,
        group: Option<GroupId>,
        listener: Option<Weak<dyn PlayStateListener>>,
    ) -> Self {
        let id = service.register(category, group, listener).await;
        Self {
            service: Arc::clone(service),
            id,
            category,
            released: false,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn category(&self) -> ChannelCategory {
        self.category
    }

    pub async fn start_playing(&self) -> Result<PlayState> {
        self.service.start_playing(self.id).await
    }

    pub async fn stop_playing(&self) -> Result<()> {
        self.service.stop_playing(self.id).await
    }

    pub async fn set_visibility(&self, visible: bool) -> Result<()> {
        self.service.set_visibility(self.id, visible).await
    }

    pub async fn current_play_state(&self) -> Result<PlayState> {
        self.service.play_state(self.id).await
    }

    /// Unregister explicitly, stopping playback if needed
    pub async fn unregister(mut self) -> Result<()> {
        self.released = true;
        self.service.unregister(self.id).await
    }
}

impl Drop for AudioChannelAgent {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let service = Arc::clone(&self.service);
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = service.unregister(id).await {
                        debug!("Deferred unregister of agent {} skipped: {}", id, e);
                    }
                });
            }
            Err(_) => warn!("Agent {} dropped outside a tokio runtime, record left registered", id),
        }
    }
}

fn downgrade<L>(listener: &Arc<L>) -> Weak<dyn PlayStateListener>
where
    L: PlayStateListener + 'static,
{
    let listener: Arc<dyn PlayStateListener> = listener.clone();
    Arc::downgrade(&listener)
}
