//! Notification dispatcher
//!
//! Delivers play-state changes to agent listeners on a dedicated tokio task,
//! so the caller that triggered a recompute never runs foreign callbacks
//! while holding the registry lock.
//!
//! ```text
//! service (registry locked) ── Notification ──▶ unbounded mpsc ──▶ dispatcher task
//!                                                                    │ upgrade Weak listener
//!                                                                    │ on_play_state_changed()
//!                                                                    ▼
//!                                                          delivered seq (watch)
//! ```
//!
//! Each agent owns a [`DeliveryTarget`] numbering its notifications. The
//! dispatcher publishes the last completed sequence number on a `watch`
//! channel, which is what [`DeliveryBarrier`] waits on.

use crate::agent::PlayStateListener;
use acs_common::events::{ChannelEvent, EventBus};
use acs_common::{AgentId, PlayState};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace, warn};

/// Per-agent delivery bookkeeping, stored in the agent's registry record
pub struct DeliveryTarget {
    listener: Option<Weak<dyn PlayStateListener>>,
    /// Sequence number of the last notification queued for this agent
    issued: u64,
    /// Sequence number of the last notification the dispatcher finished with
    delivered: Arc<watch::Sender<u64>>,
}

impl DeliveryTarget {
    pub fn new(listener: Option<Weak<dyn PlayStateListener>>) -> Self {
        let (delivered, _) = watch::channel(0);
        Self {
            listener,
            issued: 0,
            delivered: Arc::new(delivered),
        }
    }

    /// Build the next notification for this agent
    pub fn notification(&mut self, agent_id: AgentId, state: PlayState) -> Notification {
        self.issued += 1;
        Notification {
            agent_id,
            state,
            seq: self.issued,
            listener: self.listener.clone(),
            delivered: Arc::clone(&self.delivered),
        }
    }

    /// Barrier covering every notification issued so far
    pub fn barrier(&self) -> DeliveryBarrier {
        DeliveryBarrier {
            rx: self.delivered.subscribe(),
            target: self.issued,
        }
    }

    /// Notifications queued but not yet delivered
    pub fn pending(&self) -> u64 {
        self.issued.saturating_sub(*self.delivered.borrow())
    }
}

/// Waits until the dispatcher has handled a given agent's notifications
pub struct DeliveryBarrier {
    rx: watch::Receiver<u64>,
    target: u64,
}

impl DeliveryBarrier {
    /// Wait for delivery, bounded by `timeout`
    ///
    /// Returns `false` if the bound elapsed first. A target whose sender is
    /// gone (agent record removed) counts as delivered.
    pub async fn wait(mut self, timeout: Duration) -> bool {
        let target = self.target;
        if *self.rx.borrow() >= target {
            return true;
        }
        match tokio::time::timeout(timeout, self.rx.wait_for(|seq| *seq >= target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }
}

/// One queued play-state change for one agent
pub struct Notification {
    pub agent_id: AgentId,
    pub state: PlayState,
    pub seq: u64,
    listener: Option<Weak<dyn PlayStateListener>>,
    delivered: Arc<watch::Sender<u64>>,
}

impl Notification {
    fn complete(&self) {
        self.delivered.send_if_modified(|seq| {
            if *seq < self.seq {
                *seq = self.seq;
                true
            } else {
                false
            }
        });
    }
}

/// Handle to the dispatcher task
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationDispatcher {
    /// Spawn the dispatcher task on the current tokio runtime
    ///
    /// The task ends once every handle has been dropped and the queue is
    /// drained.
    pub fn spawn(events: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, events));
        Self { tx }
    }

    /// Queue a notification; never blocks
    pub fn dispatch(&self, notification: Notification) {
        if let Err(mpsc::error::SendError(notification)) = self.tx.send(notification) {
            warn!(
                "Dispatcher stopped, dropping {} notification for agent {}",
                notification.state, notification.agent_id
            );
            notification.complete();
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Notification>, events: EventBus) {
    while let Some(notification) = rx.recv().await {
        deliver(&notification, &events);
        notification.complete();
    }
    debug!("Notification dispatcher stopped");
}

/// Invoke one listener, isolating its failures from everyone else
fn deliver(notification: &Notification, events: &EventBus) {
    let agent_id = notification.agent_id;
    let state = notification.state;

    let Some(listener) = notification.listener.as_ref().and_then(Weak::upgrade) else {
        debug!("Agent {} has no live listener, skipping {} notification", agent_id, state);
        return;
    };

    let reason = match catch_unwind(AssertUnwindSafe(|| listener.on_play_state_changed(state))) {
        Ok(Ok(())) => {
            trace!("Delivered {} to agent {} (seq {})", state, agent_id, notification.seq);
            return;
        }
        Ok(Err(e)) => {
            warn!("Listener for agent {} rejected {} notification: {:#}", agent_id, state, e);
            format!("{:#}", e)
        }
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "listener panicked".to_string());
            error!("Listener for agent {} panicked on {} notification: {}", agent_id, state, msg);
            msg
        }
    };

    events.emit_lossy(ChannelEvent::DeliveryFailed {
        agent_id,
        state,
        reason,
        timestamp: chrono::Utc::now(),
    });
}
