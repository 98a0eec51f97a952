//! Recording listener and agent wrapper
//!
//! Delivery is asynchronous, so tests wait for an expected state with a
//! bounded poll. Not seeing it within the bound is a test failure.

use acs_service::{AudioChannelAgent, AudioChannelService, ChannelCategory, GroupId, PlayState, PlayStateListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::NOTIFY_TIMEOUT;

#[derive(Default)]
pub struct RecordingListener {
    states: Mutex<Vec<PlayState>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last(&self) -> Option<PlayState> {
        self.states.lock().unwrap().last().copied()
    }

    pub fn count(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    pub fn history(&self) -> Vec<PlayState> {
        self.states.lock().unwrap().clone()
    }

    /// Poll until the most recent notification equals `expected`
    pub async fn wait_for(&self, expected: PlayState) -> PlayState {
        let deadline = tokio::time::Instant::now() + NOTIFY_TIMEOUT;
        loop {
            if self.last() == Some(expected) {
                return expected;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {} notification, history: {:?}",
                    expected,
                    self.history()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl PlayStateListener for RecordingListener {
    fn on_play_state_changed(&self, state: PlayState) -> anyhow::Result<()> {
        self.states.lock().unwrap().push(state);
        Ok(())
    }
}

/// Agent facade together with the listener it reports to
pub struct TestAgent {
    pub agent: AudioChannelAgent,
    pub listener: Arc<RecordingListener>,
}

impl TestAgent {
    /// Register an agent; like a fresh media element it starts invisible
    pub async fn new(service: &Arc<AudioChannelService>, category: ChannelCategory) -> Self {
        let listener = RecordingListener::new();
        let agent = AudioChannelAgent::init(service, category, &listener).await;
        agent.set_visibility(false).await.unwrap();
        Self { agent, listener }
    }

    pub async fn in_group(
        service: &Arc<AudioChannelService>,
        category: ChannelCategory,
        group: GroupId,
    ) -> Self {
        let listener = RecordingListener::new();
        let agent = AudioChannelAgent::init_in_group(service, category, group, &listener).await;
        Self { agent, listener }
    }

    pub async fn start(&self) -> PlayState {
        self.agent.start_playing().await.unwrap()
    }

    pub async fn stop(&self) {
        self.agent.stop_playing().await.unwrap();
    }

    pub async fn show(&self) {
        self.agent.set_visibility(true).await.unwrap();
    }

    pub async fn hide(&self) {
        self.agent.set_visibility(false).await.unwrap();
    }

    pub async fn state(&self) -> PlayState {
        self.agent.current_play_state().await.unwrap()
    }

    /// Wait for the notified state and check it matches the registry
    pub async fn expect_notified(&self, expected: PlayState) {
        self.listener.wait_for(expected).await;
        assert_eq!(self.state().await, expected);
    }
}
