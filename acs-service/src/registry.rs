//! Agent registry
//!
//! Plain data: one [`AgentRecord`] per registered producer plus the index of
//! background group episodes. The registry never decides play states itself;
//! it only records what the arbiter computed and the history the arbiter
//! needs (carry flags and muted episodes).
//!
//! Not synchronized. The service owns the single instance behind its mutex.

use crate::agent::PlayStateListener;
use crate::arbiter::Decision;
use crate::dispatcher::DeliveryTarget;
use acs_common::{AgentId, ChannelCategory, Error, GroupId, PlayState, Result};
use std::collections::HashMap;
use std::sync::Weak;
use tracing::debug;

/// One registered audio producer
pub struct AgentRecord {
    pub id: AgentId,
    pub category: ChannelCategory,
    pub group: GroupId,
    pub visible: bool,
    pub playing: bool,
    /// Last state assigned by the arbiter; `Muted` while not playing
    pub state: PlayState,
    /// Audible in the background because playback continued through a
    /// foreground to background transition
    pub carried: bool,
    pub(crate) delivery: DeliveryTarget,
}

/// Background period of one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackgroundEpisode {
    /// A carried member stopped while backgrounded; new playback from the
    /// group starts muted until the group returns to the foreground
    pub muted: bool,
}

/// Outcome of a visibility update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityChange {
    /// The flag already had the requested value
    Unchanged,
    Changed { playing: bool },
}

impl VisibilityChange {
    /// Arbitration must run again: a playing agent's flag flipped
    pub fn needs_recompute(&self) -> bool {
        matches!(self, VisibilityChange::Changed { playing: true })
    }
}

/// Read-only view of a record for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub category: ChannelCategory,
    pub group: GroupId,
    pub visible: bool,
    pub playing: bool,
    pub state: PlayState,
    pub carried: bool,
}

impl From<&AgentRecord> for AgentSnapshot {
    fn from(record: &AgentRecord) -> Self {
        Self {
            id: record.id,
            category: record.category,
            group: record.group,
            visible: record.visible,
            playing: record.playing,
            state: record.state,
            carried: record.carried,
        }
    }
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, AgentRecord>,
    episodes: HashMap<GroupId, BackgroundEpisode>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record: invisible, not playing
    ///
    /// Without an explicit group the agent gets a group of its own.
    pub fn register(
        &mut self,
        category: ChannelCategory,
        group: Option<GroupId>,
        listener: Option<Weak<dyn PlayStateListener>>,
    ) -> AgentId {
        let id = AgentId::new();
        let group = group.unwrap_or_default();
        self.agents.insert(
            id,
            AgentRecord {
                id,
                category,
                group,
                visible: false,
                playing: false,
                state: PlayState::Muted,
                carried: false,
                delivery: DeliveryTarget::new(listener),
            },
        );
        id
    }

    pub fn get(&self, id: AgentId) -> Result<&AgentRecord> {
        self.agents.get(&id).ok_or(Error::UnknownAgent(id))
    }

    pub(crate) fn get_mut(&mut self, id: AgentId) -> Result<&mut AgentRecord> {
        self.agents.get_mut(&id).ok_or(Error::UnknownAgent(id))
    }

    pub fn records(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values()
    }

    /// Records taking part in arbitration
    pub fn active(&self) -> impl Iterator<Item = &AgentRecord> {
        self.agents.values().filter(|r| r.playing)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn episode(&self, group: GroupId) -> Option<BackgroundEpisode> {
        self.episodes.get(&group).copied()
    }

    /// Mark an agent as playing
    ///
    /// An invisible Content agent joins its group's carry when the group has
    /// an open, unmuted background episode. Any other invisible start is not
    /// carried and will be muted by the arbiter.
    pub fn begin_playing(&mut self, id: AgentId) -> Result<()> {
        let record = self.agents.get(&id).ok_or(Error::UnknownAgent(id))?;
        if record.playing {
            return Err(Error::AlreadyPlaying(id));
        }

        let joins_carry = record.category == ChannelCategory::Content
            && !record.visible
            && self
                .episodes
                .get(&record.group)
                .is_some_and(|episode| !episode.muted);

        let record = self.get_mut(id)?;
        record.playing = true;
        record.carried = joins_carry;
        record.state = PlayState::Muted;
        Ok(())
    }

    /// Mark an agent as stopped
    ///
    /// A carried Content agent stopping in the background marks its group
    /// episode muted, so a restart from the background does not resume audio.
    pub fn end_playing(&mut self, id: AgentId) -> Result<()> {
        let record = self.get_mut(id)?;
        let backgrounded_content =
            record.category == ChannelCategory::Content && record.carried && !record.visible;
        let group = record.group;

        record.playing = false;
        record.carried = false;
        record.state = PlayState::Muted;

        if backgrounded_content {
            debug!("Group {} muted for the rest of its background episode", group);
            self.episodes.entry(group).or_default().muted = true;
        }
        Ok(())
    }

    /// Update an agent's visibility
    pub fn set_visibility(&mut self, id: AgentId, visible: bool) -> Result<VisibilityChange> {
        let record = self.get_mut(id)?;
        if record.visible == visible {
            return Ok(VisibilityChange::Unchanged);
        }
        record.visible = visible;
        let playing = record.playing;
        let group = record.group;
        let category = record.category;

        if visible {
            record.carried = false;
            self.clear_episode_if_foreground(group);
        } else if playing && category.is_visibility_gated() {
            record.carried = true;
            if category == ChannelCategory::Content {
                self.episodes.entry(group).or_default();
            }
        }

        Ok(VisibilityChange::Changed { playing })
    }

    /// Remove a record
    ///
    /// Callers stop a playing agent first. The group episode is dropped once
    /// every remaining member is visible, or no member is left.
    pub fn unregister(&mut self, id: AgentId) -> Result<AgentRecord> {
        let record = self.agents.remove(&id).ok_or(Error::UnknownAgent(id))?;
        self.clear_episode_if_foreground(record.group);
        Ok(record)
    }

    /// Persist states computed by the arbiter
    pub fn apply(&mut self, decisions: &[Decision]) {
        for decision in decisions {
            if let Some(record) = self.agents.get_mut(&decision.agent) {
                record.state = decision.state;
            }
        }
    }

    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents.values().map(AgentSnapshot::from).collect()
    }

    fn clear_episode_if_foreground(&mut self, group: GroupId) {
        if self.group_fully_visible(group) && self.episodes.remove(&group).is_some() {
            debug!("Group {} back in foreground, background episode cleared", group);
        }
    }

    fn group_fully_visible(&self, group: GroupId) -> bool {
        self.agents
            .values()
            .filter(|r| r.group == group)
            .all(|r| r.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_visible(registry: &mut AgentRegistry, category: ChannelCategory, group: Option<GroupId>) -> AgentId {
        let id = registry.register(category, group, None);
        registry.set_visibility(id, true).unwrap();
        registry.begin_playing(id).unwrap();
        id
    }

    #[test]
    fn test_register_defaults() {
        let mut registry = AgentRegistry::new();
        let id = registry.register(ChannelCategory::Normal, None, None);
        let record = registry.get(id).unwrap();

        assert!(!record.visible);
        assert!(!record.playing);
        assert!(!record.carried);
        assert_eq!(record.state, PlayState::Muted);
        assert_eq!(registry.active().count(), 0);
    }

    #[test]
    fn test_double_begin_playing_rejected() {
        let mut registry = AgentRegistry::new();
        let id = registry.register(ChannelCategory::Normal, None, None);
        registry.begin_playing(id).unwrap();

        let err = registry.begin_playing(id).unwrap_err();
        assert!(matches!(err, Error::AlreadyPlaying(a) if a == id));
    }

    #[test]
    fn test_unknown_agent() {
        let mut registry = AgentRegistry::new();
        let ghost = AgentId::new();
        assert!(matches!(registry.begin_playing(ghost), Err(Error::UnknownAgent(_))));
        assert!(matches!(registry.set_visibility(ghost, true), Err(Error::UnknownAgent(_))));

        let id = registry.register(ChannelCategory::Alarm, None, None);
        registry.unregister(id).unwrap();
        assert!(matches!(registry.unregister(id), Err(Error::UnknownAgent(_))));
    }

    #[test]
    fn test_visibility_change_reports_recompute_only_when_playing() {
        let mut registry = AgentRegistry::new();
        let id = registry.register(ChannelCategory::Normal, None, None);

        let change = registry.set_visibility(id, true).unwrap();
        assert_eq!(change, VisibilityChange::Changed { playing: false });
        assert!(!change.needs_recompute());

        registry.begin_playing(id).unwrap();
        assert_eq!(registry.set_visibility(id, true).unwrap(), VisibilityChange::Unchanged);
        assert!(registry.set_visibility(id, false).unwrap().needs_recompute());
    }

    #[test]
    fn test_backgrounding_content_opens_episode_and_carries() {
        let mut registry = AgentRegistry::new();
        let id = playing_visible(&mut registry, ChannelCategory::Content, None);
        let group = registry.get(id).unwrap().group;

        registry.set_visibility(id, false).unwrap();
        assert!(registry.get(id).unwrap().carried);
        assert_eq!(registry.episode(group), Some(BackgroundEpisode { muted: false }));
    }

    #[test]
    fn test_backgrounding_normal_carries_without_episode() {
        let mut registry = AgentRegistry::new();
        let id = playing_visible(&mut registry, ChannelCategory::Normal, None);
        let group = registry.get(id).unwrap().group;

        registry.set_visibility(id, false).unwrap();
        assert!(registry.get(id).unwrap().carried);
        assert_eq!(registry.episode(group), None);
    }

    #[test]
    fn test_stop_in_background_mutes_episode() {
        let mut registry = AgentRegistry::new();
        let id = playing_visible(&mut registry, ChannelCategory::Content, None);
        let group = registry.get(id).unwrap().group;
        registry.set_visibility(id, false).unwrap();

        registry.end_playing(id).unwrap();
        assert_eq!(registry.episode(group), Some(BackgroundEpisode { muted: true }));

        registry.begin_playing(id).unwrap();
        assert!(!registry.get(id).unwrap().carried, "restart from muted episode is not carried");
    }

    #[test]
    fn test_sibling_joins_open_episode() {
        let mut registry = AgentRegistry::new();
        let group = GroupId::new();
        let first = playing_visible(&mut registry, ChannelCategory::Content, Some(group));
        let second = registry.register(ChannelCategory::Content, Some(group), None);

        registry.set_visibility(first, false).unwrap();
        registry.begin_playing(second).unwrap();
        assert!(registry.get(second).unwrap().carried);
    }

    #[test]
    fn test_episode_cleared_when_whole_group_visible() {
        let mut registry = AgentRegistry::new();
        let group = GroupId::new();
        let first = playing_visible(&mut registry, ChannelCategory::Content, Some(group));
        let second = playing_visible(&mut registry, ChannelCategory::Content, Some(group));

        registry.set_visibility(first, false).unwrap();
        registry.set_visibility(second, false).unwrap();
        registry.end_playing(first).unwrap();
        assert_eq!(registry.episode(group), Some(BackgroundEpisode { muted: true }));

        registry.set_visibility(first, true).unwrap();
        assert!(registry.episode(group).is_some(), "second member still hidden");
        registry.set_visibility(second, true).unwrap();
        assert_eq!(registry.episode(group), None);
    }

    #[test]
    fn test_unregister_last_member_drops_episode() {
        let mut registry = AgentRegistry::new();
        let id = playing_visible(&mut registry, ChannelCategory::Content, None);
        let group = registry.get(id).unwrap().group;
        registry.set_visibility(id, false).unwrap();
        registry.end_playing(id).unwrap();

        registry.unregister(id).unwrap();
        assert_eq!(registry.episode(group), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_hidden_member_clears_episode_of_visible_group() {
        let mut registry = AgentRegistry::new();
        let group = GroupId::new();
        let hidden = playing_visible(&mut registry, ChannelCategory::Content, Some(group));
        let visible = registry.register(ChannelCategory::Content, Some(group), None);
        registry.set_visibility(visible, true).unwrap();

        registry.set_visibility(hidden, false).unwrap();
        registry.end_playing(hidden).unwrap();
        assert_eq!(registry.episode(group), Some(BackgroundEpisode { muted: true }));

        registry.unregister(hidden).unwrap();
        assert_eq!(registry.episode(group), None);

        // A later background episode starts fresh, so siblings can join it
        let sibling = registry.register(ChannelCategory::Content, Some(group), None);
        registry.begin_playing(visible).unwrap();
        registry.set_visibility(visible, false).unwrap();
        assert_eq!(registry.episode(group), Some(BackgroundEpisode { muted: false }));
        registry.begin_playing(sibling).unwrap();
        assert!(registry.get(sibling).unwrap().carried);
    }
}
