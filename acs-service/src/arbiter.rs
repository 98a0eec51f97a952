//! Arbitration engine
//!
//! Pure policy evaluation: given the registry, compute the play state of
//! every active agent. Never fails and never mutates; the service applies
//! the result.
//!
//! Rules, in order of precedence:
//! 1. Exclusive categories (Alarm and above): only the highest active one
//!    plays. Every agent of that category is Normal, every lower exclusive
//!    agent is Muted, visibility notwithstanding.
//! 2. While any exclusive category is active, Notification, Normal and
//!    Content agents are Muted.
//! 3. Notification agents are otherwise Normal, visible or not.
//! 4. Normal/Content agents are Normal when visible. Hidden ones are audible
//!    only when carried into the background; they are Faded while a
//!    notification plays and Normal otherwise. Hidden, uncarried agents are
//!    Muted.

use crate::registry::{AgentRegistry, AgentSnapshot};
use acs_common::{AgentId, ChannelCategory, PlayState};
use tracing::debug;

/// Computed state for one active agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub agent: AgentId,
    pub state: PlayState,
}

/// Recorded state differs from the computed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub agent: AgentId,
    pub old: PlayState,
    pub new: PlayState,
}

/// Registry-wide facts every per-agent decision depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ActiveSummary {
    top_exclusive: Option<ChannelCategory>,
    notification_active: bool,
}

impl ActiveSummary {
    fn of<'a>(active: impl Iterator<Item = &'a AgentSnapshot>) -> Self {
        active.fold(Self::default(), |mut summary, record| {
            let category = record.category;
            if category.is_exclusive()
                && summary
                    .top_exclusive
                    .map_or(true, |top| category.priority() > top.priority())
            {
                summary.top_exclusive = Some(category);
            }
            if category == ChannelCategory::Notification {
                summary.notification_active = true;
            }
            summary
        })
    }
}

/// Compute the state of every active agent
///
/// Decisions are sorted by agent id so repeated calls over the same
/// registry compare equal.
pub fn recompute(registry: &AgentRegistry) -> Vec<Decision> {
    let active: Vec<AgentSnapshot> = registry.active().map(AgentSnapshot::from).collect();
    recompute_snapshot(&active)
}

/// Same as [`recompute`], over a snapshot taken from the service
///
/// Entries that are not playing are skipped. A settled service satisfies
/// `recompute_snapshot(&snapshot)` matching the recorded states.
pub fn recompute_snapshot(agents: &[AgentSnapshot]) -> Vec<Decision> {
    let active = || agents.iter().filter(|a| a.playing);
    let summary = ActiveSummary::of(active());

    let mut decisions: Vec<Decision> = active()
        .map(|record| Decision {
            agent: record.id,
            state: decide(record, summary),
        })
        .collect();
    decisions.sort_by_key(|d| d.agent);
    decisions
}

/// Decisions whose state differs from what the registry recorded
pub fn transitions(registry: &AgentRegistry, decisions: &[Decision]) -> Vec<Transition> {
    decisions
        .iter()
        .filter_map(|decision| {
            let record = registry.get(decision.agent).ok()?;
            (record.state != decision.state).then_some(Transition {
                agent: decision.agent,
                old: record.state,
                new: decision.state,
            })
        })
        .collect()
}

fn decide(record: &AgentSnapshot, summary: ActiveSummary) -> PlayState {
    let category = record.category;

    let state = match summary.top_exclusive {
        Some(top) if category.is_exclusive() => {
            if category.priority() < top.priority() {
                PlayState::Muted
            } else {
                PlayState::Normal
            }
        }
        Some(_) => PlayState::Muted,
        None if category == ChannelCategory::Notification => PlayState::Normal,
        None if record.visible => PlayState::Normal,
        None if record.carried => {
            if summary.notification_active {
                PlayState::Faded
            } else {
                PlayState::Normal
            }
        }
        None => PlayState::Muted,
    };

    debug!(
        "Agent {} ({}, visible={}, carried={}) -> {}",
        record.id, category, record.visible, record.carried, state
    );
    state
}
