//! # ACS Audio Channel Service Library (acs-service)
//!
//! Arbitration authority deciding, for every registered audio producer,
//! whether it may play normally, must be muted, or must play faded.
//!
//! **Architecture:**
//! - [`registry`]: agent records and background group episodes
//! - [`arbiter`]: pure policy evaluation over the registry
//! - [`dispatcher`]: asynchronous play-state notifications
//! - [`service`]: single ordering point tying the three together
//! - [`agent`]: handle used by media playback code
//! - [`scenario`]: scripted replay used by the `acs-sim` binary

pub mod agent;
pub mod arbiter;
pub mod dispatcher;
pub mod registry;
pub mod scenario;
pub mod service;

pub use acs_common::{AgentId, ChannelCategory, Error, GroupId, PlayState, Result};
pub use agent::{AudioChannelAgent, PlayStateListener};
pub use service::AudioChannelService;
