//! # ACS Common Library
//!
//! Shared code for the audio channel service:
//! - Channel taxonomy (categories, play states, priorities)
//! - Agent and group identifiers
//! - Event types (ChannelEvent enum) and EventBus
//! - Configuration loading
//! - Error types

pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;

pub use channel::{ChannelCategory, PlayState};
pub use error::{Error, Result};
pub use ids::{AgentId, GroupId};
