//! Common error types for ACS

use crate::ids::AgentId;
use thiserror::Error;

/// Common result type for ACS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the audio channel service
///
/// Every variant is local to the caller that triggered it. Arbitration itself
/// never produces an error.
#[derive(Error, Debug)]
pub enum Error {
    /// `start_playing` called twice without an intervening stop
    #[error("Agent already playing: {0}")]
    AlreadyPlaying(AgentId),

    /// Operation on an agent that was never registered or is already gone
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scenario replay failed (malformed step or unmet expectation)
    #[error("Scenario error: {0}")]
    Scenario(String),
}
