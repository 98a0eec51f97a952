//! Test helper modules for acs-service integration tests
//!
//! - RecordingListener: captures every delivered play state
//! - TestAgent: agent facade paired with its recording listener
//! - wait helpers with bounded polling

#![allow(dead_code)]

pub mod recording_listener;

pub use recording_listener::{RecordingListener, TestAgent};

use acs_common::config::ServiceConfig;
use acs_service::AudioChannelService;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for any expected notification
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn test_service() -> Arc<AudioChannelService> {
    AudioChannelService::new(ServiceConfig {
        delivery_timeout: NOTIFY_TIMEOUT,
        event_capacity: 100,
    })
}
