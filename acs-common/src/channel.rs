//! Channel taxonomy
//!
//! Static classification of audio channel categories and the play states the
//! arbiter can assign to them.
//!
//! Categories are ordered by priority, lowest first:
//! Normal < Content < Notification < Alarm < Telephony < Ringer < PublicNotification
//!
//! Alarm and above are *exclusive*: only the highest active exclusive
//! category plays. Normal and Content are governed by visibility instead.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio channel category of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelCategory {
    /// Generic page/app audio
    Normal,
    /// Media content (music, video) that may continue in the background
    Content,
    /// Short notification sounds; fade background content instead of muting it
    Notification,
    Alarm,
    Telephony,
    Ringer,
    /// Public notifications (e.g. regulatory announcements); top priority
    #[serde(alias = "public_notification", alias = "public-notification")]
    PublicNotification,
}

impl ChannelCategory {
    /// All categories in ascending priority order
    pub const ALL: [ChannelCategory; 7] = [
        ChannelCategory::Normal,
        ChannelCategory::Content,
        ChannelCategory::Notification,
        ChannelCategory::Alarm,
        ChannelCategory::Telephony,
        ChannelCategory::Ringer,
        ChannelCategory::PublicNotification,
    ];

    /// Fixed priority rank (higher wins)
    pub fn priority(&self) -> u8 {
        match self {
            ChannelCategory::Normal => 0,
            ChannelCategory::Content => 1,
            ChannelCategory::Notification => 2,
            ChannelCategory::Alarm => 3,
            ChannelCategory::Telephony => 4,
            ChannelCategory::Ringer => 5,
            ChannelCategory::PublicNotification => 6,
        }
    }

    /// Whether only the highest active category of this class may play
    pub fn is_exclusive(&self) -> bool {
        matches!(
            self,
            ChannelCategory::Alarm
                | ChannelCategory::Telephony
                | ChannelCategory::Ringer
                | ChannelCategory::PublicNotification
        )
    }

    /// Normal and Content: audibility depends on visibility
    pub fn is_visibility_gated(&self) -> bool {
        matches!(self, ChannelCategory::Normal | ChannelCategory::Content)
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelCategory::Normal => "normal",
            ChannelCategory::Content => "content",
            ChannelCategory::Notification => "notification",
            ChannelCategory::Alarm => "alarm",
            ChannelCategory::Telephony => "telephony",
            ChannelCategory::Ringer => "ringer",
            ChannelCategory::PublicNotification => "publicnotification",
        }
    }
}

impl fmt::Display for ChannelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(ChannelCategory::Normal),
            "content" => Ok(ChannelCategory::Content),
            "notification" => Ok(ChannelCategory::Notification),
            "alarm" => Ok(ChannelCategory::Alarm),
            "telephony" => Ok(ChannelCategory::Telephony),
            "ringer" => Ok(ChannelCategory::Ringer),
            "publicnotification" | "public_notification" | "public-notification" => {
                Ok(ChannelCategory::PublicNotification)
            }
            other => Err(Error::InvalidInput(format!(
                "unknown channel category '{}'",
                other
            ))),
        }
    }
}

/// Play state assigned to an active agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    /// Must not be audible
    Muted,
    /// Audible at full volume
    Normal,
    /// Audible at reduced volume
    Faded,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Muted => "muted",
            PlayState::Normal => "normal",
            PlayState::Faded => "faded",
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "muted" => Ok(PlayState::Muted),
            "normal" => Ok(PlayState::Normal),
            "faded" => Ok(PlayState::Faded),
            other => Err(Error::InvalidInput(format!("unknown play state '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_strictly_ascending() {
        for pair in ChannelCategory::ALL.windows(2) {
            assert!(
                pair[0].priority() < pair[1].priority(),
                "{} should rank below {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_exclusive_categories() {
        let exclusive: Vec<_> = ChannelCategory::ALL
            .iter()
            .filter(|c| c.is_exclusive())
            .copied()
            .collect();
        assert_eq!(
            exclusive,
            vec![
                ChannelCategory::Alarm,
                ChannelCategory::Telephony,
                ChannelCategory::Ringer,
                ChannelCategory::PublicNotification,
            ]
        );
        assert!(!ChannelCategory::Notification.is_exclusive());
        assert!(!ChannelCategory::Notification.is_visibility_gated());
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            "public-notification".parse::<ChannelCategory>().unwrap(),
            ChannelCategory::PublicNotification
        );
        assert_eq!(
            "PUBLIC_NOTIFICATION".parse::<ChannelCategory>().unwrap(),
            ChannelCategory::PublicNotification
        );
        assert_eq!("Content".parse::<ChannelCategory>().unwrap(), ChannelCategory::Content);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            "speaker".parse::<ChannelCategory>(),
            Err(Error::InvalidInput(_))
        ));
        assert!("loud".parse::<PlayState>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for category in ChannelCategory::ALL {
            assert_eq!(category.to_string().parse::<ChannelCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_serde_lowercase_names() {
        let json = serde_json::to_string(&ChannelCategory::PublicNotification).unwrap();
        assert_eq!(json, "\"publicnotification\"");
        let state: PlayState = serde_json::from_str("\"faded\"").unwrap();
        assert_eq!(state, PlayState::Faded);
    }
}
