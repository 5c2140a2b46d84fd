//! Acknowledgment audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Channel an acknowledgment originated from.
///
/// The string form matches the notifier/syncer name of the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckSource {
    Slack,
    #[serde(rename = "pagerduty")]
    PagerDuty,
    Api,
}

impl AckSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckSource::Slack => "slack",
            AckSource::PagerDuty => "pagerduty",
            AckSource::Api => "api",
        }
    }
}

impl fmt::Display for AckSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one acknowledgment action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEvent {
    pub id: String,
    pub alert_id: String,
    pub source: AckSource,
    /// Platform-specific user id
    pub user_id: String,
    /// Cross-channel correlation key
    pub user_email: String,
    pub user_name: String,
    pub note: Option<String>,
    /// Silence/snooze length, if requested
    pub duration: Option<Duration>,
    pub created_at: DateTime<Utc>,
}

impl AckEvent {
    pub fn new(
        alert_id: impl Into<String>,
        source: AckSource,
        user_id: impl Into<String>,
        user_email: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            alert_id: alert_id.into(),
            source,
            user_id: user_id.into(),
            user_email: user_email.into(),
            user_name: user_name.into(),
            note: None,
            duration: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn has_note(&self) -> bool {
        self.note.as_deref().map_or(false, |n| !n.is_empty())
    }

    pub fn has_duration(&self) -> bool {
        self.duration.map_or(false, |d| !d.is_zero())
    }
}
