//! Silence marks
//!
//! Silences suppress notification (never storage) for alerts whose labels
//! match during a time window.

use crate::alert::Alert;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Label-equality silence active between `start_at` and `end_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceMark {
    pub id: String,
    pub matchers: BTreeMap<String, String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub created_by: String,
    pub reason: Option<String>,
}

impl SilenceMark {
    pub fn new(
        matchers: BTreeMap<String, String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            matchers,
            start_at,
            end_at,
            created_by: created_by.into(),
            reason: None,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    /// All matchers must equal the alert's labels; an empty silence matches nothing
    pub fn matches(&self, alert: &Alert) -> bool {
        !self.matchers.is_empty()
            && self
                .matchers
                .iter()
                .all(|(key, value)| alert.label(key) == Some(value.as_str()))
    }
}
