//! Alert Entity
//!
//! The lifecycle state machine for a single alert occurrence:
//! `Active -> Acknowledged -> Resolved`, with `Active -> Resolved` allowed directly.

use crate::error::AlertError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Urgency of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    /// Map an Alertmanager `severity` label. Unknown values fall back to `Info`.
    pub fn from_label(value: &str) -> Self {
        match value {
            "critical" | "page" => Severity::Critical,
            "warning" | "warn" => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Active => "active",
            AlertState::Acknowledged => "acknowledged",
            AlertState::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One occurrence of a monitored condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique id of this occurrence
    pub id: String,
    /// Deduplication key supplied by the alert source
    pub fingerprint: String,
    pub name: String,
    pub instance: String,
    pub target: String,
    pub summary: String,
    pub description: String,
    pub severity: Severity,
    pub state: AlertState,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Channel name -> channel-native message or incident handle
    pub external_references: BTreeMap<String, String>,
    pub fired_at: DateTime<Utc>,
    pub acked_at: Option<DateTime<Utc>>,
    pub acked_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Only set for manual resolution
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-locking token, owned by the store
    pub version: u64,
}

impl Alert {
    /// Create a new active alert with a fresh id
    pub fn new(
        fingerprint: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            name: name.into(),
            instance: String::new(),
            target: String::new(),
            summary: String::new(),
            description: String::new(),
            severity,
            state: AlertState::Active,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            external_references: BTreeMap::new(),
            fired_at: now,
            acked_at: None,
            acked_by: None,
            resolved_at: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Mark the alert acknowledged.
    ///
    /// Fails with [`AlertError::AlreadyResolved`] on a resolved alert and with
    /// [`AlertError::AlreadyAcknowledged`] on an acknowledged one; neither
    /// failure touches the alert.
    pub fn acknowledge(&mut self, by: &str, at: DateTime<Utc>) -> Result<(), AlertError> {
        match self.state {
            AlertState::Resolved => Err(AlertError::AlreadyResolved),
            AlertState::Acknowledged => Err(AlertError::AlreadyAcknowledged),
            AlertState::Active => {
                self.state = AlertState::Acknowledged;
                self.acked_at = Some(at);
                self.acked_by = Some(by.to_string());
                self.updated_at = at;
                Ok(())
            }
        }
    }

    /// Resolve on behalf of the alert source
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.state = AlertState::Resolved;
        self.resolved_at = Some(at);
        self.updated_at = at;
    }

    /// Resolve manually on behalf of a user
    pub fn resolve_by(&mut self, by: &str, at: DateTime<Utc>) {
        self.resolve(at);
        self.resolved_by = Some(by.to_string());
    }

    pub fn is_active(&self) -> bool {
        self.state == AlertState::Active
    }

    pub fn is_acked(&self) -> bool {
        self.state == AlertState::Acknowledged
    }

    /// Active or acknowledged
    pub fn is_firing(&self) -> bool {
        self.state != AlertState::Resolved
    }

    pub fn is_resolved(&self) -> bool {
        self.state == AlertState::Resolved
    }

    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Record the handle a channel returned for this alert
    pub fn set_external_reference(&mut self, system: &str, handle: &str) {
        self.external_references
            .insert(system.to_string(), handle.to_string());
        self.updated_at = Utc::now();
    }

    pub fn external_reference(&self, system: &str) -> Option<&str> {
        self.external_references
            .get(system)
            .map(String::as_str)
            .filter(|handle| !handle.is_empty())
    }

    /// Whether the given channel actually received this alert
    pub fn has_external_reference(&self, system: &str) -> bool {
        self.external_reference(system).is_some()
    }
}
