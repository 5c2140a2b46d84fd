//! Repository Implementation

use crate::StorageError;
use alerting::ports::{AckEventStore, AlertStore, SilenceStore};
use alerting::{AckEvent, Alert, AlertError, SilenceMark};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Everything guarded by the repository lock
#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) alerts: HashMap<String, Alert>,
    /// Fingerprint -> id of its firing alert; the unique index
    pub(crate) firing: HashMap<String, String>,
    pub(crate) ack_events: Vec<AckEvent>,
    pub(crate) silences: Vec<SilenceMark>,
}

impl Tables {
    pub(crate) fn insert_alert(&mut self, alert: &Alert) -> Result<(), StorageError> {
        if alert.is_firing() && self.firing.contains_key(&alert.fingerprint) {
            return Err(StorageError::UniqueViolation(alert.fingerprint.clone()));
        }
        if self.alerts.contains_key(&alert.id) {
            return Err(StorageError::DatabaseError(format!(
                "alert {} already exists",
                alert.id
            )));
        }

        if alert.is_firing() {
            self.firing
                .insert(alert.fingerprint.clone(), alert.id.clone());
        }
        self.alerts.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    /// Check that `expected` is still the stored version of `alert`
    pub(crate) fn check_version(&self, alert: &Alert, expected: u64) -> Result<(), StorageError> {
        let stored = self
            .alerts
            .get(&alert.id)
            .ok_or_else(|| StorageError::NotFound(format!("alert {}", alert.id)))?;
        if stored.version != expected {
            return Err(StorageError::VersionMismatch {
                id: alert.id.clone(),
                expected,
                actual: stored.version,
            });
        }
        Ok(())
    }

    /// Write `alert` as version `expected + 1`, keeping the firing index current
    pub(crate) fn replace_alert(&mut self, alert: &Alert, expected: u64) -> Result<(), StorageError> {
        self.check_version(alert, expected)?;

        if alert.is_firing() {
            match self.firing.get(&alert.fingerprint) {
                Some(owner) if owner != &alert.id => {
                    return Err(StorageError::UniqueViolation(alert.fingerprint.clone()));
                }
                Some(_) => {}
                None => {
                    self.firing
                        .insert(alert.fingerprint.clone(), alert.id.clone());
                }
            }
        } else if self.firing.get(&alert.fingerprint) == Some(&alert.id) {
            self.firing.remove(&alert.fingerprint);
        }

        let mut stored = alert.clone();
        stored.version = expected + 1;
        self.alerts.insert(stored.id.clone(), stored);
        Ok(())
    }
}

/// In-memory repository for alerts, ack events, and silences
pub struct Repository {
    tables: Mutex<Tables>,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    /// Register a silence
    pub fn add_silence(&self, silence: SilenceMark) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        info!(
            "Adding silence {} by {} until {}",
            silence.id, silence.created_by, silence.end_at
        );
        tables.silences.push(silence);
        Ok(())
    }

    /// Remove a silence by id
    pub fn remove_silence(&self, id: &str) -> Result<SilenceMark, StorageError> {
        let mut tables = self.lock()?;
        let index = tables
            .silences
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("silence {}", id)))?;
        Ok(tables.silences.remove(index))
    }

    /// Silences whose window contains now
    pub fn active_silences(&self) -> Result<Vec<SilenceMark>, StorageError> {
        let now = Utc::now();
        let tables = self.lock()?;
        Ok(tables
            .silences
            .iter()
            .filter(|s| s.is_active_at(now))
            .cloned()
            .collect())
    }

    /// Get total alert count
    pub fn alert_count(&self) -> usize {
        self.lock().map(|t| t.alerts.len()).unwrap_or(0)
    }

    /// Get count of alerts that are not resolved
    pub fn firing_count(&self) -> usize {
        self.lock().map(|t| t.firing.len()).unwrap_or(0)
    }

    /// Get total ack event count
    pub fn ack_event_count(&self) -> usize {
        self.lock().map(|t| t.ack_events.len()).unwrap_or(0)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        if let Ok(mut tables) = self.lock() {
            *tables = Tables::default();
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for Repository {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Alert>, AlertError> {
        let tables = self.lock()?;
        let mut alerts: Vec<Alert> = tables
            .alerts
            .values()
            .filter(|a| a.fingerprint == fingerprint)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Alert>, AlertError> {
        let tables = self.lock()?;
        Ok(tables.alerts.get(id).cloned())
    }

    async fn save(&self, alert: &Alert) -> Result<(), AlertError> {
        let mut tables = self.lock()?;
        tables.insert_alert(alert)?;
        debug!("Inserted alert {} (fingerprint {})", alert.id, alert.fingerprint);
        Ok(())
    }

    async fn update(&self, alert: &mut Alert) -> Result<(), AlertError> {
        let mut tables = self.lock()?;
        tables.replace_alert(alert, alert.version)?;
        alert.version += 1;
        debug!("Updated alert {} to version {}", alert.id, alert.version);
        Ok(())
    }
}

#[async_trait]
impl AckEventStore for Repository {
    async fn save(&self, event: &AckEvent) -> Result<(), AlertError> {
        let mut tables = self.lock()?;
        tables.ack_events.push(event.clone());
        Ok(())
    }

    async fn find_by_alert(&self, alert_id: &str) -> Result<Vec<AckEvent>, AlertError> {
        let tables = self.lock()?;
        Ok(tables
            .ack_events
            .iter()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SilenceStore for Repository {
    async fn find_matching_alert(&self, alert: &Alert) -> Result<Vec<SilenceMark>, AlertError> {
        let now = Utc::now();
        let tables = self.lock()?;
        Ok(tables
            .silences
            .iter()
            .filter(|s| s.is_active_at(now) && s.matches(alert))
            .cloned()
            .collect())
    }
}
