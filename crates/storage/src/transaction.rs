//! Unit of work over the in-memory repository
//!
//! Writes are staged on the transaction and applied under a single lock
//! acquisition at commit. Every staged alert version is checked before
//! anything is written, so a conflicting commit leaves no partial state.

use crate::repository::Repository;
use alerting::ports::{Transaction, UnitOfWork};
use alerting::{AckEvent, Alert, AlertError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Transaction factory bound to a repository
pub struct MemoryUnitOfWork {
    repository: Arc<Repository>,
}

impl MemoryUnitOfWork {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AlertError> {
        Ok(Box::new(MemoryTransaction {
            repository: self.repository.clone(),
            events: Vec::new(),
            alerts: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    repository: Arc<Repository>,
    events: Vec<AckEvent>,
    /// Staged alert plus the version it was read at
    alerts: Vec<(Alert, u64)>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn save_ack_event(&mut self, event: &AckEvent) -> Result<(), AlertError> {
        self.events.push(event.clone());
        Ok(())
    }

    async fn update_alert(&mut self, alert: &mut Alert) -> Result<(), AlertError> {
        self.alerts.push((alert.clone(), alert.version));
        alert.version += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AlertError> {
        let mut tables = self.repository.lock()?;

        for (alert, expected) in &self.alerts {
            tables.check_version(alert, *expected)?;
        }
        for (alert, expected) in &self.alerts {
            tables.replace_alert(alert, *expected)?;
        }
        tables.ack_events.extend(self.events.iter().cloned());

        debug!(
            "Committed {} alert update(s) and {} ack event(s)",
            self.alerts.len(),
            self.events.len()
        );
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AlertError> {
        debug!(
            "Rolled back {} alert update(s) and {} ack event(s)",
            self.alerts.len(),
            self.events.len()
        );
        Ok(())
    }
}
