//! Acknowledgment Sync Engine
//!
//! Records an acknowledgment from any channel and pushes it to every other
//! channel that received the alert. Syncing never goes back to the channel
//! the acknowledgment came from, which keeps channel webhooks from echoing
//! acknowledgments between each other forever.

use crate::ack_event::{AckEvent, AckSource};
use crate::alert::Alert;
use crate::cancel::guarded;
use crate::error::AlertError;
use crate::ports::{AckSyncer, AlertStore, Transaction, UnitOfWork};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One acknowledgment action from any source
#[derive(Debug, Clone)]
pub struct SyncAckInput {
    pub alert_id: String,
    pub source: AckSource,
    pub user_id: String,
    pub user_email: String,
    pub user_name: String,
    pub note: Option<String>,
    pub duration: Option<Duration>,
}

impl SyncAckInput {
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.alert_id.trim().is_empty() {
            return Err(AlertError::Validation("alert id is required".into()));
        }
        if self.user_email.trim().is_empty() {
            return Err(AlertError::Validation("user email is required".into()));
        }
        Ok(())
    }

    fn to_event(&self) -> AckEvent {
        let mut event = AckEvent::new(
            &self.alert_id,
            self.source,
            &self.user_id,
            &self.user_email,
            &self.user_name,
        );
        if let Some(note) = self.note.as_deref().filter(|n| !n.is_empty()) {
            event = event.with_note(note);
        }
        if let Some(duration) = self.duration {
            event = event.with_duration(duration);
        }
        event
    }
}

/// A syncer call that failed
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub system: String,
    pub error: AlertError,
}

/// Result of one acknowledgment
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAckOutput {
    pub alert: Alert,
    pub ack_event: AckEvent,
    /// Systems the acknowledgment reached
    pub synced_to: Vec<String>,
    pub sync_errors: Vec<SyncFailure>,
    /// Fan-out stopped early because the request was cancelled
    pub cancelled: bool,
}

impl SyncAckOutput {
    /// The cancellation error to surface alongside the partial result
    pub fn cancellation(&self) -> Option<AlertError> {
        self.cancelled.then_some(AlertError::Cancelled)
    }
}

/// Acknowledgment Sync Engine
pub struct SyncAck {
    alerts: Arc<dyn AlertStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
    syncers: Vec<Arc<dyn AckSyncer>>,
}

impl SyncAck {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        syncers: Vec<Arc<dyn AckSyncer>>,
    ) -> Self {
        info!("Creating ack sync engine with {} syncers", syncers.len());
        Self {
            alerts,
            unit_of_work,
            syncers,
        }
    }

    pub fn add_syncer(&mut self, syncer: Arc<dyn AckSyncer>) {
        self.syncers.push(syncer);
    }

    /// Record an acknowledgment and propagate it to the other channels
    pub async fn execute(
        &self,
        input: SyncAckInput,
        cancel: &CancellationToken,
    ) -> Result<SyncAckOutput, AlertError> {
        input.validate()?;

        let mut alert = guarded(cancel, self.alerts.find_by_id(&input.alert_id))
            .await?
            .ok_or_else(|| AlertError::NotFound(format!("alert {}", input.alert_id)))?;

        let event = input.to_event();
        self.record(&mut alert, &event, cancel).await?;

        let mut output = SyncAckOutput {
            alert,
            ack_event: event,
            synced_to: Vec::new(),
            sync_errors: Vec::new(),
            cancelled: false,
        };
        self.fan_out(&mut output, cancel).await;

        metrics::counter!("acks_synced_total", "source" => input.source.as_str()).increment(1);
        info!(
            "Ack on alert {} from {} by {} synced to {:?}",
            output.alert.id, input.source, input.user_email, output.synced_to
        );

        Ok(output)
    }

    /// Persist the audit event and the state transition as one unit of work
    async fn record(
        &self,
        alert: &mut Alert,
        event: &AckEvent,
        cancel: &CancellationToken,
    ) -> Result<(), AlertError> {
        let mut tx = guarded(cancel, self.unit_of_work.begin()).await?;

        let applied = guarded(cancel, apply(tx.as_mut(), alert, event)).await;
        match applied {
            Ok(()) => guarded(cancel, tx.commit()).await,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        "Rollback of ack on alert {} failed: {}",
                        alert.id, rollback_err
                    );
                }
                Err(err)
            }
        }
    }

    async fn fan_out(&self, output: &mut SyncAckOutput, cancel: &CancellationToken) {
        let source = output.ack_event.source.as_str();

        for syncer in &self.syncers {
            let name = syncer.name();
            if !syncer.supports_ack() {
                continue;
            }
            if name == source {
                debug!("Skipping sync back to source {}", source);
                continue;
            }
            if !output.alert.has_external_reference(name) {
                debug!(
                    "Skipping sync to {}: alert {} was never delivered there",
                    name, output.alert.id
                );
                continue;
            }
            if cancel.is_cancelled() {
                output.cancelled = true;
                break;
            }

            match guarded(cancel, syncer.acknowledge(&output.alert, &output.ack_event)).await {
                Ok(()) => {
                    info!("Ack on alert {} synced to {}", output.alert.id, name);
                    output.synced_to.push(name.to_string());
                }
                Err(_) if cancel.is_cancelled() => {
                    output.cancelled = true;
                    break;
                }
                Err(err) => {
                    error!("Failed to sync ack on alert {} to {}: {}", output.alert.id, name, err);
                    metrics::counter!("ack_sync_errors_total", "syncer" => name.to_string())
                        .increment(1);
                    output.sync_errors.push(SyncFailure {
                        system: name.to_string(),
                        error: err,
                    });
                }
            }
        }
    }
}

/// Audit first, then transition. A resolved alert aborts the unit; an
/// already-acknowledged one keeps its original ack and the event still commits.
async fn apply(
    tx: &mut dyn Transaction,
    alert: &mut Alert,
    event: &AckEvent,
) -> Result<(), AlertError> {
    tx.save_ack_event(event).await?;

    match alert.acknowledge(&event.user_email, event.created_at) {
        Ok(()) => tx.update_alert(alert).await,
        Err(AlertError::AlreadyAcknowledged) => {
            debug!(
                "Alert {} already acknowledged by {:?}, continuing sync",
                alert.id, alert.acked_by
            );
            Ok(())
        }
        Err(err) => Err(err),
    }
}
