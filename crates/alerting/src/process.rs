//! Alert Processing Engine
//!
//! Turns one alert-source event into store writes and notifier fan-out while
//! keeping at most one firing alert per fingerprint. Persistence is
//! authoritative: store failures abort. Notification is best-effort: one
//! channel failing never stops the others.

use crate::alert::{Alert, Severity};
use crate::cancel::guarded;
use crate::error::AlertError;
use crate::ports::{AlertStore, EscalationNotifier, Notifier, SilenceStore, SubscriberMatcher};
use crate::subscriber::Subscriber;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts at persisting an external reference before giving up on version conflicts
const MAX_REFERENCE_WRITE_ATTEMPTS: usize = 3;

/// Status reported by the alert source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn parse(value: &str) -> Result<Self, AlertError> {
        match value {
            "firing" => Ok(AlertStatus::Firing),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(AlertError::Validation(format!(
                "unknown alert status {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound alert-source event
#[derive(Debug, Clone)]
pub struct ProcessAlertInput {
    pub fingerprint: String,
    pub status: AlertStatus,
    pub name: String,
    pub instance: String,
    pub target: String,
    pub summary: String,
    pub description: String,
    pub severity: Severity,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub fired_at: DateTime<Utc>,
}

impl ProcessAlertInput {
    /// Reject malformed input before any store access
    pub fn validate(&self) -> Result<(), AlertError> {
        if self.fingerprint.trim().is_empty() {
            return Err(AlertError::Validation("fingerprint is required".into()));
        }
        if self.name.trim().is_empty() {
            return Err(AlertError::Validation("alert name is required".into()));
        }
        Ok(())
    }

    fn to_alert(&self) -> Alert {
        let mut alert = Alert::new(&self.fingerprint, &self.name, self.severity);
        alert.instance = self.instance.clone();
        alert.target = self.target.clone();
        alert.summary = self.summary.clone();
        alert.description = self.description.clone();
        alert.fired_at = self.fired_at;
        for (key, value) in &self.labels {
            alert.add_label(key, value);
        }
        for (key, value) in &self.annotations {
            alert.add_annotation(key, value);
        }
        alert
    }
}

/// A notifier call that failed
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFailure {
    pub notifier: String,
    pub error: AlertError,
}

/// Result of paging a single subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationOutcome {
    Delivered(String),
    Failed(String),
}

/// Per-subscriber results of one sequential escalation, in delivery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationReport {
    pub notifier: String,
    pub results: Vec<(String, EscalationOutcome)>,
}

impl EscalationReport {
    /// First successful handle in delivery (priority) order
    pub fn first_delivered(&self) -> Option<&str> {
        self.results.iter().find_map(|(_, outcome)| match outcome {
            EscalationOutcome::Delivered(handle) => Some(handle.as_str()),
            EscalationOutcome::Failed(_) => None,
        })
    }
}

/// Outcome of processing one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessAlertOutput {
    /// Alert the event applied to; `None` when a resolve matched nothing
    pub alert_id: Option<String>,
    pub is_new: bool,
    pub is_silenced: bool,
    pub notifications_sent: Vec<String>,
    pub notifications_failed: Vec<NotificationFailure>,
    pub escalations: Vec<EscalationReport>,
    /// Fan-out stopped early because the request was cancelled
    pub cancelled: bool,
}

impl ProcessAlertOutput {
    /// The cancellation error to surface alongside the partial result
    pub fn cancellation(&self) -> Option<AlertError> {
        self.cancelled.then_some(AlertError::Cancelled)
    }
}

/// Subscribers resolved once per event for the capability-aware channels
#[derive(Default)]
struct Audience {
    broadcast: Vec<Subscriber>,
    escalation: Vec<Subscriber>,
}

/// Alert Processing Engine
pub struct ProcessAlert {
    alerts: Arc<dyn AlertStore>,
    silences: Arc<dyn SilenceStore>,
    notifiers: Vec<Arc<dyn Notifier>>,
    matcher: Option<Arc<dyn SubscriberMatcher>>,
}

impl ProcessAlert {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        silences: Arc<dyn SilenceStore>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        info!("Creating alert processor with {} notifiers", notifiers.len());
        Self {
            alerts,
            silences,
            notifiers,
            matcher: None,
        }
    }

    /// Enable subscriber-aware fan-out
    pub fn with_subscriber_matcher(mut self, matcher: Arc<dyn SubscriberMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Process one alert-source event
    pub async fn execute(
        &self,
        input: ProcessAlertInput,
        cancel: &CancellationToken,
    ) -> Result<ProcessAlertOutput, AlertError> {
        input.validate()?;

        let result = self.process(&input, cancel).await;
        let outcome = match &result {
            Ok(output) if output.is_silenced => "silenced",
            Ok(output) if output.is_new => "created",
            Ok(output) if output.alert_id.is_none() => "noop",
            Ok(_) => match input.status {
                AlertStatus::Firing => "duplicate",
                AlertStatus::Resolved => "resolved",
            },
            Err(_) => "error",
        };
        metrics::counter!(
            "alerts_processed_total",
            "status" => input.status.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        result
    }

    async fn process(
        &self,
        input: &ProcessAlertInput,
        cancel: &CancellationToken,
    ) -> Result<ProcessAlertOutput, AlertError> {
        let mut output = ProcessAlertOutput::default();

        let existing = guarded(cancel, self.alerts.find_by_fingerprint(&input.fingerprint)).await?;
        let firing = existing.into_iter().find(Alert::is_firing);

        match input.status {
            AlertStatus::Resolved => {
                let Some(mut alert) = firing else {
                    debug!("No firing alert to resolve for fingerprint {}", input.fingerprint);
                    return Ok(output);
                };

                alert.resolve(Utc::now());
                guarded(cancel, self.alerts.update(&mut alert)).await?;
                info!("Alert {} resolved (fingerprint {})", alert.id, alert.fingerprint);

                output.alert_id = Some(alert.id.clone());
                self.update_notifications(&alert, &mut output, cancel).await;
            }
            AlertStatus::Firing => {
                if let Some(alert) = firing {
                    debug!(
                        "Alert {} already firing for fingerprint {}, skipping",
                        alert.id, input.fingerprint
                    );
                    output.alert_id = Some(alert.id);
                    return Ok(output);
                }

                let mut alert = input.to_alert();
                let silenced = self.is_silenced(&alert, cancel).await?;

                if let Err(err) = guarded(cancel, self.alerts.save(&alert)).await {
                    return match err {
                        AlertError::DuplicateFingerprint(_) => {
                            self.concede_to_winner(input, err, output, cancel).await
                        }
                        other => Err(other),
                    };
                }
                output.alert_id = Some(alert.id.clone());
                output.is_new = true;

                if silenced {
                    output.is_silenced = true;
                    return Ok(output);
                }

                info!(
                    "New {} alert {} ({}) for fingerprint {}",
                    alert.severity, alert.id, alert.name, alert.fingerprint
                );
                self.send_notifications(&mut alert, &mut output, cancel)
                    .await?;
            }
        }

        Ok(output)
    }

    /// A concurrent event inserted the same fingerprint first; report its alert
    async fn concede_to_winner(
        &self,
        input: &ProcessAlertInput,
        err: AlertError,
        mut output: ProcessAlertOutput,
        cancel: &CancellationToken,
    ) -> Result<ProcessAlertOutput, AlertError> {
        let existing = guarded(cancel, self.alerts.find_by_fingerprint(&input.fingerprint)).await?;
        match existing.into_iter().find(Alert::is_firing) {
            Some(winner) => {
                debug!(
                    "Lost insert race for fingerprint {}, existing alert {} wins",
                    input.fingerprint, winner.id
                );
                output.alert_id = Some(winner.id);
                Ok(output)
            }
            None => Err(err),
        }
    }

    /// Silence lookup fails open: an outage never drops a notification
    async fn is_silenced(
        &self,
        alert: &Alert,
        cancel: &CancellationToken,
    ) -> Result<bool, AlertError> {
        match guarded(cancel, self.silences.find_matching_alert(alert)).await {
            Ok(silences) => {
                if let Some(silence) = silences.first() {
                    info!(
                        "Alert {} is silenced by {} until {}",
                        alert.id, silence.id, silence.end_at
                    );
                }
                Ok(!silences.is_empty())
            }
            Err(AlertError::Cancelled) if cancel.is_cancelled() => Err(AlertError::Cancelled),
            Err(err) => {
                warn!("Failed to check silences for alert {}: {}", alert.id, err);
                Ok(false)
            }
        }
    }

    fn audience(&self, alert: &Alert) -> Audience {
        let Some(matcher) = &self.matcher else {
            return Audience::default();
        };

        let audience = Audience {
            broadcast: matcher.match_for_broadcast(alert),
            escalation: matcher.match_for_escalation(alert),
        };
        if !audience.broadcast.is_empty() {
            let names: Vec<_> = audience.broadcast.iter().map(|s| s.name.as_str()).collect();
            info!("Alert {} broadcast subscribers: {:?}", alert.id, names);
        }
        if !audience.escalation.is_empty() {
            let names: Vec<_> = audience
                .escalation
                .iter()
                .map(|s| format!("{}({})", s.name, s.match_count))
                .collect();
            info!("Alert {} escalation subscribers: {:?}", alert.id, names);
        }
        audience
    }

    async fn send_notifications(
        &self,
        alert: &mut Alert,
        output: &mut ProcessAlertOutput,
        cancel: &CancellationToken,
    ) -> Result<(), AlertError> {
        let audience = self.audience(alert);

        for notifier in &self.notifiers {
            let name = notifier.name().to_string();
            if cancel.is_cancelled() {
                output.cancelled = true;
                break;
            }

            let delivered = self
                .deliver(notifier.as_ref(), alert, &audience, output, cancel)
                .await;
            let handle = match delivered {
                Ok(handle) => handle,
                Err(_) if cancel.is_cancelled() => {
                    output.cancelled = true;
                    break;
                }
                Err(err) => {
                    error!("Notification via {} failed for alert {}: {}", name, alert.id, err);
                    metrics::counter!("notifications_total", "notifier" => name.clone(), "result" => "failed")
                        .increment(1);
                    output.notifications_failed.push(NotificationFailure {
                        notifier: name,
                        error: err,
                    });
                    continue;
                }
            };

            metrics::counter!("notifications_total", "notifier" => name.clone(), "result" => "sent")
                .increment(1);
            info!("Notification sent via {} for alert {} ({})", name, alert.id, handle);

            // A delivered handle is persisted even if the request was cancelled meanwhile.
            self.store_reference(alert, &name, &handle).await?;
            output.notifications_sent.push(name);
        }

        Ok(())
    }

    /// Pick the delivery path from the notifier's capabilities
    async fn deliver(
        &self,
        notifier: &dyn Notifier,
        alert: &Alert,
        audience: &Audience,
        output: &mut ProcessAlertOutput,
        cancel: &CancellationToken,
    ) -> Result<String, AlertError> {
        if !audience.broadcast.is_empty() {
            if let Some(broadcast) = notifier.as_broadcast() {
                return guarded(cancel, broadcast.notify_with_mentions(alert, &audience.broadcast))
                    .await;
            }
        }

        if !audience.escalation.is_empty() {
            if let Some(escalation) = notifier.as_escalation() {
                let report = escalate(
                    notifier.name(),
                    escalation,
                    alert,
                    &audience.escalation,
                    cancel,
                )
                .await;
                let first = report.first_delivered().map(str::to_string);
                output.escalations.push(report);
                if let Some(handle) = first {
                    return Ok(handle);
                }
                if cancel.is_cancelled() {
                    return Err(AlertError::Cancelled);
                }
                warn!(
                    "All subscriber escalations via {} failed for alert {}, using default route",
                    notifier.name(),
                    alert.id
                );
            }
        }

        guarded(cancel, notifier.notify(alert)).await
    }

    /// Persist a channel handle, re-loading and merging on concurrent updates
    async fn store_reference(
        &self,
        alert: &mut Alert,
        system: &str,
        handle: &str,
    ) -> Result<(), AlertError> {
        alert.set_external_reference(system, handle);

        let mut attempt = 1;
        loop {
            match self.alerts.update(alert).await {
                Ok(()) => return Ok(()),
                Err(AlertError::VersionConflict { .. }) if attempt < MAX_REFERENCE_WRITE_ATTEMPTS => {
                    attempt += 1;
                    warn!(
                        "Alert {} changed while storing {} reference, retrying (attempt {})",
                        alert.id, system, attempt
                    );
                    let mut latest = self
                        .alerts
                        .find_by_id(&alert.id)
                        .await?
                        .ok_or_else(|| AlertError::NotFound(format!("alert {}", alert.id)))?;
                    for (name, existing) in &alert.external_references {
                        latest
                            .external_references
                            .entry(name.clone())
                            .or_insert_with(|| existing.clone());
                    }
                    latest.set_external_reference(system, handle);
                    *alert = latest;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Push the resolved state to every channel that holds a reference
    async fn update_notifications(
        &self,
        alert: &Alert,
        output: &mut ProcessAlertOutput,
        cancel: &CancellationToken,
    ) {
        for notifier in &self.notifiers {
            let name = notifier.name().to_string();
            let Some(handle) = alert.external_reference(&name) else {
                continue;
            };
            if cancel.is_cancelled() {
                output.cancelled = true;
                break;
            }

            match guarded(cancel, notifier.update_message(handle, alert)).await {
                Ok(()) => {
                    debug!("Updated {} message {} for alert {}", name, handle, alert.id);
                    output.notifications_sent.push(name);
                }
                Err(_) if cancel.is_cancelled() => {
                    output.cancelled = true;
                    break;
                }
                Err(err) => {
                    error!(
                        "Failed to update {} message {} for alert {}: {}",
                        name, handle, alert.id, err
                    );
                    output.notifications_failed.push(NotificationFailure {
                        notifier: name,
                        error: err,
                    });
                }
            }
        }
    }
}

/// Page subscribers one at a time, most specific first.
///
/// Stops at the first cancellation; the report keeps every page made so far.
async fn escalate(
    notifier: &str,
    escalation: &dyn EscalationNotifier,
    alert: &Alert,
    subscribers: &[Subscriber],
    cancel: &CancellationToken,
) -> EscalationReport {
    let mut report = EscalationReport {
        notifier: notifier.to_string(),
        results: Vec::with_capacity(subscribers.len()),
    };

    for subscriber in subscribers {
        if cancel.is_cancelled() {
            debug!(
                "Escalation of alert {} via {} cancelled before {}",
                alert.id, notifier, subscriber.name
            );
            break;
        }
        let outcome = match guarded(cancel, escalation.notify_subscriber(alert, subscriber)).await {
            Ok(handle) => {
                info!(
                    "Escalated alert {} to {} via {} ({})",
                    alert.id, subscriber.name, notifier, handle
                );
                EscalationOutcome::Delivered(handle)
            }
            Err(_) if cancel.is_cancelled() => break,
            Err(err) => {
                error!(
                    "Escalation of alert {} to {} via {} failed: {}",
                    alert.id, subscriber.name, notifier, err
                );
                EscalationOutcome::Failed(err.to_string())
            }
        };
        report.results.push((subscriber.name.clone(), outcome));
    }

    report
}
