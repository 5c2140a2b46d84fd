//! Alertmanager Webhook Route

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::routes::ChannelFailure;
use crate::AppState;
use alerting::{AlertError, AlertStatus, ProcessAlertInput, ProcessAlertOutput, Severity};

/// Alertmanager webhook payload (version 4)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub group_key: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receiver: String,
    pub alerts: Vec<AlertmanagerAlert>,
}

/// One alert inside a webhook payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generator_url: String,
    #[serde(default)]
    pub fingerprint: String,
}

impl AlertmanagerAlert {
    fn label(&self, key: &str) -> String {
        self.labels.get(key).cloned().unwrap_or_default()
    }

    fn annotation(&self, key: &str) -> String {
        self.annotations.get(key).cloned().unwrap_or_default()
    }

    /// Map onto a validated processing input
    pub fn to_input(&self) -> Result<ProcessAlertInput, AlertError> {
        let input = ProcessAlertInput {
            fingerprint: self.fingerprint.clone(),
            status: AlertStatus::parse(&self.status)?,
            name: self.label("alertname"),
            instance: self.label("instance"),
            target: self.label("job"),
            summary: self.annotation("summary"),
            description: self.annotation("description"),
            severity: Severity::from_label(&self.label("severity")),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            fired_at: self.starts_at.unwrap_or_else(Utc::now),
        };
        input.validate()?;
        Ok(input)
    }
}

/// Outcome for one alert of the payload
#[derive(Debug, Serialize)]
pub struct AlertResult {
    pub fingerprint: String,
    pub status: String,
    pub alert_id: Option<String>,
    pub is_new: bool,
    pub is_silenced: bool,
    pub notifications_sent: Vec<String>,
    pub notifications_failed: Vec<ChannelFailure>,
}

impl AlertResult {
    fn new(fingerprint: String, status: AlertStatus, output: ProcessAlertOutput) -> Self {
        Self {
            fingerprint,
            status: status.to_string(),
            alert_id: output.alert_id,
            is_new: output.is_new,
            is_silenced: output.is_silenced,
            notifications_sent: output.notifications_sent,
            notifications_failed: output
                .notifications_failed
                .iter()
                .map(|f| ChannelFailure::new(&f.notifier, &f.error))
                .collect(),
        }
    }
}

/// Response for the webhook endpoint
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub processed: usize,
    pub results: Vec<AlertResult>,
}

/// Receive an Alertmanager notification.
///
/// Every alert is validated before any is processed; alerts are then
/// processed in payload order. A store failure aborts the request so the
/// sender retries the whole batch, which is safe because repeated firing
/// events are deduplicated.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AlertmanagerPayload>,
) -> Result<Json<WebhookResponse>, ApiError> {
    info!(
        "Received Alertmanager webhook from {} ({} alerts, group status {})",
        payload.receiver,
        payload.alerts.len(),
        payload.status
    );

    let inputs = payload
        .alerts
        .iter()
        .map(AlertmanagerAlert::to_input)
        .collect::<Result<Vec<_>, _>>()?;

    let cancel = state.shutdown.child_token();
    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        let fingerprint = input.fingerprint.clone();
        let status = input.status;

        let output = state.processor.execute(input, &cancel).await?;
        if let Some(err) = output.cancellation() {
            return Err(err.into());
        }
        results.push(AlertResult::new(fingerprint, status, output));
    }

    Ok(Json(WebhookResponse {
        processed: results.len(),
        results,
    }))
}
