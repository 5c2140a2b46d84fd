//! Alert Routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::routes::ChannelFailure;
use crate::AppState;
use alerting::ports::{AckEventStore, AlertStore};
use alerting::{AckEvent, AckSource, Alert, AlertError, SyncAckInput};

/// Body of an acknowledgment request
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    #[serde(default)]
    pub user_id: String,
    pub user_email: String,
    #[serde(default)]
    pub user_name: String,
    pub note: Option<String>,
    /// Snooze duration requested alongside the ack
    pub duration_seconds: Option<u64>,
}

impl AckRequest {
    fn into_input(self, alert_id: String) -> SyncAckInput {
        SyncAckInput {
            alert_id,
            source: AckSource::Api,
            user_id: self.user_id,
            user_email: self.user_email,
            user_name: self.user_name,
            note: self.note,
            duration: self.duration_seconds.map(Duration::from_secs),
        }
    }
}

/// Response for the ack endpoint
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub alert: Alert,
    pub ack_event: AckEvent,
    pub synced_to: Vec<String>,
    pub sync_errors: Vec<ChannelFailure>,
}

/// Ack audit trail of one alert
#[derive(Debug, Serialize)]
pub struct AckEventsResponse {
    pub data: Vec<AckEvent>,
    pub count: usize,
}

/// Get one alert
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    state
        .repository
        .find_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AlertError::NotFound(format!("alert {}", id)).into())
}

/// Acknowledge an alert and sync the ack to every channel that received it
pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<AckRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let output = state.acks.execute(request.into_input(id), &cancel).await?;

    Ok(Json(AckResponse {
        sync_errors: output
            .sync_errors
            .iter()
            .map(|f| ChannelFailure::new(&f.system, &f.error))
            .collect(),
        synced_to: output.synced_to,
        alert: output.alert,
        ack_event: output.ack_event,
    }))
}

/// List the ack events recorded for an alert
pub async fn list_acks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AckEventsResponse>, ApiError> {
    if state.repository.find_by_id(&id).await?.is_none() {
        return Err(AlertError::NotFound(format!("alert {}", id)).into());
    }

    let data = state.repository.find_by_alert(&id).await?;
    Ok(Json(AckEventsResponse {
        count: data.len(),
        data,
    }))
}
