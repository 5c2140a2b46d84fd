//! Silence Routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;
use alerting::SilenceMark;

/// Body of a create-silence request
#[derive(Debug, Deserialize)]
pub struct CreateSilenceRequest {
    pub matchers: BTreeMap<String, String>,
    pub created_by: String,
    pub reason: Option<String>,
    /// Defaults to now
    pub starts_at: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
}

impl CreateSilenceRequest {
    fn into_silence(self, now: DateTime<Utc>) -> Result<SilenceMark, ApiError> {
        if self.matchers.is_empty() {
            return Err(ApiError::BadRequest("at least one matcher is required".into()));
        }
        if self.created_by.trim().is_empty() {
            return Err(ApiError::BadRequest("created_by is required".into()));
        }
        let duration = i64::try_from(self.duration_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| ApiError::BadRequest("duration_seconds must be positive".into()))?;

        let start = self.starts_at.unwrap_or(now);
        let end = start
            .checked_add_signed(duration)
            .ok_or_else(|| ApiError::BadRequest("duration_seconds out of range".into()))?;
        let mut silence = SilenceMark::new(self.matchers, start, end, self.created_by);
        silence.reason = self.reason;
        Ok(silence)
    }
}

/// Response for the silence list endpoint
#[derive(Debug, Serialize)]
pub struct SilencesResponse {
    pub data: Vec<SilenceMark>,
    pub count: usize,
}

/// List silences active now
pub async fn list_silences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SilencesResponse>, ApiError> {
    let data = state.repository.active_silences()?;
    Ok(Json(SilencesResponse {
        count: data.len(),
        data,
    }))
}

/// Create a silence
pub async fn create_silence(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateSilenceRequest>,
) -> Result<(StatusCode, Json<SilenceMark>), ApiError> {
    let silence = request.into_silence(Utc::now())?;
    state.repository.add_silence(silence.clone())?;
    Ok((StatusCode::CREATED, Json(silence)))
}

/// Delete a silence
pub async fn delete_silence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.repository.remove_silence(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
