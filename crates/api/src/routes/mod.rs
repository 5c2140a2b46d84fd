//! HTTP route handlers

pub mod alerts;
pub mod silences;
pub mod webhook;

use alerting::{AlertError, ErrorCategory};
use serde::Serialize;

/// A channel call that failed, as reported to HTTP clients
#[derive(Debug, Clone, Serialize)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: String,
    pub category: ErrorCategory,
}

impl ChannelFailure {
    pub fn new(channel: &str, error: &AlertError) -> Self {
        Self {
            channel: channel.to_string(),
            error: error.to_string(),
            category: error.category(),
        }
    }
}
