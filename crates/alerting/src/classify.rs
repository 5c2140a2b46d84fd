//! Transient vs permanent classification for channel adapter failures
//!
//! Nothing in this crate retries. Adapters classify their failures here so
//! callers and infrastructure can decide retry policy on the category alone.

use crate::error::AlertError;
use std::future::Future;
use std::io;
use std::time::Duration;

/// Channel error codes that indicate a retryable condition
const TRANSIENT_CHANNEL_CODES: &[&str] = &[
    "rate_limited",
    "ratelimited",
    "internal_error",
    "fatal_error",
    "service_unavailable",
    "request_timeout",
];

/// Classify a non-success HTTP status returned by a channel API
pub fn classify_http_status(status: u16, operation: &str) -> AlertError {
    match status {
        429 => AlertError::transient(format!("{operation}: rate limited (status {status})")),
        500..=599 => AlertError::transient(format!("{operation}: server error (status {status})")),
        401 | 403 => AlertError::permanent(format!(
            "{operation}: authentication failed (status {status})"
        )),
        400..=499 => AlertError::permanent(format!("{operation}: client error (status {status})")),
        _ => AlertError::permanent(format!("{operation}: unexpected status {status}")),
    }
}

/// Classify a transport-level failure
pub fn classify_io_error(err: &io::Error, operation: &str) -> AlertError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::TimedOut
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::Interrupted
        | io::ErrorKind::UnexpectedEof => {
            AlertError::transient(format!("{operation}: network error: {err}"))
        }
        _ => AlertError::permanent(format!("{operation}: {err}")),
    }
}

/// Classify an error code reported in a channel API response body
/// (e.g. Slack's `{"ok": false, "error": "..."}`). Unknown codes are permanent.
pub fn classify_channel_error(code: &str, operation: &str) -> AlertError {
    if TRANSIENT_CHANNEL_CODES.contains(&code) {
        AlertError::transient(format!("{operation}: {code}"))
    } else {
        AlertError::permanent(format!("{operation}: {code}"))
    }
}

/// Fallback for errors the adapter cannot identify
pub fn classify_unknown(err: &dyn std::error::Error, operation: &str) -> AlertError {
    AlertError::permanent(format!("{operation}: {err}"))
}

/// Run a channel call under a deadline; an elapsed deadline is transient
pub async fn with_deadline<T, F>(
    deadline: Duration,
    operation: &str,
    call: F,
) -> Result<T, AlertError>
where
    F: Future<Output = Result<T, AlertError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(AlertError::transient(format!(
            "{operation}: deadline of {}ms exceeded",
            deadline.as_millis()
        ))),
    }
}
