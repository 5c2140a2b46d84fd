//! Request-scoped cancellation

use crate::error::AlertError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race `call` against the request's cancellation token
pub(crate) async fn guarded<T, F>(cancel: &CancellationToken, call: F) -> Result<T, AlertError>
where
    F: Future<Output = Result<T, AlertError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AlertError::Cancelled),
        result = call => result,
    }
}
