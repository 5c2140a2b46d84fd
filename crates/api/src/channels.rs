//! Built-in notification channel

use alerting::ports::Notifier;
use alerting::{Alert, AlertError};
use async_trait::async_trait;
use tracing::{info, warn};

/// Writes every notification to the log.
///
/// Used when no chat or paging channel is wired in; the handle it returns
/// is the alert id.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &Alert) -> Result<String, AlertError> {
        warn!(
            "[{}] {} on {} ({}): {}",
            alert.severity, alert.name, alert.instance, alert.fingerprint, alert.summary
        );
        Ok(alert.id.clone())
    }

    async fn update_message(&self, handle: &str, alert: &Alert) -> Result<(), AlertError> {
        info!("Alert {} ({}) is now {}", handle, alert.name, alert.state);
        Ok(())
    }
}
