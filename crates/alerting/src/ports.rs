//! Collaborator contracts
//!
//! Persistence and channel adapters live outside this crate and plug in
//! through these traits.

use crate::ack_event::AckEvent;
use crate::alert::Alert;
use crate::error::AlertError;
use crate::silence::SilenceMark;
use crate::subscriber::Subscriber;
use async_trait::async_trait;

/// Alert persistence
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// All alerts (any state) carrying this fingerprint
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Alert>, AlertError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Alert>, AlertError>;

    /// Insert a new alert.
    ///
    /// Must fail with [`AlertError::DuplicateFingerprint`] if another firing
    /// alert already holds the fingerprint.
    async fn save(&self, alert: &Alert) -> Result<(), AlertError>;

    /// Compare-and-swap update on `alert.version`.
    ///
    /// On success the stored version and `alert.version` are both advanced;
    /// a mismatch fails with [`AlertError::VersionConflict`].
    async fn update(&self, alert: &mut Alert) -> Result<(), AlertError>;
}

/// Ack audit trail persistence
#[async_trait]
pub trait AckEventStore: Send + Sync {
    async fn save(&self, event: &AckEvent) -> Result<(), AlertError>;

    /// Audit trail for one alert, oldest first
    async fn find_by_alert(&self, alert_id: &str) -> Result<Vec<AckEvent>, AlertError>;
}

/// Read-only view of silences
#[async_trait]
pub trait SilenceStore: Send + Sync {
    /// Silences active now whose matchers match the alert
    async fn find_matching_alert(&self, alert: &Alert) -> Result<Vec<SilenceMark>, AlertError>;
}

/// Writes staged inside one unit of work
#[async_trait]
pub trait Transaction: Send {
    async fn save_ack_event(&mut self, event: &AckEvent) -> Result<(), AlertError>;

    /// Same compare-and-swap semantics as [`AlertStore::update`], checked at commit
    async fn update_alert(&mut self, alert: &mut Alert) -> Result<(), AlertError>;

    async fn commit(self: Box<Self>) -> Result<(), AlertError>;

    async fn rollback(self: Box<Self>) -> Result<(), AlertError>;
}

/// Transaction boundary
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AlertError>;
}

/// A notification channel (Slack, PagerDuty, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel identifier, also the key into `Alert::external_references`
    fn name(&self) -> &str;

    /// Send a new message; returns the channel-native handle
    async fn notify(&self, alert: &Alert) -> Result<String, AlertError>;

    /// Update a previously sent message
    async fn update_message(&self, handle: &str, alert: &Alert) -> Result<(), AlertError>;

    /// The mention-all capability, if this channel has it
    fn as_broadcast(&self) -> Option<&dyn BroadcastNotifier> {
        None
    }

    /// The sequential-escalation capability, if this channel has it
    fn as_escalation(&self) -> Option<&dyn EscalationNotifier> {
        None
    }
}

/// A channel that can mention every matched subscriber in one message
#[async_trait]
pub trait BroadcastNotifier: Send + Sync {
    async fn notify_with_mentions(
        &self,
        alert: &Alert,
        subscribers: &[Subscriber],
    ) -> Result<String, AlertError>;
}

/// A channel that pages subscribers one at a time
#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    async fn notify_subscriber(
        &self,
        alert: &Alert,
        subscriber: &Subscriber,
    ) -> Result<String, AlertError>;
}

/// A channel that accepts acknowledgment pushes
#[async_trait]
pub trait AckSyncer: Send + Sync {
    fn name(&self) -> &str;

    fn supports_ack(&self) -> bool;

    async fn acknowledge(&self, alert: &Alert, event: &AckEvent) -> Result<(), AlertError>;
}

/// Resolves the subscribers interested in an alert
pub trait SubscriberMatcher: Send + Sync {
    /// Unordered; everyone is mentioned at once
    fn match_for_broadcast(&self, alert: &Alert) -> Vec<Subscriber>;

    /// Ordered by descending match count
    fn match_for_escalation(&self, alert: &Alert) -> Vec<Subscriber>;
}
