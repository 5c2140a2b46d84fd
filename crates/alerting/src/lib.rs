//! Alerting Core
//!
//! Alert lifecycle state machine, notification fan-out with per-channel
//! failure isolation, and cross-channel acknowledgment sync.

mod ack_event;
mod ack_sync;
mod alert;
mod cancel;
pub mod classify;
mod error;
pub mod ports;
mod process;
mod silence;
mod subscriber;

#[cfg(test)]
mod testing;

pub use ack_event::{AckEvent, AckSource};
pub use ack_sync::{SyncAck, SyncAckInput, SyncAckOutput, SyncFailure};
pub use alert::{Alert, AlertState, Severity};
pub use error::{AlertError, ErrorCategory};
pub use process::{
    AlertStatus, EscalationOutcome, EscalationReport, NotificationFailure, ProcessAlert,
    ProcessAlertInput, ProcessAlertOutput,
};
pub use silence::SilenceMark;
pub use subscriber::{
    pagerduty_routing_keys, pagerduty_user_ids, slack_user_ids, LabelSubscriberMatcher,
    Subscriber, SubscriberConfig,
};

pub use tokio_util::sync::CancellationToken;
