//! In-memory collaborators for engine tests

use crate::ack_event::AckEvent;
use crate::alert::{Alert, AlertState};
use crate::error::AlertError;
use crate::ports::{
    AckSyncer, AlertStore, BroadcastNotifier, EscalationNotifier, Notifier, SilenceStore,
    Transaction, UnitOfWork,
};
use crate::silence::SilenceMark;
use crate::subscriber::Subscriber;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: Mutex<HashMap<String, Alert>>,
    writes: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl MemoryAlertStore {
    pub fn insert(&self, alert: Alert) {
        self.alerts.lock().unwrap().insert(alert.id.clone(), alert);
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.lock().unwrap().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().values().cloned().collect()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), AlertError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AlertError::transient("store unavailable"));
        }
        Ok(())
    }

    fn compare_and_swap(
        alerts: &mut HashMap<String, Alert>,
        alert: &Alert,
        expected: u64,
    ) -> Result<(), AlertError> {
        let stored = alerts
            .get_mut(&alert.id)
            .ok_or_else(|| AlertError::NotFound(format!("alert {}", alert.id)))?;
        if stored.version != expected {
            return Err(AlertError::VersionConflict {
                id: alert.id.clone(),
                expected,
                actual: stored.version,
            });
        }
        *stored = alert.clone();
        stored.version = expected + 1;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Alert>, AlertError> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.fingerprint == fingerprint)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Alert>, AlertError> {
        Ok(self.get(id))
    }

    async fn save(&self, alert: &Alert) -> Result<(), AlertError> {
        self.check_writable()?;
        let mut alerts = self.alerts.lock().unwrap();
        if alerts
            .values()
            .any(|a| a.fingerprint == alert.fingerprint && a.is_firing())
        {
            return Err(AlertError::DuplicateFingerprint(alert.fingerprint.clone()));
        }
        alerts.insert(alert.id.clone(), alert.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, alert: &mut Alert) -> Result<(), AlertError> {
        self.check_writable()?;
        let mut alerts = self.alerts.lock().unwrap();
        Self::compare_and_swap(&mut alerts, alert, alert.version)?;
        alert.version += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Unit of work that stages writes and applies them on commit
pub struct MemoryUnitOfWork {
    pub alerts: Arc<MemoryAlertStore>,
    pub events: Arc<Mutex<Vec<AckEvent>>>,
    pub rollbacks: Arc<AtomicUsize>,
}

impl MemoryUnitOfWork {
    pub fn new(alerts: Arc<MemoryAlertStore>) -> Self {
        Self {
            alerts,
            events: Arc::new(Mutex::new(Vec::new())),
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn events(&self) -> Vec<AckEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn begin(&self) -> Result<Box<dyn Transaction>, AlertError> {
        Ok(Box::new(MemoryTransaction {
            alerts: self.alerts.clone(),
            events: self.events.clone(),
            rollbacks: self.rollbacks.clone(),
            staged_events: Vec::new(),
            staged_alerts: Vec::new(),
        }))
    }
}

struct MemoryTransaction {
    alerts: Arc<MemoryAlertStore>,
    events: Arc<Mutex<Vec<AckEvent>>>,
    rollbacks: Arc<AtomicUsize>,
    staged_events: Vec<AckEvent>,
    staged_alerts: Vec<(Alert, u64)>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn save_ack_event(&mut self, event: &AckEvent) -> Result<(), AlertError> {
        self.staged_events.push(event.clone());
        Ok(())
    }

    async fn update_alert(&mut self, alert: &mut Alert) -> Result<(), AlertError> {
        self.staged_alerts.push((alert.clone(), alert.version));
        alert.version += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AlertError> {
        self.alerts.check_writable()?;
        let mut alerts = self.alerts.alerts.lock().unwrap();
        for (alert, expected) in &self.staged_alerts {
            MemoryAlertStore::compare_and_swap(&mut alerts, alert, *expected)?;
        }
        self.events
            .lock()
            .unwrap()
            .extend(self.staged_events.iter().cloned());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AlertError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct StaticSilenceStore {
    pub silences: Vec<SilenceMark>,
    pub fail: bool,
}

#[async_trait]
impl SilenceStore for StaticSilenceStore {
    async fn find_matching_alert(&self, alert: &Alert) -> Result<Vec<SilenceMark>, AlertError> {
        if self.fail {
            return Err(AlertError::transient("silence store unavailable"));
        }
        Ok(self
            .silences
            .iter()
            .filter(|s| s.matches(alert))
            .cloned()
            .collect())
    }
}

pub struct RecordingNotifier {
    name: String,
    fail_notify: bool,
    fail_update: bool,
    seq: AtomicUsize,
    pub notified: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<(String, AlertState)>>,
    cancel_on_notify: Option<CancellationToken>,
}

impl RecordingNotifier {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail_notify: false,
            fail_update: false,
            seq: AtomicUsize::new(0),
            notified: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            cancel_on_notify: None,
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail_notify: true,
            fail_update: true,
            ..Self::new(name)
        }
    }

    /// Cancels the request while its own notify call is in flight
    pub fn cancelling(name: &str, token: CancellationToken) -> Self {
        Self {
            cancel_on_notify: Some(token),
            ..Self::new(name)
        }
    }

    pub fn notify_count(&self) -> usize {
        self.notified.lock().unwrap().len()
    }

    pub fn updates(&self) -> Vec<(String, AlertState)> {
        self.updated.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, alert: &Alert) -> Result<String, AlertError> {
        self.notified.lock().unwrap().push(alert.id.clone());
        if let Some(token) = &self.cancel_on_notify {
            token.cancel();
        }
        if self.fail_notify {
            return Err(AlertError::transient(format!("{} unavailable", self.name)));
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}:{}", self.name, n))
    }

    async fn update_message(&self, handle: &str, alert: &Alert) -> Result<(), AlertError> {
        self.updated
            .lock()
            .unwrap()
            .push((handle.to_string(), alert.state));
        if self.fail_update {
            return Err(AlertError::transient(format!("{} unavailable", self.name)));
        }
        Ok(())
    }
}

/// Notifier with the mention-all capability
pub struct MentionNotifier {
    pub inner: RecordingNotifier,
    pub mentions: Mutex<Vec<Vec<String>>>,
}

impl MentionNotifier {
    pub fn new(name: &str) -> Self {
        Self {
            inner: RecordingNotifier::new(name),
            mentions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Notifier for MentionNotifier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn notify(&self, alert: &Alert) -> Result<String, AlertError> {
        self.inner.notify(alert).await
    }

    async fn update_message(&self, handle: &str, alert: &Alert) -> Result<(), AlertError> {
        self.inner.update_message(handle, alert).await
    }

    fn as_broadcast(&self) -> Option<&dyn BroadcastNotifier> {
        Some(self)
    }
}

#[async_trait]
impl BroadcastNotifier for MentionNotifier {
    async fn notify_with_mentions(
        &self,
        alert: &Alert,
        subscribers: &[Subscriber],
    ) -> Result<String, AlertError> {
        self.mentions
            .lock()
            .unwrap()
            .push(subscribers.iter().map(|s| s.name.clone()).collect());
        Ok(format!("{}:mention:{}", self.inner.name(), alert.id))
    }
}

/// Notifier with the sequential-escalation capability
pub struct EscalatingNotifier {
    pub inner: RecordingNotifier,
    pub failing_subscribers: HashSet<String>,
    pub paged: Mutex<Vec<String>>,
    cancel_on_page: Option<CancellationToken>,
}

impl EscalatingNotifier {
    pub fn new(name: &str, failing_subscribers: &[&str]) -> Self {
        Self {
            inner: RecordingNotifier::new(name),
            failing_subscribers: failing_subscribers.iter().map(|s| s.to_string()).collect(),
            paged: Mutex::new(Vec::new()),
            cancel_on_page: None,
        }
    }

    /// Cancels the request during the first page it makes
    pub fn cancelling(name: &str, token: CancellationToken) -> Self {
        Self {
            cancel_on_page: Some(token),
            ..Self::new(name, &[])
        }
    }
}

#[async_trait]
impl Notifier for EscalatingNotifier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn notify(&self, alert: &Alert) -> Result<String, AlertError> {
        self.inner.notify(alert).await
    }

    async fn update_message(&self, handle: &str, alert: &Alert) -> Result<(), AlertError> {
        self.inner.update_message(handle, alert).await
    }

    fn as_escalation(&self) -> Option<&dyn EscalationNotifier> {
        Some(self)
    }
}

#[async_trait]
impl EscalationNotifier for EscalatingNotifier {
    async fn notify_subscriber(
        &self,
        _alert: &Alert,
        subscriber: &Subscriber,
    ) -> Result<String, AlertError> {
        self.paged.lock().unwrap().push(subscriber.name.clone());
        if let Some(token) = &self.cancel_on_page {
            token.cancel();
        }
        if self.failing_subscribers.contains(&subscriber.name) {
            return Err(AlertError::permanent(format!(
                "invalid routing key for {}",
                subscriber.name
            )));
        }
        Ok(format!("dedup-{}", subscriber.name))
    }
}

pub struct RecordingSyncer {
    name: String,
    supports: bool,
    fail: bool,
    pub calls: Mutex<Vec<String>>,
    cancel_on_ack: Option<CancellationToken>,
}

impl RecordingSyncer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            supports: true,
            fail: false,
            calls: Mutex::new(Vec::new()),
            cancel_on_ack: None,
        }
    }

    /// Cancels the request while its own acknowledge call is in flight
    pub fn cancelling(name: &str, token: CancellationToken) -> Self {
        Self {
            cancel_on_ack: Some(token),
            ..Self::new(name)
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn without_ack(name: &str) -> Self {
        Self {
            supports: false,
            ..Self::new(name)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AckSyncer for RecordingSyncer {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_ack(&self) -> bool {
        self.supports
    }

    async fn acknowledge(&self, alert: &Alert, _event: &AckEvent) -> Result<(), AlertError> {
        self.calls.lock().unwrap().push(alert.id.clone());
        if let Some(token) = &self.cancel_on_ack {
            token.cancel();
        }
        if self.fail {
            return Err(AlertError::transient(format!("{} unavailable", self.name)));
        }
        Ok(())
    }
}
