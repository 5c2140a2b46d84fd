//! Label-based subscriber matching

use crate::alert::Alert;
use crate::ports::SubscriberMatcher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info};

/// A subscriber as configured by operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    pub name: String,
    /// Every label must be present on the alert with the same value
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub slack_user_id: Option<String>,
    #[serde(default)]
    pub pagerduty_user_id: Option<String>,
    /// Routing key overriding the channel default
    #[serde(default)]
    pub pagerduty_routing_key: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A subscriber matched against one alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub name: String,
    pub slack_user_id: Option<String>,
    pub pagerduty_user_id: Option<String>,
    pub pagerduty_routing_key: Option<String>,
    /// Number of subscriber labels that matched the alert
    pub match_count: usize,
}

/// Matches alerts to subscribers whose whole label filter is present on the alert
pub struct LabelSubscriberMatcher {
    subscribers: RwLock<Vec<SubscriberConfig>>,
}

impl LabelSubscriberMatcher {
    pub fn new(subscribers: Vec<SubscriberConfig>) -> Self {
        info!("Creating subscriber matcher with {} subscribers", subscribers.len());
        Self {
            subscribers: RwLock::new(subscribers),
        }
    }

    /// Replace the subscriber list, e.g. after a config reload
    pub fn update_subscribers(&self, subscribers: Vec<SubscriberConfig>) {
        if let Ok(mut current) = self.subscribers.write() {
            info!("Updating subscriber list: {} subscribers", subscribers.len());
            *current = subscribers;
        }
    }

    /// Matching subscribers, most specific first.
    ///
    /// Ties keep configuration order so escalation order is deterministic.
    pub fn match_alert(&self, alert: &Alert) -> Vec<Subscriber> {
        let subscribers = match self.subscribers.read() {
            Ok(subscribers) => subscribers,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut matched: Vec<Subscriber> = subscribers
            .iter()
            .filter(|sub| sub.enabled && !sub.labels.is_empty())
            .filter(|sub| {
                sub.labels
                    .iter()
                    .all(|(key, value)| alert.label(key) == Some(value.as_str()))
            })
            .map(|sub| Subscriber {
                name: sub.name.clone(),
                slack_user_id: sub.slack_user_id.clone(),
                pagerduty_user_id: sub.pagerduty_user_id.clone(),
                pagerduty_routing_key: sub.pagerduty_routing_key.clone(),
                match_count: sub.labels.len(),
            })
            .collect();

        matched.sort_by(|a, b| b.match_count.cmp(&a.match_count));
        debug!("Alert {} matched {} subscribers", alert.id, matched.len());
        matched
    }
}

impl SubscriberMatcher for LabelSubscriberMatcher {
    fn match_for_broadcast(&self, alert: &Alert) -> Vec<Subscriber> {
        self.match_alert(alert)
    }

    fn match_for_escalation(&self, alert: &Alert) -> Vec<Subscriber> {
        self.match_alert(alert)
    }
}

/// De-duplicated Slack user ids of the matched subscribers
pub fn slack_user_ids(matched: &[Subscriber]) -> Vec<String> {
    unique_ids(matched.iter().filter_map(|m| m.slack_user_id.as_deref()))
}

/// De-duplicated PagerDuty user ids, in escalation order
pub fn pagerduty_user_ids(matched: &[Subscriber]) -> Vec<String> {
    unique_ids(matched.iter().filter_map(|m| m.pagerduty_user_id.as_deref()))
}

/// Routing key per matched subscriber name; subscribers without one are left out
pub fn pagerduty_routing_keys(matched: &[Subscriber]) -> BTreeMap<String, String> {
    matched
        .iter()
        .filter_map(|m| {
            let key = m.pagerduty_routing_key.as_deref().filter(|k| !k.is_empty())?;
            Some((m.name.clone(), key.to_string()))
        })
        .collect()
}

fn unique_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.filter(|id| !id.is_empty() && seen.insert(*id))
        .map(str::to_string)
        .collect()
}
