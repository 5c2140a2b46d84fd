//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Limits inbound webhook traffic per peer IP using tower_governor.
//! Uses the Generic Cell Rate Algorithm (GCRA) for efficient,
//! accurate rate enforcement without background processes.

use governor::middleware::StateInformationMiddleware;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config with X-RateLimit-* headers enabled
pub type WebhookGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Seconds to replenish one request
    #[serde(default = "default_per_second")]
    pub per_second: u64,
    /// Burst size (max requests that can be made immediately)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

fn default_per_second() -> u64 {
    1
}

fn default_burst_size() -> u32 {
    50
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Create a rate limiting governor config
///
/// Returns `None` when either quota value is zero. Uses PeerIpKeyExtractor,
/// so the service must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<WebhookGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}
