//! Alert Bridge API Server
//!
//! HTTP surface of the alert bridge: the Alertmanager webhook, the ack API,
//! silences, health, and Prometheus metrics.

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod channels;
mod config;
mod error;
mod rate_limit;
mod routes;

pub use channels::LogNotifier;
pub use crate::config::{AppConfig, LogFormat, LoggingConfig, ServerConfig};
pub use error::ApiError;
pub use rate_limit::{create_governor_config, RateLimitConfig};

use alerting::ports::{AckSyncer, Notifier};
use alerting::{CancellationToken, LabelSubscriberMatcher, ProcessAlert, SubscriberConfig, SyncAck};
use storage::{MemoryUnitOfWork, Repository};

/// Application state shared across handlers
pub struct AppState {
    /// Storage repository
    pub repository: Arc<Repository>,
    /// Alert processing engine
    pub processor: ProcessAlert,
    /// Ack sync engine
    pub acks: SyncAck,
    /// Prometheus render handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Cancelled on shutdown; handlers run on child tokens
    pub shutdown: CancellationToken,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire both engines to `repository` and the given channels
    pub fn new(
        repository: Arc<Repository>,
        notifiers: Vec<Arc<dyn Notifier>>,
        syncers: Vec<Arc<dyn AckSyncer>>,
        subscribers: Vec<SubscriberConfig>,
    ) -> Self {
        let matcher = Arc::new(LabelSubscriberMatcher::new(subscribers));
        let processor = ProcessAlert::new(repository.clone(), repository.clone(), notifiers)
            .with_subscriber_matcher(matcher);
        let acks = SyncAck::new(
            repository.clone(),
            Arc::new(MemoryUnitOfWork::new(repository.clone())),
            syncers,
        );

        Self {
            repository,
            processor,
            acks,
            metrics: None,
            shutdown: CancellationToken::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub alerts: AlertCounts,
}

#[derive(Debug, Serialize)]
pub struct AlertCounts {
    pub total: usize,
    pub firing: usize,
    pub ack_events: usize,
}

/// Create the application router
///
/// With `rate_limit` set, the webhook route is limited per peer IP and the
/// service must be served with connect info.
pub fn create_router(state: Arc<AppState>, rate_limit: Option<&RateLimitConfig>) -> Router {
    let mut webhooks =
        Router::new().route("/webhook/alertmanager", post(routes::webhook::receive));
    if let Some(rate_limit) = rate_limit {
        match create_governor_config(rate_limit) {
            Some(config) => webhooks = webhooks.layer(GovernorLayer { config }),
            None => warn!("Invalid rate limit {:?}, webhook is not rate limited", rate_limit),
        }
    }

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/alerts/:id", get(routes::alerts::get_alert))
        .route("/api/v1/alerts/:id/ack", post(routes::alerts::acknowledge))
        .route("/api/v1/alerts/:id/acks", get(routes::alerts::list_acks))
        .route(
            "/api/v1/silences",
            get(routes::silences::list_silences).post(routes::silences::create_silence),
        )
        .route("/api/v1/silences/:id", delete(routes::silences::delete_silence))
        .route("/metrics", get(metrics_handler))
        .merge(webhooks)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        alerts: AlertCounts {
            total: state.repository.alert_count(),
            firing: state.repository.firing_count(),
            ack_events: state.repository.ack_event_count(),
        },
    })
}

/// Prometheus scrape handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level {:?}", config.level))?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Run the server until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    let state = Arc::new(
        AppState::new(
            Arc::new(Repository::new()),
            notifiers,
            Vec::new(),
            config.subscribers.clone(),
        )
        .with_metrics(handle),
    );
    let app = create_router(state.clone(), Some(&config.rate_limit));

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;
    info!("Starting API server on {}", config.server.listen_addr);

    let shutdown = state.shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        shutdown.cancel();
    })
    .await?;

    info!("API server stopped");
    Ok(())
}
