//! Alert Bridge - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("=== Alert Bridge v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded {} subscriber(s); webhook burst {}, refill every {}s",
        config.subscribers.len(),
        config.rate_limit.burst_size,
        config.rate_limit.per_second
    );

    run_server(config).await
}
