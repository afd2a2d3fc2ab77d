//! Node runtime library: wires [`relay_gateway::RelayConfig`] and
//! [`relay_gateway::RocksStore`] into a running [`relay_gateway::RelayService`],
//! exposed separately from `main.rs` so integration tests can drive it
//! without a process boundary.

use std::sync::Arc;

use anyhow::Context;
use relay_gateway::{RelayConfig, RelayService, RocksStore, Store};

/// Initializes structured logging from `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds a [`RelayService`] from a loaded configuration, opening the
/// RocksDB store at `config.database_url`.
pub fn build_service(config: RelayConfig) -> anyhow::Result<RelayService> {
    let store: Arc<dyn Store> =
        Arc::new(RocksStore::open(&config.database_url).context("failed to open relay store")?);
    Ok(RelayService::new(config, store))
}

/// Runs the service to completion, triggering graceful shutdown on
/// SIGINT/SIGTERM per the relay's cancellation contract.
pub async fn run(mut service: RelayService) -> anyhow::Result<()> {
    let trigger = service.shutdown_handle();
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    let run_fut = service.run();
    tokio::pin!(run_fut);

    tokio::select! {
        result = &mut run_fut => {
            return result.context("relay service exited with an error");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
            trigger.trigger();
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
            trigger.trigger();
        }
    }

    run_fut.await.context("relay service exited with an error")
}
