//! Relay node: the end-to-end encrypted message relay server binary.
//!
//! Loads configuration from the environment, opens the RocksDB store, and
//! runs the gateway service until a shutdown signal arrives.

use std::process::ExitCode;

use relay_gateway::RelayConfig;

#[tokio::main]
async fn main() -> ExitCode {
    relay_node::init_logging();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let service = match relay_node::build_service(config) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "failed to build relay service");
            return ExitCode::FAILURE;
        }
    };

    match relay_node::run(service).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "relay node exited with an error");
            ExitCode::FAILURE
        }
    }
}
