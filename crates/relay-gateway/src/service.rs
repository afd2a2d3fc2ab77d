//! Relay service bootstrap: binds the HTTP/WebSocket listener, composes the
//! middleware stack, and drives graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tracing::{error, info};

use crate::auth::Authenticator;
use crate::controller::RelayController;
use crate::domain::{RelayConfig, RelayError};
use crate::hub::{Hub, HubHandle};
use crate::http::{self, AppState};
use crate::middleware::{create_cors_layer, TimeoutLayer, TracingLayer};
use crate::store::Store;

/// Per-request timeout. Not configured via the environment; the corpus's
/// own gateway hardcodes a conservative default where no tuning knob is
/// specified.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A one-shot trigger obtained from [`RelayService::shutdown_handle`] before
/// calling [`RelayService::run`]. Owning it independently of `&mut
/// RelayService` lets a signal-handling task fire it concurrently with the
/// `run` future it's racing against.
pub struct ShutdownTrigger(oneshot::Sender<()>);

impl ShutdownTrigger {
    pub fn trigger(self) {
        let _ = self.0.send(());
    }
}

pub struct RelayService {
    config: RelayConfig,
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
}

impl RelayService {
    pub fn new(config: RelayConfig, store: Arc<dyn Store>) -> Self {
        let authenticator = Arc::new(Authenticator::new(
            config.auth.challenge_secret_key.clone(),
            config.auth.bearer_secret_key.clone(),
            config.auth.nonce_len,
            config.auth.challenge_ttl,
            config.auth.bearer_ttl,
        ));
        let controller = RelayController::new(store);
        let hub: HubHandle = Hub::spawn();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Self {
            config,
            state: AppState {
                controller,
                authenticator,
                hub,
            },
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx: Some(shutdown_rx),
        }
    }

    /// Takes the one-shot trigger that causes [`Self::run`] to begin
    /// graceful shutdown. Must be called at most once, before `run`.
    pub fn shutdown_handle(&mut self) -> ShutdownTrigger {
        ShutdownTrigger(
            self.shutdown_tx
                .take()
                .expect("shutdown_handle called more than once"),
        )
    }

    /// Binds the listener and serves until the shutdown trigger fires, then
    /// waits out the configured grace period for in-flight requests before
    /// tearing down the hub.
    pub async fn run(&mut self) -> Result<(), RelayError> {
        let shutdown_rx = self
            .shutdown_rx
            .take()
            .expect("run called more than once on the same service");

        let bind_addr = self.config.server.bind_addr;
        let router = http::build_router(self.state.clone()).layer(
            ServiceBuilder::new()
                .layer(create_cors_layer())
                .layer(TracingLayer::new())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        );

        // `server.tls_enabled`/`tls_host` are validated at config load time
        // but certificate acquisition and TLS termination are out of scope
        // here and handled by whatever sits in front of this listener; we
        // always bind plain TCP.
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| RelayError::Internal(format!("failed to bind {bind_addr}: {e}")))?;

        info!(addr = %bind_addr, version = crate::VERSION, "relay gateway listening");

        let grace_period = self.config.server.shutdown_grace_period;
        let hub = self.state.hub.clone();

        let serve_result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                info!("shutdown signal received, draining in-flight requests");
            })
            .await;

        if let Err(e) = &serve_result {
            error!(error = %e, "relay gateway server error");
        }

        tokio::time::timeout(grace_period, hub.shutdown()).await.ok();

        serve_result.map_err(|e| RelayError::Internal(e.to_string()))
    }
}
