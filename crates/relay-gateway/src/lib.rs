//! Relay gateway: the end-to-end encrypted message relay's server side.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         RELAY GATEWAY                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────┐            │
//! │  │  HTTP REST  │  │  WebSocket  │  │  GET /healthz     │            │
//! │  │ /api/v1/... │  │ /api/v1/ws  │  │  (liveness probe) │            │
//! │  └──────┬──────┘  └──────┬──────┘  └──────────────────┘            │
//! │         │                │                                          │
//! │  ┌──────┴────────────────┴───────────────────────────┐             │
//! │  │  Middleware: Cors → Tracing → Timeout → BearerAuth │             │
//! │  └──────┬──────────────────────────────────────────────┘            │
//! │         │                                                           │
//! │  ┌──────┴──────┐   ┌────────────┐   ┌──────────────┐               │
//! │  │ Authenticator│   │ Controller │   │  Hub (actor) │               │
//! │  └──────┬──────┘   └──────┬─────┘   └──────┬───────┘               │
//! │         │                 │                 │                      │
//! │         └─────────────────┴─────────────────┘                      │
//! │                           │                                         │
//! │                    ┌──────┴──────┐                                  │
//! │                    │    Store    │                                  │
//! │                    │  (RocksDB)  │                                  │
//! │                    └─────────────┘                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The Store persists users and message envelopes. The Authenticator issues
//! nonce challenges and verifies RSA signatures to mint bearer tokens. The
//! Relay Controller is a thin domain layer over the Store. The Hub is a
//! single-writer actor fanning inbound envelopes out to live WebSocket
//! sessions. The HTTP façade wires all of the above onto the wire protocol.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod auth;
pub mod controller;
pub mod domain;
pub mod http;
pub mod hub;
pub mod middleware;
pub mod service;
pub mod store;
pub mod ws;

pub use auth::Authenticator;
pub use controller::RelayController;
pub use domain::config::{AuthConfig, ConfigError, RelayConfig, ServerConfig};
pub use domain::error::{RelayError, RelayResult};
pub use hub::{Hub, HubHandle};
pub use service::{RelayService, ShutdownTrigger};
pub use store::{RocksStore, Store, StoreError};

/// Crate version, surfaced on `GET /healthz` and in startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
