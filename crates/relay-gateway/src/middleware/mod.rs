//! Middleware stack for the relay gateway.
//!
//! Layer order on protected routes: CORS → Tracing → Timeout → BearerAuth → Handler.

pub mod auth;
pub mod cors;
pub mod timeout;
pub mod tracing;

pub use auth::{AuthenticatedUser, BearerAuthLayer};
pub use cors::create_cors_layer;
pub use timeout::TimeoutLayer;
pub use tracing::TracingLayer;
