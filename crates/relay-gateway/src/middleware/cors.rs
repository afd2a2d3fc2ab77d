//! CORS layer, so browser-based peers can reach the relay directly.

use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS: any origin, the methods and headers this façade exposes.
/// Peers authenticate via bearer token, not cookies, so there is nothing
/// origin-sensitive to protect here beyond the usual browser sandboxing.
pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
