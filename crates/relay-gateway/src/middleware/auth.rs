//! Bearer-token authentication middleware.
//!
//! Verifies the `Authorization: Bearer <token>` header against the
//! [`Authenticator`](crate::auth::Authenticator), then asserts the token's
//! subject matches the `{u}` path parameter the request is addressed to —
//! a caller's bearer token only authorizes requests about themselves.
//! On success, the verified [`Username`] is inserted into the request
//! extensions for downstream handlers to trust.

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use relay_types::Username;
use std::sync::Arc;
use tower::{Layer, Service};
use tracing::warn;

use crate::auth::Authenticator;
use crate::domain::RelayError;

#[derive(Clone)]
pub struct BearerAuthLayer {
    authenticator: Arc<Authenticator>,
}

impl BearerAuthLayer {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            authenticator: Arc::clone(&self.authenticator),
        }
    }
}

#[derive(Clone)]
pub struct BearerAuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
}

impl<S> Service<Request<Body>> for BearerAuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let authenticator = Arc::clone(&self.authenticator);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(path_username) = last_path_segment(req.uri().path()) else {
                return Ok(RelayError::BadRequest("missing path parameter".into()).into_response());
            };

            let token = match bearer_token(&req) {
                Some(t) => t,
                None => {
                    warn!(path = %req.uri().path(), "request missing bearer token");
                    return Ok(unauthorized());
                }
            };

            let username = match authenticator.verify_bearer(&token) {
                Ok(u) => u,
                Err(e) => {
                    warn!(error = %e, "bearer token verification failed");
                    return Ok(unauthorized());
                }
            };

            if username.as_str() != path_username {
                warn!(token_subject = %username, path = %path_username, "bearer token subject does not match path");
                return Ok(RelayError::Forbidden("bearer token subject does not match path".into()).into_response());
            }

            tracing::Span::current().record("subject", tracing::field::display(&username));

            req.extensions_mut().insert(username);
            inner.call(req).await
        })
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    let header = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    value.strip_prefix("Bearer ").map(str::to_string)
}

fn last_path_segment(path: &str) -> Option<&str> {
    path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
}

fn unauthorized() -> Response {
    RelayError::Unauthorized("missing or invalid bearer token".into()).into_response()
}

/// Extractor alias so handlers can pull the verified username out of request
/// extensions without depending on this module's internals.
pub type AuthenticatedUser = Username;
