//! Flat per-request timeout middleware.

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tower::{Layer, Service};
use tracing::warn;

use crate::domain::RelayError;

#[derive(Clone)]
pub struct TimeoutLayer {
    duration: Arc<Duration>,
}

impl TimeoutLayer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration: Arc::new(duration),
        }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            duration: Arc::clone(&self.duration),
        }
    }
}

#[derive(Clone)]
pub struct TimeoutService<S> {
    inner: S,
    duration: Arc<Duration>,
}

impl<S> Service<Request<Body>> for TimeoutService<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let duration = *self.duration;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match timeout(duration, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_ms = duration.as_millis(), "request timed out");
                    use axum::response::IntoResponse;
                    Ok(RelayError::Internal("request timed out".into()).into_response())
                }
            }
        })
    }
}
