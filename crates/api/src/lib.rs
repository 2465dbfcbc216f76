//! HTTP layer of the emote platform API.
//!
//! - **Endpoints**: the REST v3 surface under `/v3`
//! - **Extractors**: the resolved actor and the client address
//! - **Middleware**: actor resolution, mutation locks, CORS and node headers
//! - **Rate limiting**: shared-store counters per bucket
//! - **Health**: dependency probes served on a separate port
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod health;
pub mod middleware;
pub mod models;
pub mod rate_limit;

use std::any::Any;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
    middleware::from_fn_with_state,
    response::IntoResponse,
};
use seventv_common::AppError;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{Span, error, info_span};

pub use middleware::{AppState, Infrastructure};
pub use rate_limit::RateLimiter;

use crate::extractors::client_ip;

/// Upper bound on a request, long enough for uploads.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = message, "handler panicked");

    AppError::Internal("handler panicked".to_string()).into_response()
}

fn request_span(req: &Request<Body>) -> Span {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ip = client_ip(req.headers(), req.extensions()).unwrap_or_default();

    info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        origin = %origin,
        ip = %ip,
    )
}

/// Build the REST router with its full middleware stack.
pub fn router(state: AppState) -> Router {
    endpoints::router(&state)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::mutation_lock_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), middleware::actor_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::cors_layer())
        .layer(from_fn_with_state(
            state.clone(),
            middleware::cors_credentials_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::node_headers_middleware,
        ))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    /// Configuration with every required key.
    pub const CONFIG: &str = r"
website_url: https://7tv.app
cdn_url: https://cdn.7tv.app
cookie_domain: 7tv.app
database:
  url: postgres://localhost/seventv
redis:
  url: redis://localhost:6379
s3:
  internal_bucket: internal
  public_bucket: public
credentials:
  jwt_secret: secret
";
}
