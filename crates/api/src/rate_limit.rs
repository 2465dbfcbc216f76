//! API rate limiting middleware.
//!
//! Counters live in the shared store so every replica sees the same budget.
//! Requests are counted per actor when signed in, per client address otherwise.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use seventv_common::{AppError, AppResult, config::LimitsConfig};
use seventv_core::{Actor, SharedStore};
use sha2::{Digest, Sha256};

use crate::{extractors::client_ip, middleware::AppState};

/// Bucket names with a route of their own.
pub mod buckets {
    pub const GLOBAL: &str = "global";
    pub const AUTH: &str = "Auth";
    pub const CREATE_EMOTE: &str = "CreateEmote";
    pub const UPDATE_USER_PICTURE: &str = "UpdateUserPicture";
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub limit: i64,
    pub remaining: i64,
    /// Seconds until the window resets.
    pub reset: i64,
}

impl RateLimitResult {
    #[must_use]
    pub const fn allowed(&self) -> bool {
        self.remaining >= 1
    }
}

/// Shared-store backed limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    limits: LimitsConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn SharedStore>, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    /// Store key of a bucket for one identifier.
    #[must_use]
    pub fn key(bucket: &str, identifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(identifier.as_bytes());
        hasher.update(bucket.as_bytes());
        format!("api:rl:{bucket}:{}", hex::encode(hasher.finalize()))
    }

    /// Count a request against `bucket`. Unconfigured buckets are not limited.
    pub async fn check(&self, bucket: &str, identifier: &str) -> AppResult<Option<RateLimitResult>> {
        let Some((limit, seconds)) = self.limits.bucket(bucket) else {
            return Ok(None);
        };

        let window = Duration::from_secs(seconds.max(1).unsigned_abs());
        let (count, ttl) = self
            .store
            .hit(&Self::key(bucket, identifier), 1, window)
            .await?;

        Ok(Some(RateLimitResult {
            limit,
            remaining: limit - count,
            reset: ttl.max(0),
        }))
    }
}

fn header(value: i64) -> HeaderValue {
    HeaderValue::from(value)
}

/// Rate limiting middleware for the global bucket.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit_with_bucket(&state, buckets::GLOBAL, req, next).await
}

/// Rate limiting middleware for sign in routes.
pub async fn rate_limit_auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit_with_bucket(&state, buckets::AUTH, req, next).await
}

/// Rate limiting middleware for emote uploads.
pub async fn rate_limit_create_emote_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit_with_bucket(&state, buckets::CREATE_EMOTE, req, next).await
}

/// Rate limiting middleware for profile picture uploads.
pub async fn rate_limit_user_picture_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    rate_limit_with_bucket(&state, buckets::UPDATE_USER_PICTURE, req, next).await
}

async fn rate_limit_with_bucket(
    state: &AppState,
    bucket: &str,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identifier = req
        .extensions()
        .get::<Actor>()
        .map(|actor| actor.id().to_string())
        .or_else(|| client_ip(req.headers(), req.extensions()));

    let Some(identifier) = identifier else {
        return Ok(next.run(req).await);
    };

    let Some(result) = state.rate_limiter.check(bucket, &identifier).await? else {
        return Ok(next.run(req).await);
    };

    if !result.allowed() {
        let mut response = AppError::RateLimited.into_response();
        apply_headers(&mut response, &result);
        return Ok(response);
    }

    let mut response = next.run(req).await;
    apply_headers(&mut response, &result);
    Ok(response)
}

fn apply_headers(response: &mut Response, result: &RateLimitResult) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", header(result.limit));
    headers.insert("X-RateLimit-Remaining", header(result.remaining.max(0)));
    headers.insert("X-RateLimit-Reset", header(result.reset));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seventv_core::store::MemoryStore;
    use std::collections::HashMap;

    fn limiter(buckets: &[(&str, [i64; 2])]) -> RateLimiter {
        let limits = LimitsConfig {
            buckets: buckets
                .iter()
                .map(|(name, rate)| ((*name).to_string(), *rate))
                .collect::<HashMap<_, _>>(),
            ..LimitsConfig::default()
        };
        RateLimiter::new(Arc::new(MemoryStore::new()), limits)
    }

    #[test]
    fn test_key_hashes_identifier_with_bucket() {
        let key = RateLimiter::key("CreateEmote", "60ae434d1aa1d1b2f8d4a5c7");
        assert!(key.starts_with("api:rl:CreateEmote:"));
        assert_eq!(key.len(), "api:rl:CreateEmote:".len() + 64);
        assert_ne!(key, RateLimiter::key("CreateEmote", "60ae434d1aa1d1b2f8d4a5c8"));
    }

    #[tokio::test]
    async fn test_last_request_of_window_is_refused() {
        let limiter = limiter(&[("Auth", [3, 60])]);

        let first = limiter.check("Auth", "1.2.3.4").await.unwrap().unwrap();
        assert_eq!(first.limit, 3);
        assert_eq!(first.remaining, 2);
        assert!(first.allowed());
        assert!(first.reset > 0);

        limiter.check("Auth", "1.2.3.4").await.unwrap();
        let third = limiter.check("Auth", "1.2.3.4").await.unwrap().unwrap();
        assert_eq!(third.remaining, 0);
        assert!(!third.allowed());
    }

    #[tokio::test]
    async fn test_identifiers_are_counted_separately() {
        let limiter = limiter(&[("Auth", [2, 60])]);

        limiter.check("Auth", "a").await.unwrap();
        assert!(!limiter.check("Auth", "a").await.unwrap().unwrap().allowed());
        let other = limiter.check("Auth", "b").await.unwrap().unwrap();
        assert_eq!(other.remaining, 1);
    }

    #[tokio::test]
    async fn test_unconfigured_bucket_is_unlimited() {
        let limiter = limiter(&[]);
        assert!(limiter.check("global", "a").await.unwrap().is_none());
    }
}
