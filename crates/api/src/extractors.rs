//! Request extractors.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{Extensions, HeaderMap, request::Parts},
};
use seventv_common::AppError;
use seventv_core::Actor;

/// Header set by the edge proxy with the original client address.
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Authenticated actor extractor. Rejects anonymous requests.
#[derive(Debug, Clone)]
pub struct AuthActor(pub Actor);

impl<S> FromRequestParts<S> for AuthActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by the actor middleware
        parts
            .extensions
            .get::<Actor>()
            .cloned()
            .map(AuthActor)
            .ok_or_else(|| AppError::Unauthorized("Sign-In Required".to_string()))
    }
}

/// Optional actor extractor.
#[derive(Debug, Clone)]
pub struct MaybeActor(pub Option<Actor>);

impl<S> FromRequestParts<S> for MaybeActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Actor>().cloned()))
    }
}

/// Client address: the proxy header when present, else the socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(&parts.headers, &parts.extensions)))
    }
}

/// Resolve the client address of a request.
#[must_use]
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    if let Some(ip) = headers
        .get(CF_CONNECTING_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(ip.to_string());
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_proxy_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(CF_CONNECTING_IP, HeaderValue::from_static("203.0.113.7"));
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo("10.0.0.1:5000".parse::<SocketAddr>().unwrap()));

        assert_eq!(client_ip(&headers, &extensions).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo("10.0.0.1:5000".parse::<SocketAddr>().unwrap()));

        assert_eq!(client_ip(&HeaderMap::new(), &extensions).as_deref(), Some("10.0.0.1"));
        assert_eq!(client_ip(&HeaderMap::new(), &Extensions::new()), None);
    }
}
