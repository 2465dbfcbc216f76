//! Session tokens and CSRF binding.
//!
//! Both are HS256 JWTs signed with the configured secret. Access tokens carry
//! the user id and token version; CSRF tokens carry the random state sent to
//! the OAuth provider and, optionally, the id of the user to bind the
//! connection to.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use seventv_common::{AppError, AppResult, Config, IdGenerator};
use serde::{Deserialize, Serialize};

/// Cookie holding the CSRF token during an OAuth round trip.
pub const COOKIE_CSRF: &str = "seventv-csrf";

/// Cookie holding the access token.
pub const COOKIE_AUTH: &str = "seventv-auth";

/// Issuer of access tokens.
pub const TOKEN_ISSUER: &str = "seventv-api";

/// Lifetime of a CSRF token.
pub const CSRF_TTL_SECS: i64 = 5 * 60;

/// Lifetime of an access token.
pub const ACCESS_TOKEN_TTL_DAYS: i64 = 90;

/// Claims of a CSRF token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfClaims {
    /// Random state echoed by the provider.
    #[serde(rename = "s")]
    pub state: String,
    #[serde(rename = "at")]
    pub created_at: DateTime<Utc>,
    /// User to link the new connection to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub u: String,
    /// Token version at issuance.
    pub v: i32,
    pub iss: String,
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
}

/// Signs and verifies session and CSRF tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    id_gen: IdGenerator,
}

impl AuthService {
    /// Create an auth service from the configured JWT secret.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_secret(&config.credentials.jwt_secret)
    }

    /// Create an auth service from a raw secret.
    #[must_use]
    pub fn with_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a CSRF state value and its signed token.
    pub fn create_csrf_token(&self, bind: Option<&str>) -> AppResult<(String, String)> {
        let value = self.id_gen.generate_token(32);
        let claims = CsrfClaims {
            state: value.clone(),
            created_at: Utc::now(),
            bind: bind.filter(|b| !b.is_empty()).map(str::to_string),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("csrf sign: {e}")))?;
        Ok((value, token))
    }

    /// Check the CSRF cookie against the state returned by the provider.
    pub fn validate_csrf(&self, state: &str, cookie: &str) -> AppResult<CsrfClaims> {
        self.validate_csrf_at(state, cookie, Utc::now())
    }

    fn validate_csrf_at(
        &self,
        state: &str,
        cookie: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CsrfClaims> {
        let segments = cookie.split('.').count();
        if segments != 3 {
            return Err(AppError::Unauthorized(format!(
                "bad state (found {segments} segments when 3 were expected)"
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        let claims = decode::<CsrfClaims>(cookie, &self.decoding, &validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid state: {e}")))?
            .claims;

        if claims.created_at < now - Duration::seconds(CSRF_TTL_SECS) {
            return Err(AppError::Unauthorized("expired state".to_string()));
        }
        if claims.state != state {
            return Err(AppError::Unauthorized("mismatched state value".to_string()));
        }

        Ok(claims)
    }

    /// Issue an access token for a user.
    pub fn create_access_token(
        &self,
        user_id: &str,
        token_version: i32,
    ) -> AppResult<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expire_at = now + Duration::days(ACCESS_TOKEN_TTL_DAYS);
        let claims = AccessClaims {
            u: user_id.to_string(),
            v: token_version,
            iss: TOKEN_ISSUER.to_string(),
            exp: expire_at.timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("access token sign: {e}")))?;
        Ok((token, expire_at))
    }

    /// Verify an access token and return its claims.
    pub fn verify_access_token(&self, token: &str) -> AppResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.validate_nbf = true;

        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("Bad Token".to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::with_secret("test-secret")
    }

    #[test]
    fn test_csrf_value_is_64_chars() {
        let (value, token) = service().create_csrf_token(Some("60ae434d1aa1d1b2f8d4a5c7")).unwrap();
        assert_eq!(value.len(), 64);

        let claims = service().validate_csrf(&value, &token).unwrap();
        assert_eq!(claims.bind.as_deref(), Some("60ae434d1aa1d1b2f8d4a5c7"));
    }

    #[test]
    fn test_csrf_rejects_wrong_segment_count() {
        let err = service().validate_csrf("x", "a.b").unwrap_err();
        assert!(err.to_string().contains("found 2 segments"));
    }

    #[test]
    fn test_csrf_rejects_mismatched_state() {
        let (_, token) = service().create_csrf_token(None).unwrap();
        let err = service().validate_csrf("other", &token).unwrap_err();
        assert!(err.to_string().contains("mismatched state value"));
    }

    #[test]
    fn test_csrf_expires_after_five_minutes() {
        let auth = service();
        let (value, token) = auth.create_csrf_token(None).unwrap();

        let later = Utc::now() + Duration::seconds(CSRF_TTL_SECS + 1);
        let err = auth.validate_csrf_at(&value, &token, later).unwrap_err();
        assert!(err.to_string().contains("expired state"));
    }

    #[test]
    fn test_csrf_signed_with_other_secret_is_rejected() {
        let (value, token) = AuthService::with_secret("other").create_csrf_token(None).unwrap();
        let err = service().validate_csrf(&value, &token).unwrap_err();
        assert!(err.to_string().contains("invalid state"));
    }

    #[test]
    fn test_access_token_carries_version() {
        let auth = service();
        let (token, expire_at) = auth.create_access_token("60ae434d1aa1d1b2f8d4a5c7", 3).unwrap();

        let claims = auth.verify_access_token(&token).unwrap();
        assert_eq!(claims.u, "60ae434d1aa1d1b2f8d4a5c7");
        assert_eq!(claims.v, 3);
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.exp, expire_at.timestamp());
        assert!(expire_at > Utc::now() + Duration::days(89));
    }

    #[test]
    fn test_access_token_rejects_garbage() {
        assert!(matches!(
            service().verify_access_token("not.a.token"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
