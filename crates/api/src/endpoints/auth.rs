//! Sign in endpoints.
//!
//! The OAuth flow is a round trip through `GET /v3/auth`: the first request
//! stores a signed CSRF token in a cookie and redirects to the provider, the
//! provider redirects back with `callback=true` and the same route finishes the
//! sign in.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use seventv_common::{AppError, AppResult, Config};
use seventv_core::services::auth::{COOKIE_AUTH, COOKIE_CSRF, CSRF_TTL_SECS};
use seventv_db::entities::enums::Platform;
use tracing::{info, warn};

use crate::{
    extractors::MaybeActor, middleware::AppState, rate_limit::rate_limit_auth_middleware,
};

/// Response header carrying the token of a manual sign in.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub callback: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ManualQuery {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub verify: bool,
}

fn parse_platform(name: &str) -> AppResult<Platform> {
    Platform::parse(name).ok_or_else(|| AppError::invalid("Unsupported Account Provider"))
}

/// Build a cookie scoped to the configured domain.
pub fn session_cookie(
    config: &Config,
    name: &'static str,
    value: String,
    max_age_secs: i64,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .domain(config.cookie_domain.clone())
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::None)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn redirect(location: &str) -> AppResult<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| AppError::Internal(format!("redirect location: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// Start or finish an OAuth sign in.
async fn authorize(
    State(state): State<AppState>,
    MaybeActor(actor): MaybeActor,
    jar: CookieJar,
    Query(query): Query<AuthQuery>,
) -> AppResult<Response> {
    let platform = parse_platform(&query.platform)?;
    if !state.oauth_service.supports_oauth(platform) {
        return Err(AppError::invalid("Unsupported Account Provider"));
    }

    if query.callback {
        return callback(state, jar, platform, query).await;
    }

    let bind = actor.as_ref().map(|a| a.id().to_string());
    let (value, token) = state.auth_service.create_csrf_token(bind.as_deref())?;
    let url = state.oauth_service.authorize_url(platform, &value)?;

    let jar = jar.add(session_cookie(&state.config, COOKIE_CSRF, token, CSRF_TTL_SECS));
    Ok((jar, redirect(&url)?).into_response())
}

async fn callback(
    state: AppState,
    jar: CookieJar,
    platform: Platform,
    query: AuthQuery,
) -> AppResult<Response> {
    let csrf_state = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::invalid("Missing Field").with_field("query", "state"))?;
    let cookie = jar
        .get(COOKIE_CSRF)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    let claims = state.auth_service.validate_csrf(&csrf_state, &cookie)?;
    let jar = jar.add(session_cookie(&state.config, COOKIE_CSRF, String::new(), 0));

    let code = query.code.unwrap_or_default();
    let grant = state
        .oauth_service
        .exchange_code(platform, &code)
        .await
        .map_err(|e| AppError::invalid(e.to_string()))?;
    let account = state
        .oauth_service
        .user_data(platform, &grant)
        .await
        .map_err(|e| AppError::invalid(e.to_string()))?;

    let outcome = state
        .login_service
        .login(platform, account, Some(&grant), claims.bind.as_deref())
        .await?;
    info!(
        user_id = %outcome.user.id,
        platform = platform.as_str(),
        created = outcome.created,
        "user signed in"
    );

    let max_age = (outcome.expires_at - Utc::now()).num_seconds().max(0);
    let jar = jar.add(session_cookie(&state.config, COOKIE_AUTH, outcome.token.clone(), max_age));

    let location = format!(
        "{}/auth/callback?platform={}&token={}",
        state.config.website_url.trim_end_matches('/'),
        platform.as_str(),
        urlencoding::encode(&outcome.token),
    );
    Ok((jar, redirect(&location)?).into_response())
}

/// Drop the session cookie.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(session_cookie(&state.config, COOKIE_AUTH, String::new(), 0));
    (jar, StatusCode::OK)
}

/// Sign in with a platform that has no OAuth flow.
///
/// Without `verify` this hands out the code the user has to place on the
/// account. With `verify` the account is checked and signed in.
async fn manual(
    State(state): State<AppState>,
    MaybeActor(actor): MaybeActor,
    Query(query): Query<ManualQuery>,
) -> AppResult<Response> {
    let platform = parse_platform(&query.platform)?;

    if !query.verify {
        let code = state
            .oauth_service
            .request_manual_code(platform, &query.id)
            .await?;
        return Ok((StatusCode::OK, code).into_response());
    }

    let account = state.oauth_service.verify_manual(platform, &query.id).await?;
    let bind = actor.as_ref().map(|a| a.id().to_string());
    let outcome = state
        .login_service
        .login(platform, account, None, bind.as_deref())
        .await?;

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&outcome.token) {
        Ok(value) => {
            headers.insert(ACCESS_TOKEN_HEADER, value);
        }
        Err(e) => warn!(error = %e, "access token is not a valid header value"),
    }

    Ok((StatusCode::OK, headers, Json(json!({ "user_id": outcome.user.id }))).into_response())
}

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(authorize))
        .route("/logout", get(logout))
        .route("/manual", get(manual))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_auth_middleware,
        ))
}
