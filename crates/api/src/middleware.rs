//! API middleware and shared state.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use seventv_common::{AppError, AppResult, Config, ObjectStore};
use seventv_core::{
    Actor, ActorService, AssetCleanupService, AuditLogger, AuthService, BanService,
    EmoteLoader, EmoteService, EmoteSetService, Events, IngestService, IngestSettings,
    LoginService, MessageQueue, MessageService, OAuthService, RoleService, SharedStore,
    SystemService, UserLoader, UserService,
    loader::{BatchLoader, EmoteFetch, UserFetch},
    locks::KeyedMutex,
    probe::MediaProbe,
    services::auth::COOKIE_AUTH,
};
use seventv_db::repositories::{
    AuditLogRepository, BanRepository, EmoteRepository, EmoteSetRepository,
    EntitlementRepository, MessageRepository, RoleRepository, SystemRepository,
    UserConnectionRepository, UserPresenceRepository, UserRepository,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, warn};

use crate::{extractors::client_ip, rate_limit::RateLimiter};

/// Lifetime of an actor's mutation lock.
pub const MUTATION_LOCK_TTL: Duration = Duration::from_secs(20);

/// Attempts made to take a busy mutation lock before going ahead without it.
const MUTATION_LOCK_ATTEMPTS: u32 = 32;

const MUTATION_LOCK_RETRY: Duration = Duration::from_millis(250);

/// External systems the API runs on.
#[derive(Clone)]
pub struct Infrastructure {
    pub db: Arc<DatabaseConnection>,
    pub store: Arc<dyn SharedStore>,
    pub mq: Arc<dyn MessageQueue>,
    pub events: Events,
    pub storage: Arc<dyn ObjectStore>,
    pub probe: Arc<dyn MediaProbe>,
    pub cleanup: AssetCleanupService,
}

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub infra: Infrastructure,
    pub auth_service: AuthService,
    pub actor_service: ActorService,
    pub oauth_service: OAuthService,
    pub login_service: LoginService,
    pub user_service: UserService,
    pub emote_service: EmoteService,
    pub emote_set_service: EmoteSetService,
    pub ingest_service: IngestService,
    pub system_service: SystemService,
    pub role_service: RoleService,
    pub ban_service: BanService,
    pub message_service: MessageService,
    pub user_loader: UserLoader,
    pub emote_loader: EmoteLoader,
    pub rate_limiter: RateLimiter,
    /// Process start, reported by the root route.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire repositories and services. Must be called inside a runtime.
    pub fn new(config: Config, infra: Infrastructure) -> AppResult<Self> {
        let db = &infra.db;
        let users = UserRepository::new(Arc::clone(db));
        let connections = UserConnectionRepository::new(Arc::clone(db));
        let roles = RoleRepository::new(Arc::clone(db));
        let bans = BanRepository::new(Arc::clone(db));
        let emotes = EmoteRepository::new(Arc::clone(db));
        let emote_sets = EmoteSetRepository::new(Arc::clone(db));
        let messages = MessageRepository::new(Arc::clone(db));
        let presences = UserPresenceRepository::new(Arc::clone(db));
        let entitlements = EntitlementRepository::new(Arc::clone(db));
        let system = SystemRepository::new(Arc::clone(db));

        let audit = AuditLogger::new(AuditLogRepository::new(Arc::clone(db)));
        let locks = KeyedMutex::new();
        let auth_service = AuthService::new(&config);
        let message_service = MessageService::new(
            messages.clone(),
            users.clone(),
            emotes.clone(),
            emote_sets.clone(),
        );

        let actor_service = ActorService::new(
            users.clone(),
            roles.clone(),
            bans.clone(),
            auth_service.clone(),
        );
        let oauth_service = OAuthService::new(config.platforms.clone(), Arc::clone(&infra.store))?;
        let login_service = LoginService::new(
            users.clone(),
            connections.clone(),
            entitlements,
            auth_service.clone(),
            infra.events.clone(),
        );
        let user_service = UserService::new(
            users.clone(),
            connections.clone(),
            roles.clone(),
            emote_sets.clone(),
            messages,
            presences,
            audit.clone(),
            infra.events.clone(),
            locks.clone(),
        );
        let emote_service = EmoteService::new(
            emotes.clone(),
            emote_sets.clone(),
            users.clone(),
            message_service.clone(),
            audit.clone(),
            infra.events.clone(),
            Arc::clone(&infra.storage),
            locks.clone(),
        );
        let emote_set_service = EmoteSetService::new(
            emote_sets,
            emotes.clone(),
            users.clone(),
            roles.clone(),
            connections,
            audit.clone(),
            infra.events.clone(),
            locks,
        );
        let ingest_service = IngestService::new(
            emotes.clone(),
            users.clone(),
            message_service.clone(),
            audit.clone(),
            infra.events.clone(),
            Arc::clone(&infra.storage),
            Arc::clone(&infra.mq),
            Arc::clone(&infra.store),
            Arc::clone(&infra.probe),
            Arc::clone(&infra.cleanup),
            IngestSettings::from_config(&config),
        );

        let role_service = RoleService::new(roles.clone(), users.clone(), audit.clone());
        let ban_service = BanService::new(bans, users.clone(), roles, message_service.clone(), audit);

        Ok(Self {
            started_at: Utc::now(),
            rate_limiter: RateLimiter::new(Arc::clone(&infra.store), config.limits.clone()),
            user_loader: BatchLoader::new(UserFetch(users)),
            emote_loader: BatchLoader::new(EmoteFetch(emotes)),
            system_service: SystemService::new(system),
            config: Arc::new(config),
            infra,
            auth_service,
            actor_service,
            oauth_service,
            login_service,
            user_service,
            emote_service,
            emote_set_service,
            ingest_service,
            role_service,
            ban_service,
            message_service,
        })
    }
}

/// Find the access token of a request: the auth cookie, then a bearer header.
///
/// Sign-in routes also accept it as a `token` query parameter.
pub fn request_token(req: &Request<Body>) -> AppResult<Option<String>> {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(cookie) = jar.get(COOKIE_AUTH).filter(|c| !c.value().is_empty()) {
        return Ok(Some(cookie.value().to_string()));
    }

    if let Some(value) = req.headers().get(header::AUTHORIZATION) {
        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty() && !t.contains(' '))
            .ok_or_else(|| AppError::Unauthorized("Bad Authorization Header".to_string()))?;
        return Ok(Some(token.to_string()));
    }

    if req.uri().path().starts_with("/v3/auth") {
        let token = req
            .uri()
            .query()
            .into_iter()
            .flat_map(|q| q.split('&'))
            .find_map(|pair| pair.strip_prefix("token="))
            .filter(|t| !t.is_empty());
        return Ok(token.map(str::to_string));
    }

    Ok(None)
}

/// Resolve the actor of a request.
///
/// Anonymous requests pass through. A present but invalid credential fails
/// the request.
pub async fn actor_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(token) = request_token(&req)? else {
        return Ok(next.run(req).await);
    };

    let actor = state.actor_service.from_token(&token).await?;

    if let Some(ip) = client_ip(req.headers(), req.extensions()) {
        let actors = state.actor_service.clone();
        let recorded = actor.clone();
        tokio::spawn(async move { actors.record_client_ip(&recorded, &ip).await });
    }

    let actor_id = HeaderValue::from_str(actor.id()).ok();
    req.extensions_mut().insert(actor);

    let mut response = next.run(req).await;
    if let Some(id) = actor_id {
        response.headers_mut().insert("X-Actor-ID", id);
    }
    Ok(response)
}

/// Serialise the mutating requests of one actor across every replica.
pub async fn mutation_lock_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mutating = matches!(
        *req.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    let actor_id = req.extensions().get::<Actor>().map(|a| a.id().to_string());

    let (true, Some(actor_id)) = (mutating, actor_id) else {
        return next.run(req).await;
    };

    let key = format!("api-global:rl:{actor_id}:mutation_lock");
    let store = &state.infra.store;

    let mut locked = false;
    for _ in 0..MUTATION_LOCK_ATTEMPTS {
        match store.try_lock(&key, MUTATION_LOCK_TTL).await {
            Ok(true) => {
                locked = true;
                break;
            }
            Ok(false) => tokio::time::sleep(MUTATION_LOCK_RETRY).await,
            Err(e) => {
                warn!(error = %e, key, "failed to acquire mutation lock");
                break;
            }
        }
    }
    if !locked {
        debug!(key, "going ahead without the mutation lock");
    }

    let response = next.run(req).await;

    if locked {
        if let Err(e) = store.del(&key).await {
            warn!(error = %e, key, "failed to release mutation lock");
        }
    }
    response
}

/// Tag every response with the serving node and pod.
pub async fn node_headers_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&state.config.k8s.node_name) {
        headers.insert("X-Node-Name", v);
    }
    if let Ok(v) = HeaderValue::from_str(&state.config.k8s.pod_name) {
        headers.insert("X-Pod-Name", v);
    }
    response
}

/// Allow credentials only for whitelisted origins.
pub async fn cors_credentials_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let whitelisted = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|o| o.to_str().ok())
        .is_some_and(|origin| {
            state
                .config
                .http
                .cors_whitelist
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin)
        });

    let mut response = next.run(req).await;
    if whitelisted {
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
    response
}

/// CORS policy: echo the origin, cache preflights for two hours.
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
            header::COOKIE,
            HeaderName::from_static("x-emote-data"),
            HeaderName::from_static("x-seventv-platform"),
            HeaderName::from_static("x-seventv-version"),
        ])
        .expose_headers([HeaderName::from_static("x-access-token")])
        .max_age(Duration::from_secs(7200))
        .vary([header::ORIGIN])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], uri: &str) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_cookie_wins_over_header() {
        let req = request(
            &[("cookie", "seventv-auth=from-cookie"), ("authorization", "Bearer from-header")],
            "/v3/emotes",
        );
        assert_eq!(request_token(&req).unwrap().as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_bearer_header() {
        let req = request(&[("authorization", "Bearer abc.def.ghi")], "/v3/emotes");
        assert_eq!(request_token(&req).unwrap().as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let req = request(&[("authorization", "Basic dXNlcjpwYXNz")], "/v3/emotes");
        let err = request_token(&req).unwrap_err();
        assert!(err.to_string().contains("Bad Authorization Header"));
    }

    #[test]
    fn test_token_query_only_on_auth_routes() {
        let auth = request(&[], "/v3/auth?platform=twitch&token=abc");
        assert_eq!(request_token(&auth).unwrap().as_deref(), Some("abc"));

        let other = request(&[], "/v3/emotes?token=abc");
        assert_eq!(request_token(&other).unwrap(), None);
    }
}
