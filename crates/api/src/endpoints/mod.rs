//! REST v3 endpoints.

mod auth;
mod config;
mod emote_sets;
mod emotes;
mod users;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, header},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;

use crate::middleware::AppState;

pub use auth::{ACCESS_TOKEN_HEADER, session_cookie};
pub use emotes::{EMOTE_DATA_HEADER, MAX_UPLOAD_SIZE};

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub online: bool,
    /// Process start as unix milliseconds.
    pub uptime: String,
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("max-age=30"))],
        Json(RootResponse {
            online: true,
            uptime: state.started_at.timestamp_millis().to_string(),
        }),
    )
}

/// Create the `/v3` router.
pub fn router(state: &AppState) -> Router<AppState> {
    let v3 = Router::new()
        .route("/", get(root))
        .nest("/auth", auth::router(state))
        .nest("/config", config::router())
        .nest("/emotes", emotes::router(state))
        .nest("/emote-sets", emote_sets::router())
        .nest("/users", users::router(state));

    Router::new().nest("/v3", v3)
}
