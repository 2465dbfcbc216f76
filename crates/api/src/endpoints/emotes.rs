//! Emote endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use seventv_common::{AppError, AppResult, parse_id};
use seventv_core::EmoteUpload;
use tracing::info;

use crate::{
    extractors::AuthActor,
    middleware::AppState,
    models::{EmoteModel, EmotePartial},
    rate_limit::rate_limit_create_emote_middleware,
};

/// Header carrying the JSON metadata of an upload.
pub const EMOTE_DATA_HEADER: &str = "x-emote-data";

/// Largest accepted upload body.
pub const MAX_UPLOAD_SIZE: usize = 7 * 1024 * 1024;

const DEFAULT_SEARCH_LIMIT: u64 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default = "first_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

const fn first_page() -> u64 {
    1
}

const fn default_limit() -> u64 {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: u64,
    pub items: Vec<EmotePartial>,
}

#[derive(Debug, Serialize)]
pub struct CreatedEmote {
    pub id: String,
}

/// Search listed emotes by name.
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    let (emotes, total) = state
        .emote_service
        .search(&query.query, query.page, query.limit)
        .await?;

    Ok(Json(SearchResponse {
        total,
        items: emotes.iter().map(EmotePartial::from).collect(),
    }))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EmoteModel>> {
    let id = parse_id(&id)?;
    let details = state.emote_service.get(&id).await?;
    let owner = state.user_loader.load(details.emote.owner_id.clone()).await?;

    Ok(Json(EmoteModel::new(
        &details,
        owner.as_ref(),
        &state.config.cdn_url,
    )))
}

/// Upload an emote. The image is the raw body, metadata comes in `X-Emote-Data`.
async fn create(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(StatusCode, Json<CreatedEmote>)> {
    let raw = headers
        .get(EMOTE_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::invalid("Missing Emote Data").with_field("header", "X-Emote-Data"))?;
    let data: EmoteUpload = serde_json::from_str(raw)
        .map_err(|e| AppError::invalid(format!("Invalid Emote Data: {e}")))?;

    let uploaded = state.ingest_service.upload_emote(&actor, data, body).await?;
    info!(
        actor_id = actor.id(),
        emote_id = %uploaded.emote.id,
        version_id = %uploaded.version.id,
        "emote uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreatedEmote {
            id: uploaded.version.id,
        }),
    ))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let upload = post(create)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_create_emote_middleware,
        ));

    Router::new()
        .route("/", get(search).merge(upload))
        .route("/{id}", get(show))
}
