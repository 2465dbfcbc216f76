//! User endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    middleware,
    routing::{get, patch, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use seventv_common::{AppResult, parse_id};
use seventv_core::PresenceWrite;
use tracing::info;

use crate::{
    endpoints::emotes::MAX_UPLOAD_SIZE,
    extractors::{AuthActor, ClientIp, MaybeActor},
    middleware::AppState,
    models::{PresenceModel, UserModel},
    rate_limit::rate_limit_user_picture_middleware,
};

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub recipient_user_id: String,
    pub donor_user_id: String,
    pub connection_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionTransfer {
    pub new_user_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub document_deleted_count: u64,
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<UserModel>> {
    let id = parse_id(&id)?;
    let details = state.user_service.get(&id).await?;
    Ok(Json(UserModel::new(&details, &state.config.cdn_url)))
}

/// Get the user owning a platform account.
async fn show_by_connection(
    State(state): State<AppState>,
    Path((platform, connection_id)): Path<(String, String)>,
) -> AppResult<Json<UserModel>> {
    let details = state
        .user_service
        .by_connection(&platform, &connection_id)
        .await?;
    Ok(Json(UserModel::new(&details, &state.config.cdn_url)))
}

async fn delete(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<String>,
) -> AppResult<Json<DeleteResponse>> {
    let id = parse_id(&id)?;
    let document_deleted_count = state.user_service.delete(&actor, &id).await?;
    Ok(Json(DeleteResponse {
        document_deleted_count,
    }))
}

/// Move a connection of the donor to the recipient.
async fn merge(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Json(req): Json<MergeRequest>,
) -> AppResult<Json<Value>> {
    let donor = parse_id(&req.donor_user_id)?;
    let recipient = parse_id(&req.recipient_user_id)?;

    state
        .user_service
        .transfer_connection(&actor, &donor, &req.connection_id, &recipient)
        .await?;
    info!(donor, recipient, connection_id = %req.connection_id, "merged users");

    Ok(Json(json!({})))
}

async fn transfer_connection(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path((id, connection_id)): Path<(String, String)>,
    Json(req): Json<ConnectionTransfer>,
) -> AppResult<Json<Value>> {
    let donor = parse_id(&id)?;
    let recipient = parse_id(&req.new_user_id)?;

    state
        .user_service
        .transfer_connection(&actor, &donor, &connection_id, &recipient)
        .await?;

    Ok(Json(json!({})))
}

/// Report the user as present in a channel.
async fn write_presence(
    State(state): State<AppState>,
    MaybeActor(actor): MaybeActor,
    ClientIp(ip): ClientIp,
    Path(id): Path<String>,
    Json(req): Json<PresenceWrite>,
) -> AppResult<Json<PresenceModel>> {
    let id = parse_id(&id)?;
    let presence = state
        .user_service
        .write_presence(actor.as_ref(), &id, req, ip)
        .await?;
    Ok(Json(PresenceModel::from(&presence)))
}

/// Replace a profile picture. The target may be `@me`.
async fn update_profile_picture(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let target = if id == "@me" { id } else { parse_id(&id)? };
    let pending_id = state
        .ingest_service
        .upload_avatar(&actor, &target, body)
        .await?;
    info!(actor_id = actor.id(), target, pending_id, "profile picture queued");

    Ok(Json(json!({})))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let profile_picture = put(update_profile_picture)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_user_picture_middleware,
        ));

    // Path parameters at the same depth share one name.
    Router::new()
        .route("/merge", post(merge))
        .route("/{user}", get(show).delete(delete))
        .route("/{user}/{connection_id}", get(show_by_connection))
        .route("/{user}/presences", post(write_presence))
        .route("/{user}/profile-picture", profile_picture)
        .route(
            "/{user}/connections/{connection_id}",
            patch(transfer_connection),
        )
}
