//! Emote set endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use seventv_common::{AppResult, parse_id};

use crate::{middleware::AppState, models::EmoteSetModel};

/// Get an emote set with its emotes. `GLOBAL` names the global set.
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<EmoteSetModel>> {
    let id = state.system_service.resolve_set_id(&id).await?;
    let id = parse_id(&id)?;
    let set = state.emote_set_service.get(&id).await?;

    let ids = set.emotes.0.iter().map(|e| e.id.clone()).collect();
    let emotes = state.emote_loader.load_many(ids).await?;
    let owner = match &set.owner_id {
        Some(owner_id) => state.user_loader.load(owner_id.clone()).await?,
        None => None,
    };

    Ok(Json(EmoteSetModel::new(
        &set,
        &emotes,
        owner.as_ref(),
        &state.config.cdn_url,
    )))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(show))
}
