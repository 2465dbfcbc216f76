//! Client configuration endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, header},
    response::IntoResponse,
    routing::get,
};
use seventv_common::AppResult;

use crate::middleware::AppState;

const CACHE_CONTROL: HeaderValue = HeaderValue::from_static("max-age=60");

/// Get the configuration document of a client, `extension` or `extension-beta`.
async fn show(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let config = state.system_service.config(&name).await?;
    Ok(([(header::CACHE_CONTROL, CACHE_CONTROL)], Json(config)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{name}", get(show))
}
