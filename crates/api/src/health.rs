//! Health check listener.
//!
//! Served on its own port so probes bypass the API middleware stack.

use std::future::Future;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use seventv_common::{AppError, AppResult};
use tracing::error;

use crate::middleware::Infrastructure;

/// Time a single dependency gets to answer.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub database: bool,
    pub redis: bool,
    pub message_queue: bool,
    pub object_store: bool,
}

impl HealthReport {
    #[must_use]
    pub const fn healthy(&self) -> bool {
        self.database && self.redis && self.message_queue && self.object_store
    }
}

async fn probe<F>(name: &'static str, check: F) -> bool
where
    F: Future<Output = AppResult<()>>,
{
    let outcome = tokio::time::timeout(PROBE_TIMEOUT, check)
        .await
        .unwrap_or_else(|_| Err(AppError::MissingInternalDependency(format!("{name} timed out"))));

    match outcome {
        Ok(()) => true,
        Err(e) => {
            error!(dependency = name, error = %e, "health check failed");
            false
        }
    }
}

/// Ping every external dependency concurrently.
pub async fn check(infra: &Infrastructure) -> HealthReport {
    let (database, redis, message_queue, object_store) = tokio::join!(
        probe("database", seventv_db::ping(&infra.db)),
        probe("redis", infra.store.ping()),
        probe("message_queue", infra.mq.ping()),
        probe("object_store", infra.storage.ping()),
    );

    HealthReport {
        database,
        redis,
        message_queue,
        object_store,
    }
}

async fn health(State(infra): State<Infrastructure>) -> (StatusCode, Json<HealthReport>) {
    let report = check(&infra).await;
    let status = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

/// Router of the health listener.
pub fn router(infra: Infrastructure) -> Router {
    Router::new().route("/", get(health)).with_state(infra)
}
