//! Asset cleanup through the job queue.

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use seventv_common::{AppError, AppResult};
use seventv_core::services::assets::{AssetCleanup, AssetRef};
use tracing::debug;

use crate::jobs::PurgeAssetsJob;

/// Queues a [`PurgeAssetsJob`] per purge request.
#[derive(Clone)]
pub struct QueuedAssetCleanup {
    storage: RedisStorage<PurgeAssetsJob>,
}

impl QueuedAssetCleanup {
    #[must_use]
    pub const fn new(storage: RedisStorage<PurgeAssetsJob>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AssetCleanup for QueuedAssetCleanup {
    async fn purge(&self, assets: Vec<AssetRef>) -> AppResult<()> {
        if assets.is_empty() {
            return Ok(());
        }
        let count = assets.len();
        self.storage
            .clone()
            .push(PurgeAssetsJob::new(assets))
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue job: {e}")))?;
        debug!(count, "queued asset purge");
        Ok(())
    }
}
