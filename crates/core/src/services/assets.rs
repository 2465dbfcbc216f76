//! Removal of superseded object store files.
//!
//! Core services only hand over the files to delete. The queue crate
//! implements [`AssetCleanup`] with a background job; [`InlineAssetCleanup`]
//! deletes right away and is used when no job backend is configured.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::future::join_all;
use seventv_common::{AppResult, ObjectStore};
use seventv_db::entities::embedded::ImageFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Upper bound for a single object deletion.
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(10);

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub bucket: String,
    pub key: String,
}

impl From<&ImageFile> for AssetRef {
    fn from(file: &ImageFile) -> Self {
        Self {
            bucket: file.bucket.clone(),
            key: file.key.clone(),
        }
    }
}

#[async_trait]
pub trait AssetCleanup: Send + Sync {
    /// Schedule the deletion of `assets`.
    async fn purge(&self, assets: Vec<AssetRef>) -> AppResult<()>;
}

pub type AssetCleanupService = Arc<dyn AssetCleanup>;

/// Delete every asset concurrently, each bounded by [`DELETE_TIMEOUT`].
///
/// Returns how many deletions succeeded. Failures are logged.
pub async fn purge_assets(storage: &dyn ObjectStore, assets: &[AssetRef]) -> usize {
    let results = join_all(assets.iter().filter(|a| !a.key.is_empty()).map(|asset| async move {
        match tokio::time::timeout(DELETE_TIMEOUT, storage.delete(&asset.bucket, &asset.key)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, bucket = %asset.bucket, key = %asset.key, "failed to delete asset");
                false
            }
            Err(_) => {
                warn!(bucket = %asset.bucket, key = %asset.key, "timed out deleting asset");
                false
            }
        }
    }))
    .await;

    let deleted = results.into_iter().filter(|ok| *ok).count();
    debug!(deleted, requested = assets.len(), "purged assets");
    deleted
}

/// Deletes assets in the calling task.
pub struct InlineAssetCleanup {
    storage: Arc<dyn ObjectStore>,
}

impl InlineAssetCleanup {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AssetCleanup for InlineAssetCleanup {
    async fn purge(&self, assets: Vec<AssetRef>) -> AppResult<()> {
        purge_assets(self.storage.as_ref(), &assets).await;
        Ok(())
    }
}
