//! Purge worker.

use std::sync::Arc;

use apalis::prelude::*;
use seventv_common::ObjectStore;
use seventv_core::services::assets::purge_assets;
use tracing::{info, warn};

use crate::jobs::PurgeAssetsJob;

/// Context for the purge worker.
#[derive(Clone)]
pub struct PurgeAssetsContext {
    pub storage: Arc<dyn ObjectStore>,
}

impl PurgeAssetsContext {
    #[must_use]
    pub fn new(storage: Arc<dyn ObjectStore>) -> Self {
        Self { storage }
    }
}

/// Worker function for purging files.
///
/// Fails when some deletions did not go through so the job is retried.
/// Deleting an already missing file succeeds.
pub async fn purge_assets_worker(
    job: PurgeAssetsJob,
    ctx: Data<PurgeAssetsContext>,
) -> Result<(), Error> {
    let wanted = job.assets.iter().filter(|a| !a.key.is_empty()).count();
    let deleted = purge_assets(ctx.storage.as_ref(), &job.assets).await;

    if deleted < wanted {
        warn!(deleted, wanted, "some assets could not be deleted");
        let e: Box<dyn std::error::Error + Send + Sync> =
            format!("deleted {deleted} of {wanted} assets").into();
        return Err(Error::Failed(e.into()));
    }

    info!(deleted, "purged assets");
    Ok(())
}
