//! Deletion of superseded files.

use serde::{Deserialize, Serialize};
use seventv_core::services::assets::AssetRef;

/// Delete a batch of object store files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeAssetsJob {
    pub assets: Vec<AssetRef>,
}

impl PurgeAssetsJob {
    #[must_use]
    pub const fn new(assets: Vec<AssetRef>) -> Self {
        Self { assets }
    }
}
