//! Job workers.

mod purge_assets;

pub use purge_assets::{PurgeAssetsContext, purge_assets_worker};
