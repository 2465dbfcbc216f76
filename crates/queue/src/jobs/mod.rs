//! Job definitions.

mod purge_assets;

pub use purge_assets::PurgeAssetsJob;
