//! Common utilities and shared types for the SevenTV API.
//!
//! This crate provides foundational components used across all crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: The error taxonomy via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Time-sortable 12-byte ids via [`ObjectId`] and [`IdGenerator`]
//! - **Permissions**: Role permission bits and entity flag bitsets
//! - **Storage**: Object store gateway (local, S3-compatible)
//!
//! # Example
//!
//! ```no_run
//! use seventv_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load(None)?;
//!     let id = IdGenerator::new().generate();
//!     println!("{} -> {}", config.website_url, id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod permissions;
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult, ConflictKind, EntityKind, ErrorDetail, ErrorFields};
pub use id::{IdGenerator, ObjectId, parse_id};
pub use permissions::{
    ActiveEmoteFlags, BanEffects, EditorPermissions, EmoteFlags, EmoteSetFlags, Permissions,
};
pub use storage::{Acl, LocalStorage, ObjectStore, StoredObject, compose_key};

#[cfg(feature = "s3")]
pub use storage::S3Storage;
