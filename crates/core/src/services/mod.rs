//! Business logic services.

#![allow(missing_docs)]

pub mod actor;
pub mod assets;
pub mod audit;
pub mod auth;
pub mod ban;
pub mod emote;
pub mod emote_set;
pub mod ingest;
pub mod login;
pub mod message;
pub mod oauth;
pub mod role;
pub mod system;
pub mod user;

pub use actor::{Actor, ActorService, effective_permissions};
pub use assets::{AssetCleanup, AssetCleanupService, AssetRef, InlineAssetCleanup, purge_assets};
pub use audit::{AuditChange, AuditEntry, AuditLogger};
pub use auth::{AccessClaims, AuthService, CsrfClaims};
pub use ban::{BanCreate, BanEdit, BanService};
pub use emote::{EmoteDelete, EmoteDetails, EmoteEdit, EmoteService, VersionEdit};
pub use emote_set::{
    ActiveEmoteChange, EmoteSetCreate, EmoteSetService, EmoteSetUpdate, ListItemAction,
};
pub use ingest::{
    EmoteUpload, IngestService, IngestSettings, ProcessorResult, ProcessorTask, UploadedEmote,
    VersionUpload,
};
pub use login::{LoginOutcome, LoginService};
pub use message::{InboxMessage, MessageService, ModRequest};
pub use oauth::{OAuthGrant, OAuthService, PlatformUser};
pub use role::{RoleCreate, RoleEdit, RoleService};
pub use system::SystemService;
pub use user::{EditorChange, PresenceChannel, PresenceWrite, UserDetails, UserService};
