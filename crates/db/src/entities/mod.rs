//! Database entities.

#![allow(missing_docs)]

pub mod audit_log;
pub mod ban;
pub mod embedded;
pub mod emote;
pub mod emote_set;
pub mod emote_version;
pub mod entitlement;
pub mod enums;
pub mod message;
pub mod message_read;
pub mod role;
pub mod system;
pub mod user;
pub mod user_connection;
pub mod user_presence;

pub use audit_log::Entity as AuditLog;
pub use ban::Entity as Ban;
pub use emote::Entity as Emote;
pub use emote_set::Entity as EmoteSet;
pub use emote_version::Entity as EmoteVersion;
pub use entitlement::Entity as Entitlement;
pub use message::Entity as Message;
pub use message_read::Entity as MessageRead;
pub use role::Entity as Role;
pub use system::Entity as System;
pub use user::Entity as User;
pub use user_connection::Entity as UserConnection;
pub use user_presence::Entity as UserPresence;
