//! Database repositories.

mod audit_log;
mod ban;
mod emote;
mod emote_set;
mod entitlement;
mod message;
mod role;
mod system;
mod user;
mod user_connection;
mod user_presence;

pub use audit_log::AuditLogRepository;
pub use ban::BanRepository;
pub use emote::EmoteRepository;
pub use emote_set::EmoteSetRepository;
pub use entitlement::EntitlementRepository;
pub use message::MessageRepository;
pub use role::RoleRepository;
pub use system::SystemRepository;
pub use user::UserRepository;
pub use user_connection::UserConnectionRepository;
pub use user_presence::UserPresenceRepository;
