//! Database enums.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// External platform of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    #[sea_orm(string_value = "TWITCH")]
    Twitch,
    #[sea_orm(string_value = "YOUTUBE")]
    Youtube,
    #[sea_orm(string_value = "DISCORD")]
    Discord,
    #[sea_orm(string_value = "KICK")]
    Kick,
}

impl Platform {
    /// Parse a case-insensitive platform name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TWITCH" => Some(Self::Twitch),
            "YOUTUBE" => Some(Self::Youtube),
            "DISCORD" => Some(Self::Discord),
            "KICK" => Some(Self::Kick),
            _ => None,
        }
    }

    /// Uppercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Twitch => "TWITCH",
            Self::Youtube => "YOUTUBE",
            Self::Discord => "DISCORD",
            Self::Kick => "KICK",
        }
    }
}

/// Lifecycle of an emote version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmoteLifecycle {
    #[sea_orm(num_value = -2)]
    Failed,
    #[sea_orm(num_value = -1)]
    Deleted,
    #[sea_orm(num_value = 0)]
    Pending,
    #[sea_orm(num_value = 1)]
    Processing,
    #[sea_orm(num_value = 2)]
    Disabled,
    #[sea_orm(num_value = 3)]
    Live,
}

impl EmoteLifecycle {
    /// Numeric value, as carried in change events.
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            Self::Failed => -2,
            Self::Deleted => -1,
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Disabled => 2,
            Self::Live => 3,
        }
    }

    /// Versions that are still being processed cannot be edited.
    #[must_use]
    pub const fn is_processing(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    #[sea_orm(string_value = "EMOTE_COMMENT")]
    EmoteComment,
    #[sea_orm(string_value = "MOD_REQUEST")]
    ModRequest,
    #[sea_orm(string_value = "INBOX")]
    Inbox,
    #[sea_orm(string_value = "NEWS")]
    News,
}

/// Kind of object targeted by an audit log or mod request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
pub enum ObjectKind {
    #[sea_orm(num_value = 1)]
    User,
    #[sea_orm(num_value = 2)]
    Emote,
    #[sea_orm(num_value = 3)]
    EmoteSet,
    #[sea_orm(num_value = 4)]
    Role,
    #[sea_orm(num_value = 5)]
    Entitlement,
    #[sea_orm(num_value = 6)]
    Ban,
    #[sea_orm(num_value = 7)]
    Message,
    #[sea_orm(num_value = 8)]
    Report,
}

impl ObjectKind {
    /// Lowercase name used in event payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Emote => "EMOTE",
            Self::EmoteSet => "EMOTE_SET",
            Self::Role => "ROLE",
            Self::Entitlement => "ENTITLEMENT",
            Self::Ban => "BAN",
            Self::Message => "MESSAGE",
            Self::Report => "REPORT",
        }
    }
}

/// Kind of mutation recorded by an audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
pub enum AuditLogKind {
    #[sea_orm(num_value = 1)]
    CreateEmote,
    #[sea_orm(num_value = 2)]
    DeleteEmote,
    #[sea_orm(num_value = 3)]
    DisableEmote,
    #[sea_orm(num_value = 4)]
    UpdateEmote,
    #[sea_orm(num_value = 5)]
    MergeEmote,
    #[sea_orm(num_value = 6)]
    UndoDeleteEmote,
    #[sea_orm(num_value = 7)]
    EnableEmote,
    #[sea_orm(num_value = 8)]
    ProcessEmote,

    #[sea_orm(num_value = 20)]
    SignUserToken,
    #[sea_orm(num_value = 21)]
    SignCsrfToken,
    #[sea_orm(num_value = 22)]
    RejectedAccess,

    #[sea_orm(num_value = 30)]
    CreateUser,
    #[sea_orm(num_value = 31)]
    DeleteUser,
    #[sea_orm(num_value = 32)]
    BanUser,
    #[sea_orm(num_value = 33)]
    EditUser,
    #[sea_orm(num_value = 35)]
    UnbanUser,
    #[sea_orm(num_value = 36)]
    TransferConnection,

    #[sea_orm(num_value = 70)]
    CreateEmoteSet,
    #[sea_orm(num_value = 71)]
    UpdateEmoteSet,
    #[sea_orm(num_value = 72)]
    DeleteEmoteSet,

    #[sea_orm(num_value = 80)]
    CreateReport,
    #[sea_orm(num_value = 81)]
    UpdateReport,

    #[sea_orm(num_value = 90)]
    ReadMessage,

    #[sea_orm(num_value = 100)]
    CreateRole,
    #[sea_orm(num_value = 101)]
    UpdateRole,
    #[sea_orm(num_value = 102)]
    DeleteRole,
}

/// Kind of an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementKind {
    #[sea_orm(string_value = "ROLE")]
    Role,
    #[sea_orm(string_value = "BADGE")]
    Badge,
    #[sea_orm(string_value = "PAINT")]
    Paint,
    #[sea_orm(string_value = "EMOTE_SET")]
    EmoteSet,
}
