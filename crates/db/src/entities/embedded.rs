//! Typed JSON documents embedded in entity columns.

use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// A list of ids or lowercase strings (role ids, tags, claimants, blocked users).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl StringList {
    /// Whether the list contains `value`.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }
}

impl From<Vec<String>> for StringList {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

/// A user granted delegated permissions on another user's resources.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEditor {
    /// Editor user id.
    pub id: String,
    /// Editor permission bits.
    pub permissions: i32,
    /// Whether the editor is listed publicly.
    pub visible: bool,
    /// When the editor was added.
    pub added_at: DateTime<Utc>,
}

/// Editors of a user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct EditorList(pub Vec<UserEditor>);

impl EditorList {
    /// Find the editor entry for `user_id`.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&UserEditor> {
        self.0.iter().find(|e| e.id == user_id)
    }
}

/// A processed or raw image file stored in the object store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ImageFile {
    /// File name (e.g. `1x.webp`).
    pub name: String,
    /// Static variant of an animated file.
    #[serde(default)]
    pub static_name: String,
    /// Container format.
    #[serde(default)]
    pub format: String,
    /// MIME content type.
    pub content_type: String,
    /// Width in pixels.
    #[serde(default)]
    pub width: i32,
    /// Height in pixels.
    #[serde(default)]
    pub height: i32,
    /// Number of frames.
    #[serde(default)]
    pub frame_count: i32,
    /// Size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Object store bucket.
    pub bucket: String,
    /// Object store key.
    pub key: String,
}

/// A list of image files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct ImageFileList(pub Vec<ImageFile>);

/// Profile picture state of a user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct UserAvatar {
    /// Id of the committed avatar.
    #[serde(default)]
    pub id: Option<String>,
    /// Id of an avatar still being processed.
    #[serde(default)]
    pub pending_id: Option<String>,
    /// Raw upload of the committed avatar.
    #[serde(default)]
    pub input_file: Option<ImageFile>,
    /// Processed outputs of the committed avatar.
    #[serde(default)]
    pub image_files: Vec<ImageFile>,
}

/// An emote as it appears in an emote set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEmote {
    /// Emote id.
    pub id: String,
    /// Name within the set, possibly an alias.
    pub name: String,
    /// Active emote flag bits.
    #[serde(default)]
    pub flags: i32,
    /// When the emote was added.
    pub timestamp: DateTime<Utc>,
    /// Who added the emote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Set that contributed this entry; `None` for native entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
}

/// Ordered active emotes of a set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct ActiveEmoteList(pub Vec<ActiveEmote>);

/// A set whose contents are appended to another set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteSetOrigin {
    /// Origin set id.
    pub id: String,
    /// Ordering weight.
    #[serde(default)]
    pub weight: i32,
    /// Optional slice of the origin's emotes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slices: Option<Vec<u32>>,
}

/// Origins of a set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct OriginList(pub Vec<EmoteSetOrigin>);

/// OAuth grant held for a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct ConnectionGrant {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Scopes granted.
    #[serde(default)]
    pub scope: Vec<String>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}
