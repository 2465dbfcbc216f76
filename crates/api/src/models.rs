//! Response models.
//!
//! Database rows carry grants, client addresses and storage internals that are
//! never sent to clients; handlers convert them into these shapes instead.

use chrono::SecondsFormat;
use seventv_common::permissions::emote_set_flag;
use seventv_core::{EmoteDetails, UserDetails};
use seventv_db::entities::{
    embedded::{ActiveEmote, ImageFile},
    emote, emote_set, emote_version, user, user_connection, user_presence,
};
use serde::Serialize;
use serde_json::Value;

fn millis(at: &sea_orm::prelude::DateTimeWithTimeZone) -> i64 {
    at.timestamp_millis()
}

/// Files of an image host.
#[derive(Debug, Clone, Serialize)]
pub struct ImageHost {
    pub url: String,
    pub files: Vec<ImageFileModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageFileModel {
    pub name: String,
    pub static_name: String,
    pub format: String,
    pub width: i32,
    pub height: i32,
    pub frame_count: i32,
    pub size: i64,
}

impl From<&ImageFile> for ImageFileModel {
    fn from(file: &ImageFile) -> Self {
        Self {
            name: file.name.clone(),
            static_name: file.static_name.clone(),
            format: file.format.clone(),
            width: file.width,
            height: file.height,
            frame_count: file.frame_count,
            size: file.size,
        }
    }
}

/// Lightweight user, embedded in other objects.
#[derive(Debug, Clone, Serialize)]
pub struct UserPartial {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl UserPartial {
    #[must_use]
    pub fn new(user: &user::Model, cdn_url: &str) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            avatar_url: avatar_url(user, cdn_url),
            roles: user.role_ids.0.clone(),
        }
    }
}

fn avatar_url(user: &user::Model, cdn_url: &str) -> Option<String> {
    let avatar = user.avatar.as_ref()?;
    avatar.id.as_ref()?;
    let file = avatar
        .image_files
        .iter()
        .find(|f| f.format.eq_ignore_ascii_case("webp"))
        .or_else(|| avatar.image_files.first())?;
    Some(format!("{}/{}", cdn_url.trim_end_matches('/'), file.key))
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionModel {
    pub id: String,
    pub platform: String,
    pub username: String,
    pub display_name: String,
    pub linked_at: i64,
    pub emote_capacity: i32,
    pub emote_set_id: Option<String>,
}

impl From<&user_connection::Model> for ConnectionModel {
    fn from(c: &user_connection::Model) -> Self {
        Self {
            id: c.id.clone(),
            platform: c.platform.as_str().to_string(),
            username: c.username.clone(),
            display_name: c.display_name.clone(),
            linked_at: millis(&c.linked_at),
            emote_capacity: c.emote_slots,
            emote_set_id: c.emote_set_id.clone(),
        }
    }
}

/// Full user with connections and editors.
#[derive(Debug, Clone, Serialize)]
pub struct UserModel {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub user_type: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub roles: Vec<String>,
    pub editors: Vec<EditorModel>,
    pub connections: Vec<ConnectionModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditorModel {
    pub id: String,
    pub permissions: i32,
    pub visible: bool,
    pub added_at: i64,
}

impl UserModel {
    #[must_use]
    pub fn new(details: &UserDetails, cdn_url: &str) -> Self {
        let user = &details.user;
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            user_type: user.user_type.clone(),
            created_at: millis(&user.created_at),
            avatar_url: avatar_url(user, cdn_url),
            roles: user.role_ids.0.clone(),
            editors: user
                .editors
                .0
                .iter()
                .filter(|e| e.visible)
                .map(|e| EditorModel {
                    id: e.id.clone(),
                    permissions: e.permissions,
                    visible: e.visible,
                    added_at: e.added_at.timestamp_millis(),
                })
                .collect(),
            connections: details.connections.iter().map(ConnectionModel::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmoteVersionModel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub lifecycle: i16,
    pub listed: bool,
    pub animated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub host: ImageHost,
    pub created_at: i64,
}

impl EmoteVersionModel {
    #[must_use]
    pub fn new(version: &emote_version::Model, cdn_url: &str) -> Self {
        Self {
            id: version.id.clone(),
            name: version.name.clone(),
            description: version.description.clone(),
            lifecycle: version.lifecycle.code(),
            listed: version.listed,
            animated: version.animated,
            error: version.error.clone(),
            host: emote_host(&version.id, &version.image_files.0, cdn_url),
            created_at: millis(&version.created_at),
        }
    }
}

fn emote_host(version_id: &str, files: &[ImageFile], cdn_url: &str) -> ImageHost {
    ImageHost {
        url: format!("{}/emote/{version_id}", cdn_url.trim_end_matches('/')),
        files: files.iter().map(ImageFileModel::from).collect(),
    }
}

/// Lightweight emote, embedded in lists and sets.
#[derive(Debug, Clone, Serialize)]
pub struct EmotePartial {
    pub id: String,
    pub name: String,
    pub flags: i32,
    pub tags: Vec<String>,
    pub owner_id: String,
    pub created_at: i64,
}

impl From<&emote::Model> for EmotePartial {
    fn from(e: &emote::Model) -> Self {
        Self {
            id: e.id.clone(),
            name: e.name.clone(),
            flags: e.flags,
            tags: e.tags.0.clone(),
            owner_id: e.owner_id.clone(),
            created_at: millis(&e.created_at),
        }
    }
}

/// Full emote with its versions, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct EmoteModel {
    #[serde(flatten)]
    pub emote: EmotePartial,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserPartial>,
    pub lifecycle: i16,
    pub listed: bool,
    pub animated: bool,
    pub host: Option<ImageHost>,
    pub versions: Vec<EmoteVersionModel>,
}

impl EmoteModel {
    #[must_use]
    pub fn new(details: &EmoteDetails, owner: Option<&user::Model>, cdn_url: &str) -> Self {
        // Versions come newest first; the emote shows the one whose id it carries.
        let current = details
            .versions
            .iter()
            .find(|v| v.id == details.emote.id)
            .or_else(|| details.versions.first());

        Self {
            emote: EmotePartial::from(&details.emote),
            owner: owner.map(|u| UserPartial::new(u, cdn_url)),
            lifecycle: current.map_or(0, |v| v.lifecycle.code()),
            listed: current.is_some_and(|v| v.listed),
            animated: current.is_some_and(|v| v.animated),
            host: current.map(|v| emote_host(&v.id, &v.image_files.0, cdn_url)),
            versions: details
                .versions
                .iter()
                .map(|v| EmoteVersionModel::new(v, cdn_url))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveEmoteModel {
    pub id: String,
    pub name: String,
    pub flags: i32,
    pub timestamp: i64,
    pub actor_id: Option<String>,
    /// `null` when the emote no longer exists.
    pub data: Option<EmotePartial>,
}

impl ActiveEmoteModel {
    #[must_use]
    pub fn new(active: &ActiveEmote, data: Option<&emote::Model>) -> Self {
        Self {
            id: active.id.clone(),
            name: active.name.clone(),
            flags: active.flags,
            timestamp: active.timestamp.timestamp_millis(),
            actor_id: active.actor_id.clone(),
            data: data.map(EmotePartial::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmoteSetModel {
    pub id: String,
    pub name: String,
    pub flags: i32,
    pub tags: Vec<String>,
    pub immutable: bool,
    pub privileged: bool,
    pub emotes: Vec<ActiveEmoteModel>,
    pub emote_count: usize,
    pub capacity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserPartial>,
}

impl EmoteSetModel {
    /// `emotes` holds the loaded emote of each active emote, in order.
    #[must_use]
    pub fn new(
        set: &emote_set::Model,
        emotes: &[Option<emote::Model>],
        owner: Option<&user::Model>,
        cdn_url: &str,
    ) -> Self {
        let active: Vec<ActiveEmoteModel> = set
            .emotes
            .0
            .iter()
            .zip(emotes.iter().map(Option::as_ref).chain(std::iter::repeat(None)))
            .map(|(a, e)| ActiveEmoteModel::new(a, e))
            .collect();

        Self {
            id: set.id.clone(),
            name: set.name.clone(),
            flags: set.flags,
            tags: set.tags.0.clone(),
            immutable: set.flags & emote_set_flag::IMMUTABLE != 0,
            privileged: set.privileged,
            emote_count: active.len(),
            emotes: active,
            capacity: set.capacity,
            owner: owner.map(|u| UserPartial::new(u, cdn_url)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceModel {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub authentic: bool,
    pub data: Value,
    pub timestamp: String,
    pub ttl: String,
}

impl From<&user_presence::Model> for PresenceModel {
    fn from(p: &user_presence::Model) -> Self {
        Self {
            id: p.id.clone(),
            user_id: p.user_id.clone(),
            kind: p.kind.clone(),
            authentic: p.authentic,
            data: p.data.clone(),
            timestamp: p.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            ttl: p.expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
