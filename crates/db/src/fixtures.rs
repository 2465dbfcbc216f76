//! Model fixtures for mock-database tests.
//!
//! Every constructor fills the required columns with plausible values; tests
//! override what they care about with struct update syntax.

use chrono::Utc;
use serde_json::json;

use crate::entities::{
    ban,
    embedded::{ActiveEmote, ActiveEmoteList, EditorList, ImageFileList, OriginList, StringList},
    emote, emote_set, emote_version,
    enums::{EmoteLifecycle, Platform},
    role, user, user_connection,
};

/// A regular user with no roles, editors or blocks.
#[must_use]
pub fn user(id: &str, username: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: username.to_lowercase(),
        display_name: username.to_string(),
        user_type: String::new(),
        role_ids: StringList::default(),
        editors: EditorList::default(),
        blocked_user_ids: StringList::default(),
        token_version: 1,
        avatar: None,
        last_login_at: None,
        last_visit_at: None,
        last_client_ip: None,
        former_username: None,
        created_at: Utc::now().into(),
    }
}

/// A non-default role.
#[must_use]
pub fn role(id: &str, position: i32, allowed: i64) -> role::Model {
    role::Model {
        id: id.to_string(),
        name: format!("role-{position}"),
        position,
        color: 0,
        allowed,
        denied: 0,
        is_default: false,
        invisible: false,
        created_at: Utc::now().into(),
    }
}

/// A connection linked now, without an emote set.
#[must_use]
pub fn connection(platform: Platform, id: &str, user_id: &str) -> user_connection::Model {
    user_connection::Model {
        platform,
        id: id.to_string(),
        user_id: user_id.to_string(),
        username: format!("user{id}"),
        display_name: format!("User{id}"),
        linked_at: Utc::now().into(),
        emote_set_id: None,
        emote_slots: 600,
        data: json!({}),
        grant: None,
    }
}

/// A public emote without claimants.
#[must_use]
pub fn emote(id: &str, name: &str, owner_id: &str) -> emote::Model {
    emote::Model {
        id: id.to_string(),
        name: name.to_string(),
        owner_id: owner_id.to_string(),
        tags: StringList::default(),
        flags: 0,
        claimants: StringList::default(),
        created_at: Utc::now().into(),
    }
}

/// A listed version in the given lifecycle.
#[must_use]
pub fn emote_version(id: &str, emote_id: &str, lifecycle: EmoteLifecycle) -> emote_version::Model {
    emote_version::Model {
        id: id.to_string(),
        emote_id: emote_id.to_string(),
        name: String::new(),
        description: String::new(),
        animated: false,
        frame_count: 1,
        lifecycle,
        listed: true,
        allow_personal: None,
        error: None,
        input_file: None,
        image_files: ImageFileList::default(),
        archive_file: None,
        started_at: None,
        completed_at: None,
        created_at: Utc::now().into(),
    }
}

/// An empty emote set with the default capacity.
#[must_use]
pub fn emote_set(id: &str, owner_id: Option<&str>) -> emote_set::Model {
    emote_set::Model {
        id: id.to_string(),
        name: "Emote Set".to_string(),
        owner_id: owner_id.map(str::to_string),
        privileged: false,
        capacity: 250,
        flags: 0,
        tags: StringList::default(),
        emotes: ActiveEmoteList::default(),
        origins: OriginList::default(),
        created_at: Utc::now().into(),
    }
}

/// An active emote entry added now.
#[must_use]
pub fn active_emote(id: &str, name: &str) -> ActiveEmote {
    ActiveEmote {
        id: id.to_string(),
        name: name.to_string(),
        flags: 0,
        timestamp: Utc::now(),
        actor_id: None,
        origin_id: None,
    }
}

/// A ban expiring in a day.
#[must_use]
pub fn ban(id: &str, victim_id: &str, effects: i32) -> ban::Model {
    let now = Utc::now();
    ban::Model {
        id: id.to_string(),
        victim_id: victim_id.to_string(),
        actor_id: "60ae3a7b1aa1d1b2f8d4a001".to_string(),
        reason: "spam".to_string(),
        effects,
        expire_at: (now + chrono::Duration::days(1)).into(),
        created_at: now.into(),
    }
}
