//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `seventv_test`)
//!   `TEST_DB_PASSWORD` (default: `seventv_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::Utc;
use sea_orm::Set;
use seventv_common::IdGenerator;
use seventv_db::{
    entities::{
        emote_set, user, user_connection,
        embedded::{ActiveEmote, ActiveEmoteList, EditorList, OriginList, StringList},
        enums::Platform,
    },
    repositories::{EmoteSetRepository, UserConnectionRepository, UserRepository},
    test_utils::{TestDatabase, TestDbConfig},
};

fn new_user(id: &str, username: &str) -> user::ActiveModel {
    user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(username.to_string()),
        display_name: Set(username.to_string()),
        user_type: Set(String::new()),
        role_ids: Set(StringList::default()),
        editors: Set(EditorList::default()),
        blocked_user_ids: Set(StringList::default()),
        token_version: Set(1),
        avatar: Set(None),
        last_login_at: Set(None),
        last_visit_at: Set(None),
        last_client_ip: Set(None),
        former_username: Set(None),
        created_at: Set(Utc::now().into()),
    }
}

fn new_connection(user_id: &str, id: &str) -> user_connection::ActiveModel {
    user_connection::ActiveModel {
        platform: Set(Platform::Twitch),
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        username: Set("forsen".to_string()),
        display_name: Set("forsen".to_string()),
        linked_at: Set(Utc::now().into()),
        emote_set_id: Set(None),
        emote_slots: Set(600),
        data: Set(serde_json::json!({})),
        grant: Set(None),
    }
}

fn active(id: &str, name: &str) -> ActiveEmote {
    ActiveEmote {
        id: id.to_string(),
        name: name.to_string(),
        flags: 0,
        timestamp: Utc::now(),
        actor_id: None,
        origin_id: None,
    }
}

fn new_set(id: &str, emotes: Vec<ActiveEmote>) -> emote_set::ActiveModel {
    emote_set::ActiveModel {
        id: Set(id.to_string()),
        name: Set("set".to_string()),
        owner_id: Set(None),
        privileged: Set(false),
        capacity: Set(250),
        flags: Set(0),
        tags: Set(StringList::default()),
        emotes: Set(ActiveEmoteList(emotes)),
        origins: Set(OriginList::default()),
        created_at: Set(Utc::now().into()),
    }
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(config.database_url().starts_with("postgres://"));
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_connection_is_globally_unique() {
    let db = TestDatabase::scratch().await.unwrap();
    let conn = Arc::new(db.connection().clone());
    let ids = IdGenerator::new();

    let users = UserRepository::new(Arc::clone(&conn));
    let connections = UserConnectionRepository::new(Arc::clone(&conn));

    let a = users.create(new_user(&ids.generate(), "a")).await.unwrap();
    let b = users.create(new_user(&ids.generate(), "b")).await.unwrap();

    connections.create(new_connection(&a.id, "1")).await.unwrap();
    assert!(connections.create(new_connection(&b.id, "1")).await.is_err());

    let found = users
        .find_by_connection(Platform::Twitch, "1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, a.id);

    db.teardown().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_merge_emote_rewrites_references_once() {
    let db = TestDatabase::scratch().await.unwrap();
    let conn = Arc::new(db.connection().clone());
    let ids = IdGenerator::new();
    let sets = EmoteSetRepository::new(conn);

    let (source, target) = (ids.generate(), ids.generate());
    let set_a = sets
        .create(new_set(&ids.generate(), vec![active(&source, "A")]))
        .await
        .unwrap();
    let set_b = sets
        .create(new_set(
            &ids.generate(),
            vec![active(&source, "A"), active(&target, "B")],
        ))
        .await
        .unwrap();

    assert_eq!(sets.merge_emote(&source, &target).await.unwrap(), 1);
    assert_eq!(sets.merge_emote(&source, &target).await.unwrap(), 0);

    let set_a = sets.get_by_id(&set_a.id).await.unwrap();
    assert_eq!(set_a.emotes.0[0].id, target);
    assert_eq!(set_a.emotes.0[0].name, "A");

    let set_b_after = sets.get_by_id(&set_b.id).await.unwrap();
    assert_eq!(set_b_after.emotes, set_b.emotes);

    db.teardown().await.unwrap();
}
