//! User reads and mutations: roles, editors, active emote sets, connection
//! transfers, deletion and presences.

use chrono::{Duration, Utc};
use sea_orm::{Set, Unchanged};
use seventv_common::{
    AppError, AppResult, EntityKind, IdGenerator,
    permissions::{editor_permission, permission},
};
use seventv_db::{
    entities::{
        embedded::{EditorList, StringList, UserEditor},
        enums::{AuditLogKind, ObjectKind, Platform},
        user, user_connection, user_presence,
    },
    repositories::{
        EmoteSetRepository, MessageRepository, RoleRepository, UserConnectionRepository,
        UserPresenceRepository, UserRepository,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{
    actor::Actor,
    audit::{AuditChange, AuditEntry, AuditLogger},
    emote_set::ListItemAction,
};
use crate::{
    builder::Builder,
    events::{ChangeField, ChangeFieldType, ChangeMap, EventCondition, EventType, Events},
    locks::KeyedMutex,
    validation,
};

/// Lifetime in seconds of a presence in a channel linked to a known user.
pub const KNOWN_CHANNEL_PRESENCE_TTL: i64 = 24 * 60 * 60;

/// Lifetime in seconds of any other presence.
pub const PRESENCE_TTL: i64 = 12 * 60;

/// A user with its connections, primary connection first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: user::Model,
    pub connections: Vec<user_connection::Model>,
}

/// One step of an editor list edit.
#[derive(Debug, Clone, Deserialize)]
pub struct EditorChange {
    pub action: ListItemAction,
    pub id: String,
    #[serde(default)]
    pub permissions: Option<i32>,
    #[serde(default)]
    pub visible: Option<bool>,
}

/// Channel the user is reported in.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceChannel {
    pub platform: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceWrite {
    pub kind: String,
    #[serde(default)]
    pub passive: bool,
    pub data: PresenceChannel,
}

#[derive(Clone)]
pub struct UserService {
    users: UserRepository,
    connections: UserConnectionRepository,
    roles: RoleRepository,
    emote_sets: EmoteSetRepository,
    messages: MessageRepository,
    presences: UserPresenceRepository,
    audit: AuditLogger,
    events: Events,
    locks: KeyedMutex,
    id_gen: IdGenerator,
}

impl UserService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        users: UserRepository,
        connections: UserConnectionRepository,
        roles: RoleRepository,
        emote_sets: EmoteSetRepository,
        messages: MessageRepository,
        presences: UserPresenceRepository,
        audit: AuditLogger,
        events: Events,
        locks: KeyedMutex,
    ) -> Self {
        Self {
            users,
            connections,
            roles,
            emote_sets,
            messages,
            presences,
            audit,
            events,
            locks,
            id_gen: IdGenerator::new(),
        }
    }

    pub async fn get(&self, id: &str) -> AppResult<UserDetails> {
        let user = self.users.get_by_id(id).await?;
        let connections = self.connections.find_by_user(id).await?;
        Ok(UserDetails { user, connections })
    }

    pub async fn by_connection(&self, platform: &str, id: &str) -> AppResult<UserDetails> {
        let platform = parse_platform(platform)?;
        let connection = self
            .connections
            .find(platform, id)
            .await?
            .ok_or_else(|| AppError::unknown(EntityKind::User, "Unknown User"))?;
        self.get(&connection.user_id).await
    }

    async fn position_of(&self, user: &user::Model) -> AppResult<i32> {
        let roles = self.roles.find_effective(&user.role_ids.0).await?;
        Ok(roles.iter().map(|r| r.position).max().unwrap_or(0))
    }

    /// Fail unless the actor's highest role outranks the victim's.
    async fn require_dominance(&self, actor: &Actor, victim: &user::Model) -> AppResult<()> {
        if actor.has(permission::SUPER_ADMINISTRATOR) {
            return Ok(());
        }
        let victim_position = self.position_of(victim).await?;
        if actor.highest_position() <= victim_position {
            return Err(AppError::forbidden("Lower than victim")
                .with_field("ACTOR_ROLE_POSITION", actor.highest_position())
                .with_field("VICTIM_ROLE_POSITION", victim_position));
        }
        Ok(())
    }

    /// Grant or revoke a role.
    pub async fn set_role(
        &self,
        actor: &Actor,
        user_id: &str,
        role_id: &str,
        action: ListItemAction,
    ) -> AppResult<user::Model> {
        actor.require(permission::MANAGE_ROLES, "MANAGE_ROLES")?;
        let _guard = self.locks.lock(&format!("user:{user_id}")).await;

        let role = self.roles.get_by_id(role_id).await?;
        if !actor.has(permission::SUPER_ADMINISTRATOR) && role.position >= actor.highest_position() {
            return Err(AppError::forbidden("Role is higher than or equal to yours")
                .with_field("ACTOR_ROLE_POSITION", actor.highest_position())
                .with_field("ROLE_POSITION", role.position));
        }

        let user = self.users.get_by_id(user_id).await?;
        let mut role_ids = user.role_ids.0.clone();
        let mut audit = AuditChange::array("role_ids");
        let mut changes = ChangeMap::new(user_id, ObjectKind::User, Some(&actor.user));

        match action {
            ListItemAction::Add | ListItemAction::Update => {
                if role_ids.contains(&role.id) {
                    return Ok(user);
                }
                audit = audit.added(role_ids.len(), role.id.as_str());
                changes.pushed.push(
                    ChangeField::new("role_ids", ChangeFieldType::String, role.id.as_str())
                        .at(role_ids.len()),
                );
                role_ids.push(role.id.clone());
            }
            ListItemAction::Remove => {
                let Some(index) = role_ids.iter().position(|r| *r == role.id) else {
                    return Ok(user);
                };
                role_ids.remove(index);
                audit = audit.removed(index, role.id.as_str());
                changes.pulled.push(
                    ChangeField::new("role_ids", ChangeFieldType::String, serde_json::Value::Null)
                        .old(role.id.as_str())
                        .at(index),
                );
            }
        }

        let mut builder = Builder::new(user.clone());
        builder.update(|u| u.role_ids = StringList(role_ids))?;
        let user = match builder.finish::<user::ActiveModel>()? {
            Some(am) => self.users.update(am).await?,
            None => user,
        };

        self.audit
            .write(AuditEntry::new(AuditLogKind::EditUser, actor.id(), ObjectKind::User, user_id).change(audit))
            .await;
        self.events
            .dispatch(EventType::UpdateUser, changes, EventCondition::object_id(user_id));
        Ok(user)
    }

    /// Bind an emote set to one of a user's connections, or unbind it with `None`.
    pub async fn set_active_emote_set(
        &self,
        actor: &Actor,
        user_id: &str,
        connection_id: &str,
        set_id: Option<&str>,
    ) -> AppResult<user_connection::Model> {
        let user = self.users.get_by_id(user_id).await?;
        if user.id != actor.id()
            && !actor.has(permission::MANAGE_USERS)
            && !actor.is_editor_of(&user, editor_permission::MANAGE_EMOTE_SETS)
        {
            return Err(AppError::forbidden(
                "You are not allowed to change the active Emote Set of this user",
            ));
        }

        let connections = self.connections.find_by_user(user_id).await?;
        let (index, connection) = connections
            .iter()
            .enumerate()
            .find(|(_, c)| c.id == connection_id)
            .ok_or_else(|| AppError::unknown(EntityKind::Connection, "Unknown Connection"))?;

        if let Some(set_id) = set_id {
            let set = self.emote_sets.get_by_id(set_id).await?;
            if set.owner_id.as_deref() != Some(user.id.as_str())
                && !actor.has(permission::EDIT_ANY_EMOTE_SET)
            {
                return Err(AppError::forbidden(
                    "You cannot assign another user's Emote Set to your channel",
                ));
            }
        }

        let new_set = set_id.map(str::to_string);
        if connection.emote_set_id == new_set {
            return Ok(connection.clone());
        }

        let old_set = connection.emote_set_id.clone();
        let updated = self
            .connections
            .update(user_connection::ActiveModel {
                platform: Unchanged(connection.platform),
                id: Unchanged(connection.id.clone()),
                emote_set_id: Set(new_set.clone()),
                ..Default::default()
            })
            .await?;

        self.audit
            .write(
                AuditEntry::new(AuditLogKind::EditUser, actor.id(), ObjectKind::User, user_id).change(
                    AuditChange::array("connections").updated(
                        index,
                        json!({
                            "o": { "id": connection.id, "emote_set_id": old_set },
                            "n": { "id": connection.id, "emote_set_id": new_set },
                        }),
                    ),
                ),
            )
            .await;

        let mut changes = ChangeMap::new(user_id, ObjectKind::User, Some(&actor.user));
        changes.updated.push(ChangeField::nested(
            "connections",
            index,
            vec![
                ChangeField::new("emote_set_id", ChangeFieldType::String, json!(new_set))
                    .old(json!(old_set)),
            ],
        ));
        self.events
            .dispatch(EventType::UpdateUser, changes, EventCondition::object_id(user_id));

        info!(user_id, connection_id, set_id = ?set_id, "changed active emote set");
        Ok(updated)
    }

    /// Add, update or remove an editor.
    pub async fn edit_editor(
        &self,
        actor: &Actor,
        user_id: &str,
        change: EditorChange,
    ) -> AppResult<user::Model> {
        let _guard = self.locks.lock(&format!("user:{user_id}")).await;
        let user = self.users.get_by_id(user_id).await?;

        let self_removal = change.action == ListItemAction::Remove && change.id == actor.id();
        if !self_removal
            && !actor.has(permission::MANAGE_USERS)
            && !actor.acts_for(&user, editor_permission::MANAGE_EDITORS)
        {
            return Err(AppError::forbidden(
                "You don't have permission to manage this user's editors",
            ));
        }

        let mut editors = user.editors.0.clone();
        let existing = editors.iter().position(|e| e.id == change.id);
        let mut audit = AuditChange::array("editors");
        let mut changes = ChangeMap::new(user_id, ObjectKind::User, Some(&actor.user));

        match (change.action, existing) {
            (ListItemAction::Add, Some(_)) => {
                return Err(AppError::invalid("User is already an editor"));
            }
            (ListItemAction::Add, None) => {
                if editors.len() >= validation::MAX_EDITORS {
                    return Err(AppError::invalid(format!(
                        "You have reached the maximum amount of editors allowed ({})",
                        validation::MAX_EDITORS
                    )));
                }
                if change.id == user.id {
                    return Err(AppError::invalid("You cannot add yourself as an editor"));
                }
                self.users
                    .find_by_id(&change.id)
                    .await?
                    .ok_or_else(|| AppError::unknown(EntityKind::User, "Unknown User"))?;

                let editor = UserEditor {
                    id: change.id.clone(),
                    permissions: change.permissions.unwrap_or(editor_permission::MODIFY_EMOTES),
                    visible: change.visible.unwrap_or(true),
                    added_at: Utc::now(),
                };
                let value = json!(editor);
                audit = audit.added(editors.len(), value.clone());
                changes.pushed.push(
                    ChangeField::new("editors", ChangeFieldType::Object, value).at(editors.len()),
                );
                editors.push(editor);
            }
            (ListItemAction::Update | ListItemAction::Remove, None) => {
                return Err(AppError::invalid("User is not an editor"));
            }
            (ListItemAction::Update, Some(index)) => {
                let old = editors[index].clone();
                let editor = &mut editors[index];
                if let Some(permissions) = change.permissions {
                    editor.permissions = permissions;
                }
                if let Some(visible) = change.visible {
                    editor.visible = visible;
                }
                if *editor == old {
                    return Ok(user);
                }
                audit = audit.updated(index, json!({ "o": old, "n": editor }));
                changes.updated.push(
                    ChangeField::new("editors", ChangeFieldType::Object, json!(editor))
                        .old(json!(old))
                        .at(index),
                );
            }
            (ListItemAction::Remove, Some(index)) => {
                let old = editors.remove(index);
                audit = audit.removed(index, json!(old));
                changes.pulled.push(
                    ChangeField::new("editors", ChangeFieldType::Object, serde_json::Value::Null)
                        .old(json!(old))
                        .at(index),
                );
            }
        }

        let mut builder = Builder::new(user.clone());
        builder.update(|u| u.editors = EditorList(editors))?;
        let user = match builder.finish::<user::ActiveModel>()? {
            Some(am) => self.users.update(am).await?,
            None => user,
        };

        self.audit
            .write(AuditEntry::new(AuditLogKind::EditUser, actor.id(), ObjectKind::User, user_id).change(audit))
            .await;
        self.events
            .dispatch(EventType::UpdateUser, changes, EventCondition::object_id(user_id));
        Ok(user)
    }

    /// Delete a user and everything it owns. Returns the number of deleted rows.
    pub async fn delete(&self, actor: &Actor, user_id: &str) -> AppResult<u64> {
        actor.require(permission::MANAGE_USERS, "MANAGE_USERS")?;
        let victim = self.users.get_by_id(user_id).await?;
        self.require_dominance(actor, &victim).await?;

        let mut deleted = 0;
        deleted += self.emote_sets.delete_by_owner(user_id).await?;
        deleted += self.messages.delete_by_author(user_id).await?;
        deleted += self.messages.delete_reads_by_recipient(user_id).await?;
        deleted += self.presences.delete_by_user(user_id).await?;
        let editors = self.users.pull_editor(user_id).await?;
        deleted += self.users.delete(user_id).await?;

        self.audit
            .write(AuditEntry::new(AuditLogKind::DeleteUser, actor.id(), ObjectKind::User, user_id))
            .await;

        let mut changes = ChangeMap::new(user_id, ObjectKind::User, Some(&actor.user));
        changes.object = Some(json!(victim));
        self.events
            .dispatch(EventType::DeleteUser, changes, EventCondition::object_id(user_id));

        info!(user_id, actor_id = %actor.id(), deleted, editors, "deleted user");
        Ok(deleted)
    }

    /// Move a connection from `donor_id` to `recipient_id`.
    ///
    /// The connection row is re-pointed in place, so it is never attached to
    /// both users nor to neither of them.
    pub async fn transfer_connection(
        &self,
        actor: &Actor,
        donor_id: &str,
        connection_id: &str,
        recipient_id: &str,
    ) -> AppResult<user_connection::Model> {
        actor.require(permission::MANAGE_USERS, "MANAGE_USERS")?;
        if donor_id == recipient_id {
            return Err(AppError::invalid("Donor and recipient are the same user"));
        }

        let donor = self.users.get_by_id(donor_id).await?;
        self.require_dominance(actor, &donor).await?;
        self.users.get_by_id(recipient_id).await?;

        let donor_connections = self.connections.find_by_user(donor_id).await?;
        let (donor_index, connection) = donor_connections
            .iter()
            .enumerate()
            .find(|(_, c)| c.id == connection_id)
            .ok_or_else(|| AppError::unknown(EntityKind::Connection, "Unknown Connection"))?;

        let moved = self
            .connections
            .reassign(connection.platform, &connection.id, recipient_id)
            .await?;

        self.audit
            .write(
                AuditEntry::new(
                    AuditLogKind::TransferConnection,
                    actor.id(),
                    ObjectKind::User,
                    donor_id,
                )
                .change(AuditChange::single("connection_user_id", donor_id, recipient_id))
                .change(AuditChange::array("connections").removed(donor_index, json!(moved))),
            )
            .await;

        let mut pulled = ChangeMap::new(donor_id, ObjectKind::User, Some(&actor.user));
        pulled.pulled.push(
            ChangeField::new("connections", ChangeFieldType::Object, serde_json::Value::Null)
                .old(json!(connection))
                .at(donor_index),
        );
        self.events
            .dispatch(EventType::UpdateUser, pulled, EventCondition::object_id(donor_id));

        match self.connections.find_by_user(recipient_id).await {
            Ok(list) => {
                let index = list.iter().position(|c| c.id == moved.id).unwrap_or(0);
                let mut pushed = ChangeMap::new(recipient_id, ObjectKind::User, Some(&actor.user));
                pushed.pushed.push(
                    ChangeField::new("connections", ChangeFieldType::Object, json!(moved)).at(index),
                );
                self.events.dispatch(
                    EventType::UpdateUser,
                    pushed,
                    EventCondition::object_id(recipient_id),
                );
            }
            Err(e) => warn!(error = %e, recipient_id, "failed to reload recipient connections"),
        }

        info!(donor_id, recipient_id, connection_id, "transferred connection");
        Ok(moved)
    }

    /// Record that a user is present in a channel.
    ///
    /// Reports from the user themselves are authentic. A channel linked to a
    /// known user keeps the presence for a day; any other for twelve minutes.
    pub async fn write_presence(
        &self,
        actor: Option<&Actor>,
        user_id: &str,
        input: PresenceWrite,
        ip_address: Option<String>,
    ) -> AppResult<user_presence::Model> {
        if !input.kind.eq_ignore_ascii_case("channel") {
            return Err(AppError::invalid("Unsupported presence kind"));
        }
        let platform = parse_platform(&input.data.platform)?;
        self.users.get_by_id(user_id).await?;

        let authentic = actor.is_some_and(|a| a.id() == user_id);
        let ttl = Duration::seconds(
            if self.connections.find(platform, &input.data.id).await?.is_some() {
                KNOWN_CHANNEL_PRESENCE_TTL
            } else {
                PRESENCE_TTL
            },
        );
        let now = Utc::now();

        let existing = self
            .presences
            .find_channel(user_id, platform.as_str(), &input.data.id)
            .await?;
        let presence = match existing {
            Some(p) => {
                self.presences
                    .update(user_presence::ActiveModel {
                        id: Unchanged(p.id),
                        authentic: Set(p.authentic || authentic),
                        ip_address: Set(ip_address),
                        timestamp: Set(now.into()),
                        expires_at: Set((now + ttl).into()),
                        ..Default::default()
                    })
                    .await?
            }
            None => {
                self.presences
                    .create(user_presence::ActiveModel {
                        id: Set(self.id_gen.generate()),
                        user_id: Set(user_id.to_string()),
                        kind: Set("CHANNEL".to_string()),
                        authentic: Set(authentic),
                        ip_address: Set(ip_address),
                        data: Set(json!({ "platform": platform.as_str(), "id": input.data.id })),
                        timestamp: Set(now.into()),
                        expires_at: Set((now + ttl).into()),
                    })
                    .await?
            }
        };

        if !input.passive {
            info!(user_id, platform = platform.as_str(), authentic, "wrote presence");
        }
        Ok(presence)
    }
}

fn parse_platform(s: &str) -> AppResult<Platform> {
    Platform::parse(s).ok_or_else(|| AppError::invalid("Unknown Platform").with_field("PLATFORM", s))
}
