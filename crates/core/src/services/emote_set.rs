//! Emote sets: active emote edits and set lifecycle.
//!
//! A set lists its native entries first, followed by entries contributed by
//! origin sets. Only the native prefix is ever mutated here and only the
//! native prefix counts against the capacity.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::Set;
use seventv_common::{
    AppError, AppResult, ConflictKind, EmoteFlags, EntityKind, ErrorDetail, IdGenerator,
    Permissions,
    permissions::{editor_permission, emote_flag, permission},
};
use seventv_db::{
    entities::{
        embedded::{ActiveEmote, ActiveEmoteList, OriginList, StringList},
        emote, emote_set,
        enums::{AuditLogKind, ObjectKind},
        user,
    },
    repositories::{
        EmoteRepository, EmoteSetRepository, RoleRepository, UserConnectionRepository,
        UserRepository,
    },
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use validator::Validate;

use super::{
    actor::{Actor, effective_permissions},
    audit::{AuditChange, AuditEntry, AuditLogger},
};
use crate::{
    builder::Builder,
    events::{ChangeField, ChangeFieldType, ChangeMap, EventCondition, EventType, Events},
    locks::KeyedMutex,
    validation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListItemAction {
    Add,
    Update,
    Remove,
}

/// One step of an active emote edit.
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveEmoteChange {
    pub action: ListItemAction,
    pub id: String,
    /// Alias within the set. Defaults to the emote's own name on add.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub flags: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmoteSetCreate {
    pub name: String,
    /// Defaults to the actor.
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EmoteSetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub privileged: Option<bool>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
}

#[derive(Clone)]
pub struct EmoteSetService {
    emote_sets: EmoteSetRepository,
    emotes: EmoteRepository,
    users: UserRepository,
    roles: RoleRepository,
    connections: UserConnectionRepository,
    audit: AuditLogger,
    events: Events,
    locks: KeyedMutex,
    id_gen: IdGenerator,
}

impl EmoteSetService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        emote_sets: EmoteSetRepository,
        emotes: EmoteRepository,
        users: UserRepository,
        roles: RoleRepository,
        connections: UserConnectionRepository,
        audit: AuditLogger,
        events: Events,
        locks: KeyedMutex,
    ) -> Self {
        Self {
            emote_sets,
            emotes,
            users,
            roles,
            connections,
            audit,
            events,
            locks,
            id_gen: IdGenerator::new(),
        }
    }

    pub async fn get(&self, id: &str) -> AppResult<emote_set::Model> {
        self.emote_sets.get_by_id(id).await
    }

    async fn owner_of(&self, set: &emote_set::Model) -> AppResult<Option<user::Model>> {
        match set.owner_id.as_deref() {
            Some(id) => self.users.find_by_id(id).await,
            None => Ok(None),
        }
    }

    /// Permissions of a user other than the actor.
    async fn permissions_of(&self, actor: &Actor, user: &user::Model) -> AppResult<Permissions> {
        if user.id == actor.id() {
            return Ok(actor.permissions);
        }
        let roles = self.roles.find_effective(&user.role_ids.0).await?;
        Ok(effective_permissions(&roles))
    }

    /// Check the actor may change the settings of a set, returning its owner.
    async fn authorize_manage(
        &self,
        actor: &Actor,
        set: &emote_set::Model,
    ) -> AppResult<Option<user::Model>> {
        actor.require(permission::EDIT_EMOTE_SET, "EDIT_EMOTE_SET")?;
        if set.privileged && !actor.has(permission::SUPER_ADMINISTRATOR) {
            return Err(AppError::forbidden("This set is privileged"));
        }

        let owner = self.owner_of(set).await?;
        let allowed = actor.has(permission::EDIT_ANY_EMOTE_SET)
            || owner
                .as_ref()
                .is_some_and(|o| actor.acts_for(o, editor_permission::MANAGE_EMOTE_SETS));
        if allowed {
            Ok(owner)
        } else {
            Err(AppError::forbidden(
                "You do not have permission to modify this emote set",
            ))
        }
    }

    /// Apply a batch of add, update and remove steps to the native entries of a set.
    ///
    /// The batch is all or nothing: the first failing step aborts it before
    /// anything is written.
    pub async fn edit_emotes(
        &self,
        actor: &Actor,
        set_id: &str,
        changes: Vec<ActiveEmoteChange>,
    ) -> AppResult<emote_set::Model> {
        actor.require(permission::EDIT_EMOTE_SET, "EDIT_EMOTE_SET")?;
        let _guard = self.locks.lock(&format!("emote_set:{set_id}")).await;

        let set = self.emote_sets.get_by_id(set_id).await?;
        if set.privileged && !actor.has(permission::SUPER_ADMINISTRATOR) {
            return Err(AppError::forbidden("This set is privileged"));
        }

        let owner = self.owner_of(&set).await?;
        let allowed = actor.has(permission::EDIT_ANY_EMOTE_SET)
            || owner
                .as_ref()
                .is_some_and(|o| actor.acts_for(o, editor_permission::MODIFY_EMOTES));
        if !allowed {
            return Err(AppError::forbidden(
                "You do not have permission to change content in this emote set",
            ));
        }

        let added_ids: Vec<String> = changes
            .iter()
            .filter(|c| c.action == ListItemAction::Add)
            .map(|c| c.id.clone())
            .collect();
        let emotes: HashMap<String, emote::Model> = self
            .emotes
            .find_by_ids(&added_ids)
            .await?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();

        let split = set
            .emotes
            .0
            .iter()
            .position(|e| e.origin_id.is_some())
            .unwrap_or(set.emotes.0.len());
        let mut native = set.emotes.0[..split].to_vec();
        let inherited = set.emotes.0[split..].to_vec();

        let mut owner_permissions: Option<Permissions> = None;
        let mut audit = AuditChange::array("emotes");
        let mut changemap = ChangeMap::new(&set.id, ObjectKind::EmoteSet, Some(&actor.user));

        for change in changes {
            match change.action {
                ListItemAction::Add => {
                    let emote = emotes.get(&change.id).ok_or_else(|| {
                        AppError::unknown(EntityKind::Emote, "Unknown Emote")
                            .with_field("EMOTE_ID", change.id.as_str())
                    })?;
                    let flags = EmoteFlags(emote.flags);

                    if flags.has(emote_flag::PRIVATE) && !self.can_use_private(actor, emote).await? {
                        return Err(AppError::forbidden("Private Emote")
                            .with_field("EMOTE_ID", emote.id.as_str()));
                    }

                    if flags.has(emote_flag::ZERO_WIDTH) {
                        let perms = match owner_permissions {
                            Some(p) => p,
                            None => {
                                let p = match owner.as_ref() {
                                    Some(o) => self.permissions_of(actor, o).await?,
                                    None => actor.permissions,
                                };
                                owner_permissions = Some(p);
                                p
                            }
                        };
                        if !perms.allows(permission::FEATURE_ZERO_WIDTH_EMOTE_TYPE) {
                            return Err(AppError::forbidden(
                                "You must be a subscriber to use zero-width emotes",
                            )
                            .with_field("EMOTE_ID", emote.id.as_str()));
                        }
                    }

                    if !actor.has(permission::EDIT_ANY_EMOTE_SET)
                        && native.len() >= usize::try_from(set.capacity).unwrap_or(0)
                    {
                        return Err(AppError::NoSpaceAvailable(ErrorDetail::new(
                            "This set does not have enough slots",
                        ))
                        .with_field("CAPACITY", set.capacity));
                    }

                    if native.iter().chain(&inherited).any(|e| e.id == emote.id) {
                        return Err(AppError::conflict(
                            ConflictKind::EmoteAlreadyEnabled,
                            "This emote is already enabled",
                        )
                        .with_field("EMOTE_ID", emote.id.as_str()));
                    }

                    let name = change
                        .name
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| emote.name.clone());
                    validation::emote_name(&name)?;
                    if let Some(other) = native.iter().chain(&inherited).find(|e| e.name == name) {
                        return Err(name_conflict(&emote.id, &name, &other.id));
                    }

                    let entry = ActiveEmote {
                        id: emote.id.clone(),
                        name,
                        flags: change.flags.unwrap_or(0),
                        timestamp: Utc::now(),
                        actor_id: Some(actor.id().to_string()),
                        origin_id: None,
                    };
                    let index = native.len();
                    let value = json!(entry);
                    audit = audit.added(index, value.clone());
                    changemap
                        .pushed
                        .push(ChangeField::new("emotes", ChangeFieldType::Object, value).at(index));
                    native.push(entry);
                }
                ListItemAction::Update => {
                    let index = position(&native, &change.id)?;
                    let old = native[index].clone();
                    let mut entry = old.clone();

                    if let Some(name) = change.name.filter(|n| !n.is_empty() && *n != old.name) {
                        validation::emote_name(&name)?;
                        let taken = native
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| *i != index)
                            .map(|(_, e)| e)
                            .chain(&inherited)
                            .find(|e| e.name == name);
                        if let Some(other) = taken {
                            return Err(name_conflict(&old.id, &name, &other.id));
                        }
                        entry.name = name;
                    }
                    if let Some(flags) = change.flags {
                        entry.flags = flags;
                    }
                    if entry == old {
                        continue;
                    }

                    audit = audit.updated(index, json!({ "o": old, "n": entry }));
                    changemap.updated.push(
                        ChangeField::new("emotes", ChangeFieldType::Object, json!(entry))
                            .old(json!(old))
                            .at(index),
                    );
                    native[index] = entry;
                }
                ListItemAction::Remove => {
                    let index = position(&native, &change.id)?;
                    let old = native.remove(index);
                    audit = audit.removed(index, json!(old));
                    changemap.pulled.push(
                        ChangeField::new("emotes", ChangeFieldType::Object, serde_json::Value::Null)
                            .old(json!(old))
                            .at(index),
                    );
                }
            }
        }

        if audit.is_empty() {
            return Ok(set);
        }

        native.extend(inherited);
        let mut builder = Builder::new(set.clone());
        builder.update(|s| s.emotes = ActiveEmoteList(native))?;
        let set = match builder.finish::<emote_set::ActiveModel>()? {
            Some(am) => self.emote_sets.update(am).await?,
            None => set,
        };

        self.audit
            .write(
                AuditEntry::new(
                    AuditLogKind::UpdateEmoteSet,
                    actor.id(),
                    ObjectKind::EmoteSet,
                    &set.id,
                )
                .change(audit),
            )
            .await;
        self.events.dispatch(
            EventType::UpdateEmoteSet,
            changemap,
            EventCondition::object_id(&set.id),
        );

        info!(set_id = %set.id, actor_id = %actor.id(), "edited active emotes");
        Ok(set)
    }

    /// The actor bypasses privacy, owns the emote or edits for its owner.
    async fn can_use_private(&self, actor: &Actor, emote: &emote::Model) -> AppResult<bool> {
        if actor.has(permission::BYPASS_PRIVACY) || emote.owner_id == actor.id() {
            return Ok(true);
        }
        Ok(self
            .users
            .find_by_id(&emote.owner_id)
            .await?
            .is_some_and(|o| actor.is_editor_of(&o, editor_permission::USE_PRIVATE_EMOTES)))
    }

    pub async fn create(&self, actor: &Actor, input: EmoteSetCreate) -> AppResult<emote_set::Model> {
        actor.require(permission::CREATE_EMOTE_SET, "CREATE_EMOTE_SET")?;
        validation::emote_set_name(&input.name)?;

        let owner_id = input.owner_id.unwrap_or_else(|| actor.id().to_string());
        if owner_id != actor.id() && !actor.has(permission::MANAGE_USERS) {
            let owner = self
                .users
                .find_by_id(&owner_id)
                .await?
                .ok_or_else(|| AppError::unknown(EntityKind::User, "Unknown User"))?;
            if !actor.is_editor_of(&owner, editor_permission::MANAGE_EMOTE_SETS) {
                return Err(AppError::forbidden(
                    "You are not allowed to create an Emote Set on behalf of this user",
                ));
            }
        }
        if input.privileged && !actor.has(permission::SUPER_ADMINISTRATOR) {
            return Err(AppError::forbidden(
                "You cannot modify an emote set's privileged state",
            ));
        }

        let count = self.emote_sets.count_by_owner(&owner_id).await?;
        if count >= validation::MAX_EMOTE_SETS {
            return Err(AppError::invalid(format!(
                "This user has reached the limit of Emote Sets ({})",
                validation::MAX_EMOTE_SETS
            )));
        }

        let set = self
            .emote_sets
            .create(emote_set::ActiveModel {
                id: Set(self.id_gen.generate()),
                name: Set(input.name),
                owner_id: Set(Some(owner_id)),
                privileged: Set(input.privileged),
                capacity: Set(validation::DEFAULT_SET_CAPACITY),
                flags: Set(0),
                tags: Set(StringList::default()),
                emotes: Set(ActiveEmoteList::default()),
                origins: Set(OriginList::default()),
                created_at: Set(Utc::now().into()),
            })
            .await?;

        self.audit
            .write(AuditEntry::new(
                AuditLogKind::CreateEmoteSet,
                actor.id(),
                ObjectKind::EmoteSet,
                &set.id,
            ))
            .await;

        let mut changes = ChangeMap::new(&set.id, ObjectKind::EmoteSet, Some(&actor.user));
        changes.object = Some(json!(set));
        self.events.dispatch(
            EventType::CreateEmoteSet,
            changes,
            EventCondition::object_id(&set.id),
        );

        info!(set_id = %set.id, actor_id = %actor.id(), "created emote set");
        Ok(set)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &str,
        input: EmoteSetUpdate,
    ) -> AppResult<emote_set::Model> {
        input.validate()?;
        let _guard = self.locks.lock(&format!("emote_set:{id}")).await;

        let set = self.emote_sets.get_by_id(id).await?;
        let owner = self.authorize_manage(actor, &set).await?;

        let mut builder = Builder::new(set.clone());
        let mut log = AuditEntry::new(AuditLogKind::UpdateEmoteSet, actor.id(), ObjectKind::EmoteSet, id);
        let mut changes = ChangeMap::new(id, ObjectKind::EmoteSet, Some(&actor.user));

        if let Some(name) = input.name.filter(|n| *n != set.name) {
            validation::emote_set_name(&name)?;
            log = log.change(AuditChange::single("name", set.name.as_str(), name.as_str()));
            changes.updated.push(
                ChangeField::new("name", ChangeFieldType::String, name.as_str())
                    .old(set.name.as_str()),
            );
            builder.update(|s| s.name = name)?;
        }

        if let Some(privileged) = input.privileged.filter(|p| *p != set.privileged) {
            if !actor.has(permission::SUPER_ADMINISTRATOR) {
                return Err(AppError::forbidden(
                    "You cannot modify an emote set's privileged state",
                ));
            }
            log = log.change(AuditChange::single("privileged", set.privileged, privileged));
            builder.update(|s| s.privileged = privileged)?;
        }

        if let Some(owner_id) = input.owner_id.filter(|o| set.owner_id.as_deref() != Some(o)) {
            actor.require(permission::EDIT_ANY_EMOTE_SET, "EDIT_ANY_EMOTE_SET")?;
            self.users
                .find_by_id(&owner_id)
                .await?
                .ok_or_else(|| AppError::unknown(EntityKind::User, "Unknown User"))?;
            log = log.change(AuditChange::single(
                "owner_id",
                set.owner_id.clone().unwrap_or_default(),
                owner_id.as_str(),
            ));
            changes.updated.push(
                ChangeField::new("owner_id", ChangeFieldType::String, owner_id.as_str())
                    .old(set.owner_id.clone().unwrap_or_default()),
            );
            builder.update(|s| s.owner_id = Some(owner_id))?;
        }

        if let Some(capacity) = input.capacity.filter(|c| *c != set.capacity) {
            if let Some(owner) = &owner {
                let max = self
                    .connections
                    .find_by_user(&owner.id)
                    .await?
                    .iter()
                    .map(|c| c.emote_slots)
                    .max()
                    .unwrap_or(0);
                if capacity > max {
                    return Err(AppError::invalid(format!(
                        "Capacity cannot be higher than {max}"
                    )));
                }
            }
            log = log.change(AuditChange::single("capacity", set.capacity, capacity));
            changes.updated.push(
                ChangeField::new("capacity", ChangeFieldType::Number, capacity).old(set.capacity),
            );
            builder.update(|s| s.capacity = capacity)?;
        }

        let Some(am) = builder.finish::<emote_set::ActiveModel>()? else {
            return Err(AppError::invalid("No changes"));
        };
        let set = self.emote_sets.update(am).await?;

        self.audit.write(log).await;
        self.events.dispatch(
            EventType::UpdateEmoteSet,
            changes,
            EventCondition::object_id(id),
        );

        info!(set_id = %id, actor_id = %actor.id(), "updated emote set");
        Ok(set)
    }

    pub async fn delete(&self, actor: &Actor, id: &str) -> AppResult<()> {
        let _guard = self.locks.lock(&format!("emote_set:{id}")).await;

        let set = self.emote_sets.get_by_id(id).await?;
        self.authorize_manage(actor, &set).await?;

        let unbound = self.connections.unset_emote_set(id).await?;
        self.emote_sets.delete(id).await?;

        self.audit
            .write(AuditEntry::new(
                AuditLogKind::DeleteEmoteSet,
                actor.id(),
                ObjectKind::EmoteSet,
                id,
            ))
            .await;

        let mut changes = ChangeMap::new(id, ObjectKind::EmoteSet, Some(&actor.user));
        changes.object = Some(json!(set));
        self.events.dispatch(
            EventType::DeleteEmoteSet,
            changes,
            EventCondition::object_id(id),
        );

        info!(set_id = %id, actor_id = %actor.id(), connections = unbound, "deleted emote set");
        Ok(())
    }
}

fn position(native: &[ActiveEmote], id: &str) -> AppResult<usize> {
    native.iter().position(|e| e.id == id).ok_or_else(|| {
        AppError::unknown(EntityKind::ActiveEmote, "Emote Not Enabled").with_field("EMOTE_ID", id)
    })
}

fn name_conflict(id: &str, name: &str, other: &str) -> AppError {
    AppError::conflict(ConflictKind::EmoteNameConflict, "Emote Name Conflict")
        .with_field("EMOTE_ID", id)
        .with_field("EMOTE_NAME", name)
        .with_field("CONFLICT_EMOTE_ID", other)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::testing::{RecordingPublisher, recording};
    use crate::testing::{conn, empty, mock};
    use sea_orm::MockDatabase;
    use seventv_db::{
        entities::{embedded::UserEditor, enums::Platform},
        fixtures,
        repositories::AuditLogRepository,
    };
    use std::sync::Arc;

    const OWNER_ID: &str = "60ae434d1aa1d1b2f8d4a5c7";
    const OTHER_ID: &str = "60ae434d1aa1d1b2f8d4a5c8";
    const SET_ID: &str = "60ae434d1aa1d1b2f8d4a5f1";
    const EMOTE_A: &str = "60ae434d1aa1d1b2f8d4a5e1";
    const EMOTE_B: &str = "60ae434d1aa1d1b2f8d4a5e2";

    struct Mocks {
        sets: MockDatabase,
        emotes: MockDatabase,
        users: MockDatabase,
        roles: MockDatabase,
        connections: MockDatabase,
    }

    impl Default for Mocks {
        fn default() -> Self {
            Self {
                sets: mock(),
                emotes: mock(),
                users: mock(),
                roles: mock(),
                connections: mock(),
            }
        }
    }

    fn service(m: Mocks) -> (EmoteSetService, Arc<RecordingPublisher>) {
        let (events, recorder) = recording();
        (
            EmoteSetService::new(
                EmoteSetRepository::new(conn(m.sets)),
                EmoteRepository::new(conn(m.emotes)),
                UserRepository::new(conn(m.users)),
                RoleRepository::new(conn(m.roles)),
                UserConnectionRepository::new(conn(m.connections)),
                AuditLogger::new(AuditLogRepository::new(empty())),
                events,
                KeyedMutex::new(),
            ),
            recorder,
        )
    }

    fn actor(id: &str, allowed: i64) -> Actor {
        Actor::new(
            fixtures::user(id, "actor"),
            vec![fixtures::role("r0", 0, allowed)],
            vec![],
        )
    }

    fn add(id: &str) -> ActiveEmoteChange {
        ActiveEmoteChange {
            action: ListItemAction::Add,
            id: id.to_string(),
            name: None,
            flags: None,
        }
    }

    #[tokio::test]
    async fn test_add_pushes_entry() {
        let set = fixtures::emote_set(SET_ID, Some(OWNER_ID));
        let mut updated = set.clone();
        updated.emotes = ActiveEmoteList(vec![fixtures::active_emote(EMOTE_A, "PepeLaugh")]);

        let (service, recorder) = service(Mocks {
            sets: mock()
                .append_query_results([vec![set]])
                .append_query_results([vec![updated]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            emotes: mock().append_query_results([vec![fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID)]]),
            ..Default::default()
        });

        let set = service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap();
        assert_eq!(set.emotes.0.len(), 1);

        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].d.event_type, EventType::UpdateEmoteSet);
        let pushed = &messages[0].d.body.pushed[0];
        assert_eq!(pushed.index, Some(0));
        assert_eq!(pushed.value["name"], "PepeLaugh");
    }

    #[tokio::test]
    async fn test_private_emote_rejected() {
        let mut private = fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID);
        private.flags = emote_flag::PRIVATE;

        let (service, recorder) = service(Mocks {
            sets: mock().append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]]),
            users: mock()
                .append_query_results([vec![fixtures::user(OWNER_ID, "owner")]])
                .append_query_results([vec![fixtures::user(OTHER_ID, "other")]]),
            emotes: mock().append_query_results([vec![private]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Private Emote"));
        assert_eq!(err.details().unwrap()["EMOTE_ID"], EMOTE_A);
        assert!(recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let mut set = fixtures::emote_set(SET_ID, Some(OWNER_ID));
        set.capacity = 2;
        set.emotes = ActiveEmoteList(vec![
            fixtures::active_emote("a", "one"),
            fixtures::active_emote("b", "two"),
        ]);

        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![set]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            emotes: mock().append_query_results([vec![fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID)]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoSpaceAvailable(_)));
        assert_eq!(err.details().unwrap()["CAPACITY"], 2);
    }

    #[tokio::test]
    async fn test_inherited_entries_do_not_count() {
        let mut set = fixtures::emote_set(SET_ID, Some(OWNER_ID));
        set.capacity = 1;
        let mut inherited = fixtures::active_emote("x", "inherited");
        inherited.origin_id = Some("origin".to_string());
        set.emotes = ActiveEmoteList(vec![inherited]);
        let updated = set.clone();

        let (service, recorder) = service(Mocks {
            sets: mock()
                .append_query_results([vec![set]])
                .append_query_results([vec![updated]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            emotes: mock().append_query_results([vec![fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID)]]),
            ..Default::default()
        });

        service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap();
        assert_eq!(recorder.messages()[0].d.body.pushed[0].index, Some(0));
    }

    #[tokio::test]
    async fn test_already_enabled() {
        let mut set = fixtures::emote_set(SET_ID, Some(OWNER_ID));
        set.emotes = ActiveEmoteList(vec![fixtures::active_emote(EMOTE_A, "PepeLaugh")]);

        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![set]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            emotes: mock().append_query_results([vec![fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID)]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict { kind: ConflictKind::EmoteAlreadyEnabled, .. }
        ));
    }

    #[tokio::test]
    async fn test_name_conflict() {
        let mut set = fixtures::emote_set(SET_ID, Some(OWNER_ID));
        set.emotes = ActiveEmoteList(vec![fixtures::active_emote(EMOTE_B, "PepeLaugh")]);

        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![set]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            emotes: mock().append_query_results([vec![fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID)]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Conflict { kind: ConflictKind::EmoteNameConflict, .. }
        ));
    }

    #[tokio::test]
    async fn test_zero_width_needs_owner_feature() {
        let mut emote = fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID);
        emote.flags = emote_flag::ZERO_WIDTH;

        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            emotes: mock().append_query_results([vec![emote]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(&actor(OWNER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("zero-width"));
    }

    #[tokio::test]
    async fn test_remove_pulls_entry() {
        let mut set = fixtures::emote_set(SET_ID, Some(OWNER_ID));
        set.emotes = ActiveEmoteList(vec![
            fixtures::active_emote(EMOTE_B, "First"),
            fixtures::active_emote(EMOTE_A, "Second"),
        ]);
        let mut updated = set.clone();
        updated.emotes.0.truncate(1);

        let (service, recorder) = service(Mocks {
            sets: mock()
                .append_query_results([vec![set]])
                .append_query_results([vec![updated]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            ..Default::default()
        });

        service
            .edit_emotes(
                &actor(OWNER_ID, permission::DEFAULT),
                SET_ID,
                vec![ActiveEmoteChange {
                    action: ListItemAction::Remove,
                    id: EMOTE_A.to_string(),
                    name: None,
                    flags: None,
                }],
            )
            .await
            .unwrap();

        let pulled = &recorder.messages()[0].d.body.pulled[0];
        assert_eq!(pulled.index, Some(1));
        assert_eq!(pulled.old_value.as_ref().unwrap()["name"], "Second");
    }

    #[tokio::test]
    async fn test_remove_missing_entry() {
        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(
                &actor(OWNER_ID, permission::DEFAULT),
                SET_ID,
                vec![ActiveEmoteChange {
                    action: ListItemAction::Remove,
                    id: EMOTE_A.to_string(),
                    name: None,
                    flags: None,
                }],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Emote Not Enabled"));
    }

    #[tokio::test]
    async fn test_editor_may_modify_emotes() {
        let mut owner = fixtures::user(OWNER_ID, "owner");
        owner.editors.0.push(UserEditor {
            id: OTHER_ID.to_string(),
            permissions: editor_permission::MODIFY_EMOTES,
            visible: true,
            added_at: Utc::now(),
        });
        let set = fixtures::emote_set(SET_ID, Some(OWNER_ID));

        let (service, _) = service(Mocks {
            sets: mock()
                .append_query_results([vec![set.clone()]])
                .append_query_results([vec![set]]),
            users: mock().append_query_results([vec![owner]]),
            emotes: mock().append_query_results([vec![fixtures::emote(EMOTE_A, "PepeLaugh", OTHER_ID)]]),
            ..Default::default()
        });

        service
            .edit_emotes(&actor(OTHER_ID, permission::DEFAULT), SET_ID, vec![add(EMOTE_A)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_privileged_set_locked() {
        let mut set = fixtures::emote_set(SET_ID, None);
        set.privileged = true;

        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![set]]),
            ..Default::default()
        });

        let err = service
            .edit_emotes(
                &actor(OWNER_ID, permission::DEFAULT | permission::EDIT_ANY_EMOTE_SET),
                SET_ID,
                vec![add(EMOTE_A)],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("This set is privileged"));
    }

    #[tokio::test]
    async fn test_create_limit() {
        let count = maplit::btreemap! {
            "num_items" => sea_orm::Value::BigInt(Some(10)),
        };
        let (service, _) = service(Mocks {
            sets: mock().append_query_results([[count]]),
            ..Default::default()
        });

        let err = service
            .create(
                &actor(OWNER_ID, permission::DEFAULT),
                EmoteSetCreate {
                    name: "Channel".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reached the limit"));
    }

    #[tokio::test]
    async fn test_create_on_behalf_requires_editor() {
        let (service, _) = service(Mocks {
            users: mock().append_query_results([vec![fixtures::user(OTHER_ID, "other")]]),
            ..Default::default()
        });

        let err = service
            .create(
                &actor(OWNER_ID, permission::DEFAULT),
                EmoteSetCreate {
                    name: "Channel".to_string(),
                    owner_id: Some(OTHER_ID.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("on behalf of this user"));
    }

    #[tokio::test]
    async fn test_capacity_bounded_by_slots() {
        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            connections: mock().append_query_results([vec![fixtures::connection(
                Platform::Twitch,
                "1",
                OWNER_ID,
            )]]),
            ..Default::default()
        });

        let err = service
            .update(
                &actor(OWNER_ID, permission::DEFAULT),
                SET_ID,
                EmoteSetUpdate {
                    capacity: Some(1000),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Capacity cannot be higher than 600"));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected_before_lookup() {
        let (service, _) = service(Mocks::default());

        let err = service
            .update(
                &actor(OWNER_ID, permission::DEFAULT),
                SET_ID,
                EmoteSetUpdate {
                    capacity: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_privileged_state_needs_super_admin() {
        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            ..Default::default()
        });

        let err = service
            .update(
                &actor(OWNER_ID, permission::DEFAULT),
                SET_ID,
                EmoteSetUpdate {
                    privileged: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("privileged state"));
    }

    #[tokio::test]
    async fn test_update_without_changes() {
        let (service, _) = service(Mocks {
            sets: mock().append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            ..Default::default()
        });

        let err = service
            .update(
                &actor(OWNER_ID, permission::DEFAULT),
                SET_ID,
                EmoteSetUpdate::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_delete_dispatches_event() {
        let exec = || sea_orm::MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        };
        let (service, recorder) = service(Mocks {
            sets: mock()
                .append_query_results([vec![fixtures::emote_set(SET_ID, Some(OWNER_ID))]])
                .append_exec_results([exec()]),
            users: mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]),
            connections: mock().append_exec_results([exec()]),
            ..Default::default()
        });

        service
            .delete(&actor(OWNER_ID, permission::DEFAULT), SET_ID)
            .await
            .unwrap();

        let messages = recorder.messages();
        assert_eq!(messages[0].d.event_type, EventType::DeleteEmoteSet);
        assert!(messages[0].d.body.object.is_some());
    }
}
