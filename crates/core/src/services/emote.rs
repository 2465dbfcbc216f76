//! Emote reads and mutations: edit, delete, undelete, merge.

use std::sync::Arc;

use futures::future::join_all;
use sea_orm::{Set, Unchanged};
use seventv_common::{
    Acl, AppError, AppResult, EmoteFlags, EntityKind, ObjectStore,
    permissions::{editor_permission, emote_flag, permission},
};
use seventv_db::{
    entities::{
        embedded::{ImageFile, StringList},
        emote, emote_version,
        enums::{AuditLogKind, EmoteLifecycle, ObjectKind},
    },
    repositories::{EmoteRepository, EmoteSetRepository, UserRepository},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use tracing::{error, info};

use super::{
    actor::Actor,
    audit::{AuditChange, AuditEntry, AuditLogger},
    message::{InboxMessage, MessageService},
};
use crate::{
    builder::Builder,
    events::{ChangeField, ChangeFieldType, ChangeMap, EventCondition, EventType, Events},
    locks::KeyedMutex,
    validation,
};

/// Largest page of a search.
pub const MAX_SEARCH_LIMIT: u64 = 300;

/// An emote with its versions, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmoteDetails {
    #[serde(flatten)]
    pub emote: emote::Model,
    pub versions: Vec<emote_version::Model>,
}

/// Requested changes to one version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionEdit {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub listed: Option<bool>,
    #[serde(default)]
    pub allow_personal: Option<bool>,
}

/// Requested changes to an emote. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmoteEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub flags: Option<i32>,
    #[serde(default)]
    pub versions: Vec<VersionEdit>,
}

/// Options of a delete or undelete.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmoteDelete {
    /// Only this version; every version when absent.
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub reason: String,
    /// Reinstate instead of delete.
    #[serde(default)]
    pub undo: bool,
}

#[derive(Clone)]
pub struct EmoteService {
    emotes: EmoteRepository,
    emote_sets: EmoteSetRepository,
    users: UserRepository,
    messages: MessageService,
    audit: AuditLogger,
    events: Events,
    storage: Arc<dyn ObjectStore>,
    locks: KeyedMutex,
}

impl EmoteService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        emotes: EmoteRepository,
        emote_sets: EmoteSetRepository,
        users: UserRepository,
        messages: MessageService,
        audit: AuditLogger,
        events: Events,
        storage: Arc<dyn ObjectStore>,
        locks: KeyedMutex,
    ) -> Self {
        Self {
            emotes,
            emote_sets,
            users,
            messages,
            audit,
            events,
            storage,
            locks,
        }
    }

    pub async fn get(&self, id: &str) -> AppResult<EmoteDetails> {
        let emote = self.emotes.get_by_id(id).await?;
        let versions = self.emotes.find_versions(id).await?;
        Ok(EmoteDetails { emote, versions })
    }

    /// Listed live emotes matching `query`, with the total match count.
    pub async fn search(
        &self,
        query: &str,
        page: u64,
        limit: u64,
    ) -> AppResult<(Vec<emote::Model>, u64)> {
        self.emotes
            .search(query.trim(), page.max(1), limit.clamp(1, MAX_SEARCH_LIMIT))
            .await
    }

    /// Whether `actor` may modify `emote` at all.
    async fn authorize(&self, actor: &Actor, emote: &emote::Model) -> AppResult<()> {
        if actor.has(permission::EDIT_ANY_EMOTE) || emote.owner_id == actor.id() {
            return Ok(());
        }
        if emote.owner_id.is_empty() {
            return Err(AppError::forbidden("Insufficient Privilege"));
        }

        let owner = self.users.find_by_id(&emote.owner_id).await?;
        match owner {
            Some(owner) if actor.is_editor_of(&owner, editor_permission::MANAGE_OWNED_EMOTES) => {
                Ok(())
            }
            _ => Err(AppError::forbidden("Insufficient Privilege")),
        }
    }

    /// Apply an edit and return the emote as stored.
    pub async fn edit(&self, actor: &Actor, id: &str, edit: EmoteEdit) -> AppResult<EmoteDetails> {
        let _guard = self.locks.lock(&format!("emote:{id}")).await;

        let emote = self.emotes.get_by_id(id).await?;
        self.authorize(actor, &emote).await?;
        let versions = self.emotes.find_versions(id).await?;

        let privileged = actor.has(permission::EDIT_ANY_EMOTE);
        let mut builder = Builder::new(emote.clone());
        let mut log = AuditEntry::new(AuditLogKind::UpdateEmote, actor.id(), ObjectKind::Emote, id);
        let mut fields = Vec::new();

        if let Some(name) = edit.name.filter(|n| *n != emote.name) {
            validation::emote_name(&name)?;
            log = log.change(AuditChange::single("name", emote.name.as_str(), name.as_str()));
            fields.push(
                ChangeField::new("name", ChangeFieldType::String, name.as_str())
                    .old(emote.name.as_str()),
            );
            builder.update(|e| e.name = name)?;
        }

        if let Some(owner_id) = edit.owner_id.filter(|o| *o != emote.owner_id) {
            self.users
                .find_by_id(&owner_id)
                .await?
                .ok_or_else(|| AppError::unknown(EntityKind::User, "Unknown User"))?;
            builder.update(|e| e.owner_id.clone_from(&owner_id))?;

            if emote.owner_id == actor.id() && !privileged {
                if emote.claimants.contains(&owner_id) {
                    return Err(AppError::forbidden(
                        "Target user was already requested to claim ownership of this emote",
                    ));
                }
                if emote.claimants.0.len() >= validation::MAX_CLAIMANTS {
                    return Err(AppError::invalid(format!(
                        "Too Many Claimants ({})",
                        validation::MAX_CLAIMANTS
                    )));
                }

                let owner_name = if actor.user.display_name.is_empty() {
                    actor.user.username.clone()
                } else {
                    actor.user.display_name.clone()
                };
                let request = InboxMessage::localized(
                    "inbox.generic.emote_ownership_claim_request.subject",
                    "inbox.generic.emote_ownership_claim_request.content",
                )
                .placeholder("OWNER_DISPLAY_NAME", owner_name)
                .placeholder("EMOTE_VERSION_COUNT", versions.len().to_string())
                .placeholder("EMOTE_NAME", emote.name.as_str());
                self.messages
                    .send_inbox(actor, request, std::slice::from_ref(&owner_id), true)
                    .await?;

                // ownership moves once the target claims it
                builder.revert(emote::Column::OwnerId)?;
                builder.update(|e| e.claimants.0.push(owner_id))?;
            } else {
                if !privileged {
                    if owner_id != actor.id() {
                        return Err(AppError::forbidden(
                            "You are not permitted to change this emote's owner",
                        ));
                    }
                    if !emote.claimants.contains(&owner_id) {
                        return Err(AppError::forbidden(
                            "You are not allowed to claim ownership of this emote",
                        ));
                    }
                }

                builder.update(|e| e.claimants = StringList::default())?;
                log = log.change(AuditChange::single(
                    "owner_id",
                    emote.owner_id.as_str(),
                    owner_id.as_str(),
                ));
                fields.push(
                    ChangeField::new("owner_id", ChangeFieldType::String, owner_id.as_str())
                        .old(emote.owner_id.as_str()),
                );
            }
        }

        if let Some(tags) = edit.tags {
            let tags = validation::emote_tags(&tags)?;
            if tags != emote.tags.0 {
                log = log.change(AuditChange::single("tags", emote.tags.0.clone(), tags.clone()));
                fields.push(
                    ChangeField::new("tags", ChangeFieldType::Object, tags.clone())
                        .old(emote.tags.0.clone()),
                );
                builder.update(|e| e.tags = StringList(tags))?;
            }
        }

        if let Some(flags) = edit.flags.filter(|f| *f != emote.flags) {
            if !privileged {
                let touched = EmoteFlags(flags ^ emote.flags);
                for bit in [
                    emote_flag::CONTENT_SEXUAL,
                    emote_flag::CONTENT_EPILEPSY,
                    emote_flag::CONTENT_EDGY,
                    emote_flag::CONTENT_TWITCH_DISALLOWED,
                ] {
                    if touched.has(bit) {
                        return Err(AppError::forbidden(format!(
                            "Not allowed to modify flag {}",
                            emote_flag::name(bit)
                        )));
                    }
                }
            }

            log = log.change(AuditChange::single("flags", emote.flags, flags));
            fields.push(ChangeField::new("flags", ChangeFieldType::Number, flags).old(emote.flags));
            builder.update(|e| e.flags = flags)?;
        }

        let mut version_builders = Vec::new();
        for change in edit.versions {
            let Some(index) = versions.iter().position(|v| v.id == change.id) else {
                continue;
            };
            let old = &versions[index];
            let mut vb = Builder::new(old.clone());
            let mut o = Map::new();
            let mut n = Map::new();
            let mut local = Vec::new();

            if let Some(listed) = change.listed.filter(|l| *l != old.listed) {
                if !privileged {
                    return Err(AppError::forbidden(format!(
                        "Not allowed to modify listed state of version {index}"
                    )));
                }
                o.insert("listed".into(), old.listed.into());
                n.insert("listed".into(), listed.into());
                local.push(ChangeField::new("listed", ChangeFieldType::Bool, listed).old(old.listed));
                vb.update(|v| v.listed = listed)?;
            }

            if let Some(name) = change.name.filter(|s| !s.is_empty() && *s != old.name) {
                validation::emote_name(&name)?;
                o.insert("name".into(), old.name.as_str().into());
                n.insert("name".into(), name.as_str().into());
                local.push(
                    ChangeField::new("name", ChangeFieldType::String, name.as_str())
                        .old(old.name.as_str()),
                );
                vb.update(|v| v.name = name)?;
            }

            if let Some(description) = change
                .description
                .filter(|s| !s.is_empty() && *s != old.description)
            {
                validation::emote_description(&description)?;
                o.insert("description".into(), old.description.as_str().into());
                n.insert("description".into(), description.as_str().into());
                local.push(
                    ChangeField::new("description", ChangeFieldType::String, description.as_str())
                        .old(old.description.as_str()),
                );
                vb.update(|v| v.description = description)?;
            }

            if let Some(allow) = change
                .allow_personal
                .filter(|a| Some(*a) != old.allow_personal)
            {
                o.insert("allow_personal".into(), json!(old.allow_personal));
                n.insert("allow_personal".into(), allow.into());
                vb.update(|v| v.allow_personal = Some(allow))?;
            }

            if vb.is_changed() {
                log = log.change(
                    AuditChange::array("versions").updated(index, json!({ "o": o, "n": n })),
                );
                if !local.is_empty() {
                    fields.push(ChangeField::nested("versions", index, local));
                }
                version_builders.push(vb);
            }
        }

        let mut emote = emote;
        if let Some(am) = builder.finish::<emote::ActiveModel>()? {
            emote = self.emotes.update(am).await?;
        }
        let mut versions = versions;
        for mut vb in version_builders {
            if let Some(am) = vb.finish::<emote_version::ActiveModel>()? {
                let updated = self.emotes.update_version(am).await?;
                if let Some(slot) = versions.iter_mut().find(|v| v.id == updated.id) {
                    *slot = updated;
                }
            }
        }

        if !log.changes.is_empty() {
            self.audit.write(log).await;
        }
        if !fields.is_empty() {
            for version in &versions {
                let mut changes = ChangeMap::new(&version.id, ObjectKind::Emote, Some(&actor.user));
                changes.updated.clone_from(&fields);
                self.events.dispatch(
                    EventType::UpdateEmote,
                    changes,
                    EventCondition::object_id(&version.id),
                );
            }
            info!(emote_id = %emote.id, actor_id = %actor.id(), "edited emote");
        }

        Ok(EmoteDetails { emote, versions })
    }

    /// Delete an emote or one of its versions, or reinstate it with `undo`.
    pub async fn delete(&self, actor: &Actor, id: &str, opts: EmoteDelete) -> AppResult<()> {
        let _guard = self.locks.lock(&format!("emote:{id}")).await;

        let emote = self.emotes.get_by_id(id).await?;
        self.authorize(actor, &emote).await?;
        if opts.undo && !actor.has(permission::EDIT_ANY_EMOTE) {
            return Err(AppError::forbidden(
                "You cannot reinstate an emote after it has been deleted",
            ));
        }

        let versions = self.emotes.find_versions(id).await?;
        let (lifecycle, acl) = if opts.undo {
            (EmoteLifecycle::Live, Acl::PublicRead)
        } else {
            (EmoteLifecycle::Deleted, Acl::Private)
        };

        let targets: Vec<&emote_version::Model> = match opts.version_id.as_deref() {
            Some(version_id) => {
                let version = versions
                    .iter()
                    .find(|v| v.id == version_id)
                    .ok_or_else(|| {
                        AppError::unknown(EntityKind::Emote, "Specified version does not exist")
                    })?;
                self.emotes
                    .update_version(emote_version::ActiveModel {
                        id: Unchanged(version.id.clone()),
                        lifecycle: Set(lifecycle),
                        ..Default::default()
                    })
                    .await?;
                vec![version]
            }
            None => {
                self.emotes.set_lifecycle(id, lifecycle).await?;
                versions.iter().collect()
            }
        };

        for version in &targets {
            self.set_acl(version, acl).await;
        }

        let kind = if opts.undo {
            AuditLogKind::UndoDeleteEmote
        } else {
            AuditLogKind::DeleteEmote
        };
        self.audit
            .write(AuditEntry::new(kind, actor.id(), ObjectKind::Emote, id).reason(opts.reason))
            .await;

        for version in targets {
            let mut changes = ChangeMap::new(&version.id, ObjectKind::Emote, Some(&actor.user));
            changes.updated.push(
                ChangeField::new("lifecycle", ChangeFieldType::Number, lifecycle.code())
                    .old(version.lifecycle.code()),
            );
            self.events.dispatch(
                EventType::UpdateEmote,
                changes,
                EventCondition::object_id(&version.id),
            );
        }

        info!(emote_id = %id, actor_id = %actor.id(), undo = opts.undo, "deleted emote");
        Ok(())
    }

    /// Change the ACL of every file of a version concurrently. Failures are logged.
    async fn set_acl(&self, version: &emote_version::Model, acl: Acl) {
        let files: Vec<&ImageFile> = version
            .image_files
            .0
            .iter()
            .chain(version.archive_file.as_ref())
            .collect();

        let results = join_all(
            files
                .iter()
                .map(|f| self.storage.set_acl(&f.bucket, &f.key, acl)),
        )
        .await;

        for (file, result) in files.iter().zip(results) {
            if let Err(e) = result {
                error!(
                    error = %e,
                    version_id = %version.id,
                    bucket = %file.bucket,
                    key = %file.key,
                    acl = acl.as_str(),
                    "failed to set object acl"
                );
            }
        }
    }

    /// Replace `source` with `target` in every emote set, then delete `source`.
    ///
    /// Returns the number of emote sets rewritten.
    pub async fn merge(
        &self,
        actor: &Actor,
        source_id: &str,
        target_id: &str,
        reason: String,
    ) -> AppResult<u64> {
        if source_id == target_id {
            return Err(AppError::invalid("It's not possible to merge an emote into itself"));
        }

        let source = self.emotes.get_by_id(source_id).await?;
        self.authorize(actor, &source).await?;

        let versions = self.emotes.find_versions(source_id).await?;
        if !versions.is_empty()
            && versions
                .iter()
                .all(|v| v.lifecycle == EmoteLifecycle::Deleted)
        {
            info!(source_id, target_id, "emote is already deleted, skipping merge");
            return Ok(0);
        }

        self.emotes.get_by_id(target_id).await?;

        let rewritten = self.emote_sets.merge_emote(source_id, target_id).await?;

        if let Err(e) = self
            .delete(
                actor,
                source_id,
                EmoteDelete {
                    reason: reason.clone(),
                    ..Default::default()
                },
            )
            .await
        {
            error!(error = %e, source_id, target_id, "failed to delete the merged emote");
        }

        self.audit
            .write(
                AuditEntry::new(AuditLogKind::MergeEmote, actor.id(), ObjectKind::Emote, source_id)
                    .reason(reason)
                    .change(AuditChange::single("new_emote_id", "", target_id)),
            )
            .await;

        info!(source_id, target_id, sets = rewritten, "merged emote");
        Ok(rewritten)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::events::testing::{RecordingPublisher, recording};
    use crate::testing::{conn, empty, mock};
    use async_trait::async_trait;
    use bytes::Bytes;
    use sea_orm::{DatabaseConnection, MockDatabase, MockExecResult};
    use seventv_common::StoredObject;
    use seventv_db::{
        entities::{embedded::{EditorList, ImageFileList, UserEditor}, message},
        fixtures,
        repositories::{AuditLogRepository, MessageRepository},
    };
    use std::sync::Mutex;

    pub const OWNER_ID: &str = "60ae434d1aa1d1b2f8d4a5c7";
    pub const OTHER_ID: &str = "60ae434d1aa1d1b2f8d4a5c8";
    pub const EMOTE_ID: &str = "60ae434d1aa1d1b2f8d4a5e1";

    /// Object store that records writes and ACL changes.
    #[derive(Default)]
    pub struct AclRecorder {
        pub changes: Mutex<Vec<(String, Acl)>>,
        pub puts: Mutex<Vec<(String, String, Acl)>>,
        pub deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for AclRecorder {
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            body: Bytes,
            content_type: &str,
            acl: Acl,
            _cache_control: Option<&str>,
        ) -> AppResult<StoredObject> {
            self.puts
                .lock()
                .unwrap()
                .push((bucket.to_string(), key.to_string(), acl));
            Ok(StoredObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                size: body.len() as u64,
                content_type: content_type.to_string(),
                md5: String::new(),
            })
        }

        async fn delete(&self, _bucket: &str, key: &str) -> AppResult<()> {
            self.deletes.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn set_acl(&self, _bucket: &str, key: &str, acl: Acl) -> AppResult<()> {
            self.changes.lock().unwrap().push((key.to_string(), acl));
            Ok(())
        }

        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }
    }

    pub fn actor(id: &str, allowed: i64) -> Actor {
        Actor::new(
            fixtures::user(id, "actor"),
            vec![fixtures::role("r0", 0, allowed)],
            vec![],
        )
    }

    struct Harness {
        service: EmoteService,
        recorder: Arc<RecordingPublisher>,
        storage: Arc<AclRecorder>,
        audit: Arc<DatabaseConnection>,
    }

    fn harness(
        emotes: MockDatabase,
        users: MockDatabase,
        messages: (Arc<DatabaseConnection>, Arc<DatabaseConnection>),
        emote_sets: Arc<DatabaseConnection>,
    ) -> Harness {
        let (events, recorder) = recording();
        let storage = Arc::new(AclRecorder::default());
        let audit = empty();
        let message_service = MessageService::new(
            MessageRepository::new(messages.0),
            UserRepository::new(messages.1),
            EmoteRepository::new(empty()),
            EmoteSetRepository::new(empty()),
        );
        Harness {
            service: EmoteService::new(
                EmoteRepository::new(conn(emotes)),
                EmoteSetRepository::new(emote_sets),
                UserRepository::new(conn(users)),
                message_service,
                AuditLogger::new(AuditLogRepository::new(audit.clone())),
                events,
                storage.clone(),
                KeyedMutex::new(),
            ),
            recorder,
            storage,
            audit,
        }
    }

    fn no_messages() -> (Arc<DatabaseConnection>, Arc<DatabaseConnection>) {
        (empty(), empty())
    }

    fn version(id: &str) -> emote_version::Model {
        fixtures::emote_version(id, EMOTE_ID, EmoteLifecycle::Live)
    }

    #[tokio::test]
    async fn test_owner_transfer_queues_claimant() {
        let emote = fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID);
        let mut claimed = emote.clone();
        claimed.claimants = StringList(vec![OTHER_ID.to_string()]);

        let emotes = mock()
            .append_query_results([vec![emote.clone()]])
            .append_query_results([vec![version(EMOTE_ID)]])
            .append_query_results([vec![claimed]]);
        let users = mock().append_query_results([vec![fixtures::user(OTHER_ID, "target")]]);

        let inbox = message::Model {
            id: "msg".to_string(),
            kind: seventv_db::entities::enums::MessageKind::Inbox,
            author_id: Some(OWNER_ID.to_string()),
            anonymous: false,
            data: json!({}),
            created_at: chrono::Utc::now().into(),
        };
        let messages = conn(
            mock()
                .append_query_results([[inbox]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }]),
        );
        let recipients = conn(mock().append_query_results([[fixtures::user(OTHER_ID, "target")]]));

        let h = harness(emotes, users, (messages, recipients), empty());
        let details = h
            .service
            .edit(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteEdit {
                    owner_id: Some(OTHER_ID.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(details.emote.owner_id, OWNER_ID);
        assert_eq!(details.emote.claimants.0, vec![OTHER_ID.to_string()]);
        assert!(h.recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_claim_requires_pending_request() {
        let emote = fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID);
        let mut owner = fixtures::user(OWNER_ID, "owner");
        owner.editors = EditorList(vec![UserEditor {
            id: OTHER_ID.to_string(),
            permissions: editor_permission::MANAGE_OWNED_EMOTES,
            visible: true,
            added_at: chrono::Utc::now(),
        }]);

        let emotes = mock()
            .append_query_results([vec![emote]])
            .append_query_results([vec![version(EMOTE_ID)]]);
        let users = mock()
            .append_query_results([vec![owner]])
            .append_query_results([vec![fixtures::user(OTHER_ID, "claimant")]]);

        let h = harness(emotes, users, no_messages(), empty());
        let err = h
            .service
            .edit(
                &actor(OTHER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteEdit {
                    owner_id: Some(OTHER_ID.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not allowed to claim ownership"));
    }

    #[tokio::test]
    async fn test_strangers_cannot_edit() {
        let emotes = mock().append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]]);
        let users = mock().append_query_results([vec![fixtures::user(OWNER_ID, "owner")]]);

        let h = harness(emotes, users, no_messages(), empty());
        let err = h
            .service
            .edit(&actor(OTHER_ID, permission::DEFAULT), EMOTE_ID, EmoteEdit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientPrivilege(_)));
    }

    #[tokio::test]
    async fn test_content_flags_need_moderator() {
        let emotes = mock()
            .append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]])
            .append_query_results([vec![version(EMOTE_ID)]]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let err = h
            .service
            .edit(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteEdit {
                    flags: Some(emote_flag::CONTENT_EDGY),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Not allowed to modify flag EDGY"));
    }

    #[tokio::test]
    async fn test_listed_state_needs_moderator() {
        let emotes = mock()
            .append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]])
            .append_query_results([vec![version(EMOTE_ID)]]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let err = h
            .service
            .edit(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteEdit {
                    versions: vec![VersionEdit {
                        id: EMOTE_ID.to_string(),
                        listed: Some(false),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("listed state of version 0"));
    }

    #[tokio::test]
    async fn test_rename_dispatches_update() {
        let emote = fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID);
        let renamed = emote::Model {
            name: "PepeLaughing".to_string(),
            ..emote.clone()
        };
        let emotes = mock()
            .append_query_results([vec![emote]])
            .append_query_results([vec![version(EMOTE_ID)]])
            .append_query_results([vec![renamed]]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let details = h
            .service
            .edit(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteEdit {
                    name: Some("PepeLaughing".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(details.emote.name, "PepeLaughing");

        let messages = h.recorder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].d.event_type, EventType::UpdateEmote);
        let field = &messages[0].d.body.updated[0];
        assert_eq!(field.key, "name");
        assert_eq!(field.old_value, Some(json!("PepeLaugh")));
    }

    #[tokio::test]
    async fn test_bad_name_is_rejected() {
        let emotes = mock()
            .append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]])
            .append_query_results([vec![version(EMOTE_ID)]]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let err = h
            .service
            .edit(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteEdit {
                    name: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    fn version_with_files(lifecycle: EmoteLifecycle) -> emote_version::Model {
        let mut v = fixtures::emote_version(EMOTE_ID, EMOTE_ID, lifecycle);
        v.image_files = ImageFileList(vec![ImageFile {
            name: "1x.webp".to_string(),
            bucket: "public".to_string(),
            key: "emote/1/1x.webp".to_string(),
            content_type: "image/webp".to_string(),
            ..Default::default()
        }]);
        v.archive_file = Some(ImageFile {
            name: "archive.zip".to_string(),
            bucket: "public".to_string(),
            key: "emote/1/archive.zip".to_string(),
            content_type: "application/zip".to_string(),
            ..Default::default()
        });
        v
    }

    fn statement_count(db: Arc<DatabaseConnection>, table: &str) -> usize {
        let log = Arc::try_unwrap(db).ok().unwrap().into_transaction_log();
        log.iter()
            .filter(|t| format!("{t:?}").contains(table))
            .count()
    }

    #[tokio::test]
    async fn test_delete_hides_files() {
        let emotes = mock()
            .append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]])
            .append_query_results([vec![version_with_files(EmoteLifecycle::Live)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);

        let h = harness(emotes, mock(), no_messages(), empty());
        h.service
            .delete(&actor(OWNER_ID, permission::DEFAULT), EMOTE_ID, EmoteDelete::default())
            .await
            .unwrap();

        let changes = h.storage.changes.lock().unwrap().clone();
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|(_, acl)| *acl == Acl::Private));

        let events = h.recorder.messages();
        assert_eq!(events[0].d.body.updated[0].key, "lifecycle");
        assert_eq!(events[0].d.body.updated[0].value, json!(EmoteLifecycle::Deleted.code()));
    }

    #[tokio::test]
    async fn test_delete_then_undelete_restores_public_files() {
        let emote = fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID);
        let lifecycle_exec = || MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        };
        let emotes = mock()
            .append_query_results([vec![emote.clone()]])
            .append_query_results([vec![version_with_files(EmoteLifecycle::Live)]])
            .append_exec_results([lifecycle_exec()])
            .append_query_results([vec![emote]])
            .append_query_results([vec![version_with_files(EmoteLifecycle::Deleted)]])
            .append_exec_results([lifecycle_exec()]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let moderator = actor(OTHER_ID, permission::EDIT_ANY_EMOTE);
        h.service
            .delete(&moderator, EMOTE_ID, EmoteDelete::default())
            .await
            .unwrap();
        h.service
            .delete(
                &moderator,
                EMOTE_ID,
                EmoteDelete {
                    undo: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let changes = h.storage.changes.lock().unwrap().clone();
        assert_eq!(changes.len(), 4);
        assert!(changes[..2].iter().all(|(_, acl)| *acl == Acl::Private));
        assert!(changes[2..].iter().all(|(_, acl)| *acl == Acl::PublicRead));

        let events = h.recorder.messages();
        assert_eq!(events.len(), 2);
        let restored = &events[1].d.body.updated[0];
        assert_eq!(restored.value, json!(EmoteLifecycle::Live.code()));
        assert_eq!(restored.old_value, Some(json!(EmoteLifecycle::Deleted.code())));
    }

    #[tokio::test]
    async fn test_undelete_needs_moderator() {
        let emotes = mock().append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let err = h
            .service
            .delete(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteDelete {
                    undo: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot reinstate"));
    }

    #[tokio::test]
    async fn test_delete_unknown_version() {
        let emotes = mock()
            .append_query_results([vec![fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID)]])
            .append_query_results([vec![version(EMOTE_ID)]]);

        let h = harness(emotes, mock(), no_messages(), empty());
        let err = h
            .service
            .delete(
                &actor(OWNER_ID, permission::DEFAULT),
                EMOTE_ID,
                EmoteDelete {
                    version_id: Some("nope".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Specified version does not exist"));
    }

    #[tokio::test]
    async fn test_merge_into_itself() {
        let h = harness(mock(), mock(), no_messages(), empty());
        let err = h
            .service
            .merge(
                &actor(OWNER_ID, permission::EDIT_ANY_EMOTE),
                EMOTE_ID,
                EMOTE_ID,
                String::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("merge an emote into itself"));
    }

    #[tokio::test]
    async fn test_merge_rewrites_sets() {
        const TARGET_ID: &str = "60ae434d1aa1d1b2f8d4a5e2";
        let source = fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID);
        let target = fixtures::emote(TARGET_ID, "PepeLaugh", OTHER_ID);

        // source, versions, target, then the delete: source, versions, lifecycle
        let emotes = mock()
            .append_query_results([vec![source.clone()]])
            .append_query_results([vec![version(EMOTE_ID)]])
            .append_query_results([vec![target], vec![source]])
            .append_query_results([vec![version(EMOTE_ID)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);
        let sets = conn(mock().append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 2,
        }]));

        let h = harness(emotes, mock(), no_messages(), sets);
        let rewritten = h
            .service
            .merge(
                &actor(OWNER_ID, permission::EDIT_ANY_EMOTE),
                EMOTE_ID,
                TARGET_ID,
                "duplicate".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(rewritten, 2);
    }

    #[tokio::test]
    async fn test_repeated_merge_is_a_no_op() {
        const TARGET_ID: &str = "60ae434d1aa1d1b2f8d4a5e2";
        let source = fixtures::emote(EMOTE_ID, "PepeLaugh", OWNER_ID);
        let target = fixtures::emote(TARGET_ID, "PepeLaugh", OTHER_ID);

        // first merge as above, then the second stops at the deleted versions
        let emotes = mock()
            .append_query_results([vec![source.clone()]])
            .append_query_results([vec![version(EMOTE_ID)]])
            .append_query_results([vec![target], vec![source.clone()]])
            .append_query_results([vec![version(EMOTE_ID)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![source]])
            .append_query_results([vec![fixtures::emote_version(
                EMOTE_ID,
                EMOTE_ID,
                EmoteLifecycle::Deleted,
            )]]);
        let sets = conn(mock().append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 2,
        }]));

        let h = harness(emotes, mock(), no_messages(), sets);
        let moderator = actor(OWNER_ID, permission::EDIT_ANY_EMOTE);
        let first = h
            .service
            .merge(&moderator, EMOTE_ID, TARGET_ID, "duplicate".to_string())
            .await
            .unwrap();
        let events_after_first = h.recorder.messages().len();

        let second = h
            .service
            .merge(&moderator, EMOTE_ID, TARGET_ID, "duplicate".to_string())
            .await
            .unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert_eq!(h.recorder.messages().len(), events_after_first);

        let Harness { service, audit, .. } = h;
        drop(service);
        // delete + merge entries from the first call only
        assert_eq!(statement_count(audit, "audit_log"), 2);
    }
}
