//! Emote and profile picture ingestion.
//!
//! Uploads are validated, stored raw in the internal bucket and handed to the
//! image processor as a job. The processor answers on a results queue; the
//! handlers here fold each result back into the emote version or the user's
//! avatar.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sea_orm::{Set, Unchanged};
use seventv_common::{
    Acl, AppError, AppResult, Config, EntityKind, IdGenerator, ObjectStore, compose_key,
    permissions::{editor_permission, emote_flag, permission},
    storage::IMMUTABLE_CACHE_CONTROL,
};
use seventv_db::{
    entities::{
        embedded::{ImageFile, ImageFileList, StringList, UserAvatar},
        emote, emote_version,
        enums::{AuditLogKind, EmoteLifecycle, ObjectKind},
        user,
    },
    repositories::{EmoteRepository, UserRepository},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::{
    actor::Actor,
    assets::{AssetCleanupService, AssetRef},
    audit::{AuditEntry, AuditLogger},
    message::{MessageService, ModRequest},
};
use crate::{
    events::{ChangeField, ChangeFieldType, ChangeMap, EventCondition, EventType, Events},
    mq::{IncomingMessage, MessageQueue, OutgoingMessage, with_extension},
    probe::{MediaKind, MediaProbe},
    store::SharedStore,
    validation,
};

/// Output formats requested from the image processor.
pub mod task_flag {
    pub const AVIF: u32 = 1 << 0;
    pub const AVIF_STATIC: u32 = 1 << 1;
    pub const GIF: u32 = 1 << 2;
    pub const GIF_STATIC: u32 = 1 << 3;
    pub const WEBP: u32 = 1 << 4;
    pub const WEBP_STATIC: u32 = 1 << 5;
    pub const PNG: u32 = 1 << 6;
    pub const PNG_STATIC: u32 = 1 << 7;

    pub const ALL: u32 = AVIF | AVIF_STATIC | GIF | GIF_STATIC | WEBP | WEBP_STATIC | PNG | PNG_STATIC;
}

/// Emote output formats. GIF is only produced for animated input.
#[must_use]
pub const fn emote_task_flags(animated: bool) -> u32 {
    let base = task_flag::AVIF
        | task_flag::AVIF_STATIC
        | task_flag::WEBP
        | task_flag::WEBP_STATIC
        | task_flag::PNG
        | task_flag::PNG_STATIC;
    if animated {
        base | task_flag::GIF | task_flag::GIF_STATIC
    } else {
        base
    }
}

const EMOTE_SCALES: [u32; 3] = [1, 2, 3];
const PICTURE_MAX_FRAME_COUNT: i32 = 500;
const PICTURE_MIN_SIZE: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeRatio {
    Nothing,
    Stretch,
    PaddingCenter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInput {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub bucket: String,
    pub prefix: String,
    pub cache_control: String,
    #[serde(default)]
    pub exclude_file_extension: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLimits {
    /// Seconds.
    pub max_processing_time: u64,
    pub max_frame_count: i32,
    pub max_width: i32,
    pub max_height: i32,
}

/// A job for the image processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorTask {
    pub id: String,
    pub flags: u32,
    pub input: TaskInput,
    pub output: TaskOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smallest_max_width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smallest_max_height: Option<i32>,
    pub scales: Vec<u32>,
    pub resize_ratio: ResizeRatio,
    pub limits: TaskLimits,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    Success,
    Failed,
}

/// One file reported by the image processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultImage {
    pub name: String,
    pub format: String,
    pub content_type: String,
    pub width: i32,
    pub height: i32,
    pub frame_count: i32,
    pub size: i64,
    pub bucket: String,
    pub key: String,
}

impl From<&ResultImage> for ImageFile {
    fn from(image: &ResultImage) -> Self {
        Self {
            name: image.name.clone(),
            static_name: String::new(),
            format: image.format.clone(),
            content_type: image.content_type.clone(),
            width: image.width,
            height: image.height,
            frame_count: image.frame_count,
            size: image.size,
            bucket: image.bucket.clone(),
            key: image.key.clone(),
        }
    }
}

/// Answer of the image processor to a [`ProcessorTask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorResult {
    pub id: String,
    pub state: ResultState,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub image_input: ResultImage,
    #[serde(default)]
    pub image_outputs: Vec<ResultImage>,
    #[serde(default)]
    pub archive_output: Option<ResultImage>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Reprocessed {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    actor: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TaskMetadata {
    #[serde(default)]
    reprocessed: Reprocessed,
}

/// Decoded `X-Emote-Data` header.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmoteUpload {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub flags: i32,
    #[serde(default)]
    pub version: Option<VersionUpload>,
}

/// Uploading a new version of an existing emote.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionUpload {
    /// Id of a version of the parent emote.
    pub parent_id: String,
    /// Create a separate emote instead of appending a version.
    #[serde(default)]
    pub diverged: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedEmote {
    pub emote: emote::Model,
    pub version: emote_version::Model,
}

/// Buckets, queues and limits of the pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub internal_bucket: String,
    pub public_bucket: String,
    pub jobs_queue: String,
    pub results_queue: String,
    pub picture_results_queue: String,
    pub max_processing_time: Duration,
}

impl IngestSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            internal_bucket: config.s3.internal_bucket.clone(),
            public_bucket: config.s3.public_bucket.clone(),
            jobs_queue: config.message_queue.image_processor_jobs.clone(),
            results_queue: config.message_queue.image_processor_results.clone(),
            picture_results_queue: config.message_queue.image_processor_user_pictures_results.clone(),
            max_processing_time: Duration::from_secs(config.limits.max_processing_time_secs),
        }
    }
}

#[derive(Clone)]
pub struct IngestService {
    emotes: EmoteRepository,
    users: UserRepository,
    messages: MessageService,
    audit: AuditLogger,
    events: Events,
    storage: Arc<dyn ObjectStore>,
    mq: Arc<dyn MessageQueue>,
    store: Arc<dyn SharedStore>,
    probe: Arc<dyn MediaProbe>,
    cleanup: AssetCleanupService,
    settings: IngestSettings,
    id_gen: IdGenerator,
}

impl IngestService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        emotes: EmoteRepository,
        users: UserRepository,
        messages: MessageService,
        audit: AuditLogger,
        events: Events,
        storage: Arc<dyn ObjectStore>,
        mq: Arc<dyn MessageQueue>,
        store: Arc<dyn SharedStore>,
        probe: Arc<dyn MediaProbe>,
        cleanup: AssetCleanupService,
        settings: IngestSettings,
    ) -> Self {
        Self {
            emotes,
            users,
            messages,
            audit,
            events,
            storage,
            mq,
            store,
            probe,
            cleanup,
            settings,
            id_gen: IdGenerator::new(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    async fn authorize_parent(&self, actor: &Actor, parent: &emote::Model) -> AppResult<()> {
        if parent.owner_id == actor.id() || actor.has(permission::EDIT_ANY_EMOTE) {
            return Ok(());
        }
        match self.users.find_by_id(&parent.owner_id).await? {
            Some(owner) if actor.is_editor_of(&owner, editor_permission::MANAGE_OWNED_EMOTES) => Ok(()),
            _ => Err(AppError::forbidden("Insufficient Privilege")),
        }
    }

    /// Accept an emote upload and queue it for processing.
    pub async fn upload_emote(
        &self,
        actor: &Actor,
        data: EmoteUpload,
        body: Bytes,
    ) -> AppResult<UploadedEmote> {
        actor.require(permission::CREATE_EMOTE, "CREATE_EMOTE")?;
        validation::emote_name(&data.name)?;
        let tags = validation::emote_tags(&data.tags)?;
        let flags = data.flags & emote_flag::UPLOADABLE;

        let kind = MediaKind::detect(&body)
            .ok_or_else(|| AppError::invalid("Unsupported file type"))?;
        let metrics = self.probe.probe(kind, &body).await?;
        validation::image_metrics(metrics.width, metrics.height, metrics.frame_count)?;

        let version_id = self.id_gen.generate();
        let now = Utc::now();
        let input_key = |emote_id: &str| {
            compose_key(&[
                "emote",
                emote_id,
                &version_id,
                &format!("input.{}", kind.extension()),
            ])
        };

        let (version_name, description) = data
            .version
            .as_ref()
            .map(|v| (v.name.clone(), v.description.clone()))
            .unwrap_or_default();
        if !description.is_empty() {
            validation::emote_description(&description)?;
        }
        let new_version = |emote_id: &str, key: String| emote_version::ActiveModel {
            id: Set(version_id.clone()),
            emote_id: Set(emote_id.to_string()),
            name: Set(version_name.clone()),
            description: Set(description.clone()),
            animated: Set(metrics.frame_count > 1),
            frame_count: Set(metrics.frame_count),
            lifecycle: Set(EmoteLifecycle::Pending),
            listed: Set(false),
            allow_personal: Set(None),
            error: Set(None),
            input_file: Set(Some(ImageFile {
                name: format!("input.{}", kind.extension()),
                format: kind.extension().to_uppercase(),
                content_type: kind.content_type().to_string(),
                width: metrics.width,
                height: metrics.height,
                frame_count: metrics.frame_count,
                size: body.len() as i64,
                bucket: self.settings.internal_bucket.clone(),
                key,
                ..Default::default()
            })),
            image_files: Set(ImageFileList::default()),
            archive_file: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now.into()),
        };
        let new_emote = |id: &str, name: &str| emote::ActiveModel {
            id: Set(id.to_string()),
            name: Set(name.to_string()),
            owner_id: Set(actor.id().to_string()),
            tags: Set(StringList(tags.clone())),
            flags: Set(flags),
            claimants: Set(StringList::default()),
            created_at: Set(now.into()),
        };

        let (emote, version, created) = match &data.version {
            None => {
                // first version shares the emote id
                let (emote, version) = self
                    .emotes
                    .create(new_emote(&version_id, &data.name), new_version(&version_id, input_key(&version_id)))
                    .await?;
                (emote, version, true)
            }
            Some(upload) => {
                let parent_version = self
                    .emotes
                    .find_version(&upload.parent_id)
                    .await?
                    .ok_or_else(|| AppError::unknown(EntityKind::Emote, "Versioning Parent"))?;
                let parent = self.emotes.get_by_id(&parent_version.emote_id).await?;
                self.authorize_parent(actor, &parent).await?;

                if upload.diverged {
                    let (emote, version) = self
                        .emotes
                        .create(
                            new_emote(&version_id, &parent.name),
                            new_version(&version_id, input_key(&version_id)),
                        )
                        .await?;
                    (emote, version, true)
                } else {
                    let version = self
                        .emotes
                        .create_version(new_version(&parent.id, input_key(&parent.id)))
                        .await?;
                    (parent, version, false)
                }
            }
        };

        let key = input_key(&emote.id);
        if let Err(e) = self
            .storage
            .put(
                &self.settings.internal_bucket,
                &key,
                body,
                kind.content_type(),
                Acl::Private,
                None,
            )
            .await
        {
            error!(error = %e, emote_id = %emote.id, "failed to upload emote input");
            return Err(AppError::MissingInternalDependency(
                "Failed to establish connection with the CDN Service".to_string(),
            ));
        }

        let task = ProcessorTask {
            id: version.id.clone(),
            flags: emote_task_flags(metrics.frame_count > 1),
            input: TaskInput {
                bucket: self.settings.internal_bucket.clone(),
                key,
            },
            output: TaskOutput {
                bucket: self.settings.public_bucket.clone(),
                prefix: compose_key(&["emote", &version.id]),
                cache_control: IMMUTABLE_CACHE_CONTROL.to_string(),
                exclude_file_extension: false,
            },
            smallest_max_width: None,
            smallest_max_height: None,
            scales: EMOTE_SCALES.to_vec(),
            resize_ratio: ResizeRatio::PaddingCenter,
            limits: TaskLimits {
                max_processing_time: self.settings.max_processing_time.as_secs(),
                max_frame_count: validation::MAX_FRAME_COUNT,
                max_width: validation::MAX_WIDTH,
                max_height: validation::MAX_HEIGHT,
            },
            metadata: json!({ "reprocessed": { "done": false } }),
        };
        self.mq
            .publish(
                OutgoingMessage::json(&self.settings.jobs_queue, &task)?
                    .reply_to(&self.settings.results_queue),
            )
            .await?;

        self.audit
            .write(AuditEntry::new(
                AuditLogKind::CreateEmote,
                actor.id(),
                ObjectKind::Emote,
                &emote.id,
            ))
            .await;

        let mut changes = ChangeMap::new(&emote.id, ObjectKind::Emote, Some(&actor.user));
        if created {
            changes.object = Some(json!(emote));
            self.events
                .dispatch(EventType::CreateEmote, changes, EventCondition::object_id(&emote.id));
        } else {
            changes.pushed.push(
                ChangeField::new("versions", ChangeFieldType::Object, json!(version)).at(0),
            );
            self.events
                .dispatch(EventType::UpdateEmote, changes, EventCondition::object_id(&emote.id));
        }

        info!(
            emote_id = %emote.id,
            version_id = %version.id,
            actor_id = %actor.id(),
            frames = metrics.frame_count,
            "queued emote for processing"
        );
        Ok(UploadedEmote { emote, version })
    }

    /// Fold a processing result into its emote version.
    pub async fn handle_emote_result(&self, result: ProcessorResult) -> AppResult<emote_version::Model> {
        let current = self
            .emotes
            .find_version(&result.id)
            .await?
            .ok_or_else(|| AppError::unknown(EntityKind::Emote, "Unknown Emote Version"))?;
        let emote = self.emotes.get_by_id(&current.emote_id).await?;
        let index = self
            .emotes
            .find_versions(&emote.id)
            .await?
            .iter()
            .position(|v| v.id == current.id)
            .unwrap_or(0);

        let lifecycle = match result.state {
            ResultState::Success => EmoteLifecycle::Live,
            ResultState::Failed => EmoteLifecycle::Failed,
        };
        let error_message = (result.state == ResultState::Failed).then(|| result.message.clone());

        let previous_input = current.input_file.clone().unwrap_or_default();
        let pick = |new: &str, old: &str| if new.is_empty() { old.to_string() } else { new.to_string() };
        let input_file = ImageFile {
            name: pick(&result.image_input.name, &previous_input.name),
            bucket: pick(&result.image_input.bucket, &previous_input.bucket),
            key: pick(&result.image_input.key, &previous_input.key),
            ..ImageFile::from(&result.image_input)
        };
        let archive_file = result.archive_output.as_ref().map(|a| ImageFile {
            content_type: "application/zip".to_string(),
            ..ImageFile::from(a)
        });

        let version = self
            .emotes
            .update_version(emote_version::ActiveModel {
                id: Unchanged(current.id.clone()),
                animated: Set(result.image_input.frame_count > 1),
                lifecycle: Set(lifecycle),
                error: Set(error_message.clone()),
                started_at: Set(result.started_at.map(Into::into)),
                completed_at: Set(result.finished_at.map(Into::into)),
                input_file: Set(Some(input_file)),
                image_files: Set(ImageFileList(
                    result.image_outputs.iter().map(ImageFile::from).collect(),
                )),
                archive_file: Set(archive_file),
                ..Default::default()
            })
            .await?;

        if let Err(e) = self
            .store
            .publish(&format!("events:sub:emotes:{}", version.id), "1")
            .await
        {
            warn!(error = %e, version_id = %version.id, "failed to ping emote subscribers");
        }

        let metadata: TaskMetadata = serde_json::from_value(result.metadata.clone()).unwrap_or_default();
        if metadata.reprocessed.done {
            let actor_id = metadata.reprocessed.actor.unwrap_or_default();
            self.audit
                .write(AuditEntry::new(
                    AuditLogKind::ProcessEmote,
                    actor_id,
                    ObjectKind::Emote,
                    &version.id,
                ))
                .await;
            return Ok(version);
        }

        let lifecycle_field = || {
            ChangeField::new("lifecycle", ChangeFieldType::Number, lifecycle.code())
                .old(EmoteLifecycle::Processing.code())
        };
        let mut changes = ChangeMap::new(&emote.id, ObjectKind::Emote, None);
        changes.updated.push(lifecycle_field());
        changes
            .updated
            .push(ChangeField::nested("versions", index, vec![lifecycle_field()]));
        if let Some(message) = &error_message {
            changes.updated.push(ChangeField::nested(
                "versions",
                index,
                vec![ChangeField::new("error", ChangeFieldType::String, message.as_str())],
            ));
        }
        self.events
            .dispatch(EventType::UpdateEmote, changes, EventCondition::object_id(&emote.id));

        if lifecycle == EmoteLifecycle::Live {
            let request = ModRequest {
                target_kind: ObjectKind::Emote,
                target_id: version.id.clone(),
                wish: "list".to_string(),
                actor_country_code: String::new(),
            };
            if let Err(e) = self
                .messages
                .send_mod_request(Some(&emote.owner_id), request, 0)
                .await
            {
                error!(error = %e, version_id = %version.id, "failed to create mod request for new emote");
            }
        }

        info!(
            emote_id = %emote.id,
            version_id = %version.id,
            lifecycle = ?lifecycle,
            "processed emote"
        );
        Ok(version)
    }

    /// Handle one delivery of the emote results queue.
    pub async fn process_emote_delivery(&self, msg: &dyn IncomingMessage) {
        let Some(result) = decode_result(msg).await else {
            return;
        };
        let id = result.id.clone();
        let outcome = with_extension(msg, self.handle_emote_result(result)).await;
        settle(msg, &id, outcome.map(|_| ())).await;
    }

    /// Accept a new profile picture for `target_id` (or `@me`).
    pub async fn upload_avatar(&self, actor: &Actor, target_id: &str, body: Bytes) -> AppResult<String> {
        let victim = if target_id == "@me" || target_id == actor.id() {
            actor.user.clone()
        } else {
            self.users.get_by_id(target_id).await?
        };

        if victim.id != actor.id() && !actor.has(permission::MANAGE_USERS) {
            let denied = AppError::forbidden("You are not allowed to perform this action on this user");
            match victim.editors.get(actor.id()) {
                None => return Err(denied),
                Some(editor) if editor.permissions & editor_permission::MANAGE_PROFILE == 0 => {
                    return Err(denied.with_field("MISSING_EDITOR_PERMISSION", "MANAGE_PROFILE"));
                }
                Some(_) => {}
            }
        }

        let kind = MediaKind::detect(&body)
            .filter(|k| k.is_picture())
            .ok_or_else(|| AppError::invalid("Bad profile picture upload type"))?;

        let pending_id = self.id_gen.generate();
        let raw_key = compose_key(&[
            "pp",
            &victim.id,
            &format!("{pending_id}_raw.{}", kind.extension()),
        ]);
        if let Err(e) = self
            .storage
            .put(
                &self.settings.internal_bucket,
                &raw_key,
                body,
                kind.content_type(),
                Acl::Private,
                None,
            )
            .await
        {
            error!(error = %e, user_id = %victim.id, "failed to upload profile picture input");
            return Err(AppError::MissingInternalDependency(
                "Failed to establish connection with the CDN Service".to_string(),
            ));
        }

        let flags = if actor.has(permission::FEATURE_PROFILE_PICTURE_ANIMATION) {
            task_flag::WEBP | task_flag::WEBP_STATIC | task_flag::AVIF | task_flag::AVIF_STATIC
        } else {
            task_flag::WEBP_STATIC | task_flag::AVIF_STATIC
        };
        let task = ProcessorTask {
            id: pending_id.clone(),
            flags,
            input: TaskInput {
                bucket: self.settings.internal_bucket.clone(),
                key: raw_key,
            },
            output: TaskOutput {
                bucket: self.settings.public_bucket.clone(),
                prefix: compose_key(&["pp", &victim.id, &pending_id]),
                cache_control: IMMUTABLE_CACHE_CONTROL.to_string(),
                exclude_file_extension: true,
            },
            smallest_max_width: Some(PICTURE_MIN_SIZE),
            smallest_max_height: Some(PICTURE_MIN_SIZE),
            scales: vec![1],
            resize_ratio: ResizeRatio::PaddingCenter,
            limits: TaskLimits {
                max_processing_time: self.settings.max_processing_time.as_secs(),
                max_frame_count: PICTURE_MAX_FRAME_COUNT,
                max_width: validation::MAX_WIDTH,
                max_height: validation::MAX_HEIGHT,
            },
            metadata: json!({ "user_id": victim.id }),
        };
        self.mq
            .publish(
                OutgoingMessage::json(&self.settings.jobs_queue, &task)?
                    .reply_to(&self.settings.picture_results_queue),
            )
            .await?;

        let avatar = UserAvatar {
            pending_id: Some(pending_id.clone()),
            ..victim.avatar.clone().unwrap_or_default()
        };
        self.users
            .update(user::ActiveModel {
                id: Unchanged(victim.id.clone()),
                avatar: Set(Some(avatar)),
                ..Default::default()
            })
            .await?;

        info!(user_id = %victim.id, pending_id, "queued profile picture for processing");
        Ok(pending_id)
    }

    /// Commit or discard a processed profile picture.
    pub async fn handle_avatar_result(&self, result: ProcessorResult) -> AppResult<user::Model> {
        let user = self
            .users
            .find_by_pending_avatar(&result.id)
            .await?
            .ok_or_else(|| AppError::unknown(EntityKind::User, "No user awaits this profile picture"))?;
        let previous = user.avatar.clone().unwrap_or_default();

        if result.state == ResultState::Failed || result.image_outputs.is_empty() {
            warn!(user_id = %user.id, pending_id = %result.id, message = %result.message, "profile picture processing failed");
            return self
                .users
                .update(user::ActiveModel {
                    id: Unchanged(user.id.clone()),
                    avatar: Set(Some(UserAvatar {
                        pending_id: None,
                        ..previous
                    })),
                    ..Default::default()
                })
                .await;
        }

        let avatar = UserAvatar {
            id: Some(result.id.clone()),
            pending_id: None,
            input_file: Some(ImageFile::from(&result.image_input)),
            image_files: result.image_outputs.iter().map(ImageFile::from).collect(),
        };
        let updated = self
            .users
            .update(user::ActiveModel {
                id: Unchanged(user.id.clone()),
                avatar: Set(Some(avatar)),
                ..Default::default()
            })
            .await?;

        let stale: Vec<AssetRef> = previous
            .input_file
            .iter()
            .chain(previous.image_files.iter())
            .map(AssetRef::from)
            .collect();
        if !stale.is_empty() {
            if let Err(e) = self.cleanup.purge(stale).await {
                error!(error = %e, user_id = %user.id, "failed to schedule removal of previous profile picture");
            }
        }

        let mut changes = ChangeMap::new(&user.id, ObjectKind::User, None);
        changes.updated.push(
            ChangeField::new("avatar_id", ChangeFieldType::String, result.id.as_str())
                .old(json!(previous.id)),
        );
        self.events
            .dispatch(EventType::UpdateUser, changes, EventCondition::object_id(&user.id));

        info!(user_id = %user.id, avatar_id = %result.id, "committed profile picture");
        Ok(updated)
    }

    /// Handle one delivery of the profile picture results queue.
    pub async fn process_avatar_delivery(&self, msg: &dyn IncomingMessage) {
        let Some(result) = decode_result(msg).await else {
            return;
        };
        let id = result.id.clone();
        let outcome = with_extension(msg, self.handle_avatar_result(result)).await;
        settle(msg, &id, outcome.map(|_| ())).await;
    }
}

/// Decode a result envelope. Undecodable deliveries are dropped.
async fn decode_result(msg: &dyn IncomingMessage) -> Option<ProcessorResult> {
    match serde_json::from_slice::<ProcessorResult>(msg.body()) {
        Ok(result) => Some(result),
        Err(e) => {
            error!(error = %e, "bad message from results queue");
            if let Err(e) = msg.ack().await {
                error!(error = %e, "failed to drop bad message");
            }
            None
        }
    }
}

async fn settle(msg: &dyn IncomingMessage, id: &str, outcome: AppResult<()>) {
    match outcome {
        Ok(()) => {
            if let Err(e) = msg.ack().await {
                error!(error = %e, task_id = id, "failed to ack message");
            } else {
                debug!(task_id = id, "acked result");
            }
        }
        Err(e) => {
            error!(error = %e, task_id = id, "failed to handle result");
            if let Err(e) = msg.nack().await {
                error!(error = %e, task_id = id, "failed to nack message");
            }
        }
    }
}
