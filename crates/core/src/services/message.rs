//! Inbox messages, mod requests and read states.

use std::collections::BTreeMap;

use chrono::Utc;
use seventv_common::{AppError, AppResult, IdGenerator, permissions::permission};
use seventv_db::{
    entities::{
        enums::{MessageKind, ObjectKind},
        message, message_read,
    },
    repositories::{EmoteRepository, EmoteSetRepository, MessageRepository, UserRepository},
};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::actor::Actor;

/// Payload of an inbox message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub pinned: bool,
    /// Whether `subject` and `content` are translation keys.
    #[serde(default)]
    pub locale: bool,
    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,
}

impl InboxMessage {
    /// A localized message whose subject and content are translation keys.
    pub fn localized(subject: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            content: content.into(),
            locale: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn important(mut self) -> Self {
        self.important = true;
        self
    }
}

/// Payload of a mod request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModRequest {
    pub target_kind: ObjectKind,
    pub target_id: String,
    #[serde(default)]
    pub wish: String,
    #[serde(default)]
    pub actor_country_code: String,
}

/// Typed payload of a message, keyed by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    Inbox(InboxMessage),
    ModRequest(ModRequest),
    Other(MessageKind, Value),
}

impl MessageData {
    /// Decode the payload of a stored message.
    pub fn from_model(model: &message::Model) -> AppResult<Self> {
        Ok(match model.kind {
            MessageKind::Inbox => Self::Inbox(serde_json::from_value(model.data.clone())?),
            MessageKind::ModRequest => Self::ModRequest(serde_json::from_value(model.data.clone())?),
            kind => Self::Other(kind, model.data.clone()),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Inbox(_) => MessageKind::Inbox,
            Self::ModRequest(_) => MessageKind::ModRequest,
            Self::Other(kind, _) => *kind,
        }
    }

    fn to_value(&self) -> AppResult<Value> {
        Ok(match self {
            Self::Inbox(d) => serde_json::to_value(d)?,
            Self::ModRequest(d) => serde_json::to_value(d)?,
            Self::Other(_, v) => v.clone(),
        })
    }
}

/// A per-entry failure of [`MessageService::set_read_states`].
#[derive(Debug, Clone, Serialize)]
pub struct ReadStateError {
    pub message_id: String,
    pub message_state_id: String,
    pub msg_kind: MessageKind,
    pub error: String,
}

/// Outcome of a read-state batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadStateResponse {
    pub changed: u64,
    pub errors: Vec<ReadStateError>,
}

/// Sends messages and tracks who read them.
#[derive(Clone)]
pub struct MessageService {
    messages: MessageRepository,
    users: UserRepository,
    emotes: EmoteRepository,
    emote_sets: EmoteSetRepository,
    id_gen: IdGenerator,
}

impl MessageService {
    #[must_use]
    pub fn new(
        messages: MessageRepository,
        users: UserRepository,
        emotes: EmoteRepository,
        emote_sets: EmoteSetRepository,
    ) -> Self {
        Self {
            messages,
            users,
            emotes,
            emote_sets,
            id_gen: IdGenerator::new(),
        }
    }

    /// Send an inbox message to users.
    ///
    /// With `consider_blocked`, recipients that blocked the actor are skipped
    /// unless the actor bypasses privacy.
    pub async fn send_inbox(
        &self,
        actor: &Actor,
        data: InboxMessage,
        recipients: &[String],
        consider_blocked: bool,
    ) -> AppResult<message::Model> {
        if !actor.has(permission::SEND_MESSAGES) {
            return Err(AppError::forbidden("You are not allowed to send messages")
                .with_field("MISSING_PERMISSION", "SEND_MESSAGES"));
        }

        let exclude = (consider_blocked && !actor.has(permission::BYPASS_PRIVACY)).then(|| actor.id());
        let recipients = self.users.find_recipients(recipients, exclude).await?;

        let now = Utc::now();
        let message_id = self.id_gen.generate();
        let reads = recipients
            .iter()
            .map(|u| message_read::ActiveModel {
                id: Set(self.id_gen.generate()),
                message_id: Set(message_id.clone()),
                kind: Set(MessageKind::Inbox),
                recipient_id: Set(Some(u.id.clone())),
                read: Set(false),
                read_at: Set(None),
                weight: Set(0),
                created_at: Set(now.into()),
            })
            .collect();

        let message = self
            .messages
            .create(
                self.message_model(&message_id, Some(actor.id()), &MessageData::Inbox(data))?,
                reads,
            )
            .await?;

        debug!(message_id = %message.id, recipients = recipients.len(), "Sent inbox message");
        Ok(message)
    }

    /// Queue a mod request on an existing target.
    pub async fn send_mod_request(
        &self,
        author_id: Option<&str>,
        request: ModRequest,
        weight: i32,
    ) -> AppResult<message::Model> {
        let exists = match request.target_kind {
            ObjectKind::Emote => self.emotes.find_version(&request.target_id).await?.is_some(),
            ObjectKind::EmoteSet => self
                .emote_sets
                .find_by_id(&request.target_id)
                .await?
                .is_some(),
            ObjectKind::User => self.users.find_by_id(&request.target_id).await?.is_some(),
            _ => self.messages.get_by_id(&request.target_id).await.is_ok(),
        };
        if !exists {
            return Err(AppError::invalid("Target item doesn't exist"));
        }

        let message_id = self.id_gen.generate();
        let read = message_read::ActiveModel {
            id: Set(self.id_gen.generate()),
            message_id: Set(message_id.clone()),
            kind: Set(MessageKind::ModRequest),
            recipient_id: Set(None),
            read: Set(false),
            read_at: Set(None),
            weight: Set(weight),
            created_at: Set(Utc::now().into()),
        };

        self.messages
            .create(
                self.message_model(&message_id, author_id, &MessageData::ModRequest(request))?,
                vec![read],
            )
            .await
    }

    /// Mark the read states of a message as read or unread.
    ///
    /// Entries the actor may not touch are reported in the response instead of
    /// failing the batch.
    pub async fn set_read_states(
        &self,
        actor: &Actor,
        message_id: &str,
        read: bool,
    ) -> AppResult<ReadStateResponse> {
        let message = self.messages.get_by_id(message_id).await?;
        let data = MessageData::from_model(&message)?;
        let states = self.messages.find_read_states(&[message.id.clone()]).await?;

        let mut response = ReadStateResponse::default();
        for state in states {
            if state.recipient_id.as_deref() != Some(actor.id()) {
                if let Err(e) = check_read_permission(actor, &data) {
                    response.errors.push(ReadStateError {
                        message_id: state.message_id.clone(),
                        message_state_id: state.id.clone(),
                        msg_kind: state.kind,
                        error: e.public_message(),
                    });
                    continue;
                }
            }
            if state.read == read {
                continue;
            }

            self.messages
                .update_read_state(message_read::ActiveModel {
                    id: Set(state.id.clone()),
                    read: Set(read),
                    read_at: Set(read.then(|| Utc::now().into())),
                    ..Default::default()
                })
                .await?;
            response.changed += 1;
        }

        Ok(response)
    }

    fn message_model(
        &self,
        id: &str,
        author_id: Option<&str>,
        data: &MessageData,
    ) -> AppResult<message::ActiveModel> {
        Ok(message::ActiveModel {
            id: Set(id.to_string()),
            kind: Set(data.kind()),
            author_id: Set(author_id.map(str::to_string)),
            anonymous: Set(false),
            data: Set(data.to_value()?),
            created_at: Set(Utc::now().into()),
        })
    }
}

fn check_read_permission(actor: &Actor, data: &MessageData) -> AppResult<()> {
    let required = match data {
        MessageData::ModRequest(req) => match req.target_kind {
            ObjectKind::Emote => permission::EDIT_ANY_EMOTE,
            ObjectKind::EmoteSet => permission::EDIT_ANY_EMOTE_SET,
            ObjectKind::Report => permission::MANAGE_REPORTS,
            _ => permission::MANAGE_USERS,
        },
        MessageData::Inbox(_) => permission::MANAGE_USERS,
        MessageData::Other(..) => permission::MANAGE_NEWS,
    };

    if actor.has(required) {
        Ok(())
    } else {
        Err(AppError::forbidden("Insufficient Privilege"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{conn, mock};
    use seventv_db::{entities::enums::EmoteLifecycle, fixtures};
    use sea_orm::{DatabaseConnection, MockExecResult};
    use serde_json::json;
    use std::sync::Arc;

    const ACTOR_ID: &str = "60ae434d1aa1d1b2f8d4a5c7";

    fn actor(allowed: i64) -> Actor {
        Actor::new(
            fixtures::user(ACTOR_ID, "actor"),
            vec![fixtures::role("r0", 0, allowed)],
            vec![],
        )
    }

    fn service(
        messages: Arc<DatabaseConnection>,
        users: Arc<DatabaseConnection>,
        emotes: Arc<DatabaseConnection>,
    ) -> MessageService {
        MessageService::new(
            MessageRepository::new(messages),
            UserRepository::new(users),
            EmoteRepository::new(emotes),
            EmoteSetRepository::new(conn(mock())),
        )
    }

    fn stored(kind: MessageKind, data: Value) -> message::Model {
        message::Model {
            id: "msg".to_string(),
            kind,
            author_id: Some(ACTOR_ID.to_string()),
            anonymous: false,
            data,
            created_at: Utc::now().into(),
        }
    }

    fn read_state(id: &str, kind: MessageKind, recipient: Option<&str>) -> message_read::Model {
        message_read::Model {
            id: id.to_string(),
            message_id: "msg".to_string(),
            kind,
            recipient_id: recipient.map(str::to_string),
            read: false,
            read_at: None,
            weight: 0,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn test_inbox_payload_shape() {
        let data = InboxMessage::localized("inbox.subject", "inbox.content")
            .placeholder("EMOTE_NAME", "PagMan")
            .important();

        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({
                "subject": "inbox.subject",
                "content": "inbox.content",
                "important": true,
                "starred": false,
                "pinned": false,
                "locale": true,
                "placeholders": { "EMOTE_NAME": "PagMan" },
            })
        );
    }

    #[tokio::test]
    async fn test_send_inbox_requires_permission() {
        let service = service(conn(mock()), conn(mock()), conn(mock()));
        let err = service
            .send_inbox(&actor(0), InboxMessage::default(), &["x".to_string()], true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientPrivilege(_)));
    }

    #[tokio::test]
    async fn test_send_inbox_writes_read_state_per_recipient() {
        let recipient = fixtures::user("60ae434d1aa1d1b2f8d4a5c8", "recipient");
        let message = stored(MessageKind::Inbox, json!({}));

        let messages = conn(
            mock()
                .append_query_results([[message.clone()]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }]),
        );
        let users = conn(mock().append_query_results([[recipient.clone()]]));
        let service = service(messages, users, conn(mock()));

        let sent = service
            .send_inbox(
                &actor(permission::SEND_MESSAGES),
                InboxMessage::localized("s", "c"),
                &[recipient.id.clone()],
                true,
            )
            .await
            .unwrap();
        assert_eq!(sent.id, "msg");
    }

    #[tokio::test]
    async fn test_mod_request_target_must_exist() {
        let emotes = conn(mock().append_query_results([Vec::<
            seventv_db::entities::emote_version::Model,
        >::new()]));
        let service = service(conn(mock()), conn(mock()), emotes);

        let err = service
            .send_mod_request(
                None,
                ModRequest {
                    target_kind: ObjectKind::Emote,
                    target_id: "missing".to_string(),
                    wish: "list".to_string(),
                    actor_country_code: String::new(),
                },
                0,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Target item doesn't exist"));
    }

    #[tokio::test]
    async fn test_mod_request_for_version() {
        let version = fixtures::emote_version("v1", "e1", EmoteLifecycle::Live);
        let emotes = conn(mock().append_query_results([[version]]));
        let message = stored(
            MessageKind::ModRequest,
            json!({ "target_kind": "Emote", "target_id": "v1", "wish": "list" }),
        );
        let messages = conn(
            mock()
                .append_query_results([[message]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }]),
        );
        let service = service(messages, conn(mock()), emotes);

        let created = service
            .send_mod_request(
                None,
                ModRequest {
                    target_kind: ObjectKind::Emote,
                    target_id: "v1".to_string(),
                    wish: "list".to_string(),
                    actor_country_code: String::new(),
                },
                0,
            )
            .await
            .unwrap();
        assert_eq!(created.kind, MessageKind::ModRequest);
    }

    #[tokio::test]
    async fn test_read_states_collect_errors() {
        let message = stored(
            MessageKind::ModRequest,
            json!({ "target_kind": "Emote", "target_id": "v1" }),
        );
        let messages = conn(
            mock()
                .append_query_results([[message]])
                .append_query_results([[read_state("rs1", MessageKind::ModRequest, None)]]),
        );
        let service = service(messages, conn(mock()), conn(mock()));

        let response = service
            .set_read_states(&actor(permission::DEFAULT), "msg", true)
            .await
            .unwrap();

        assert_eq!(response.changed, 0);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].message_state_id, "rs1");
        assert_eq!(response.errors[0].msg_kind, MessageKind::ModRequest);
    }

    #[tokio::test]
    async fn test_recipient_marks_own_inbox_read() {
        let message = stored(MessageKind::Inbox, json!({ "subject": "s", "content": "c" }));
        let state = read_state("rs1", MessageKind::Inbox, Some(ACTOR_ID));
        let updated = message_read::Model {
            read: true,
            ..state.clone()
        };
        let messages = conn(
            mock()
                .append_query_results([[message]])
                .append_query_results([[state]])
                .append_query_results([[updated]]),
        );
        let service = service(messages, conn(mock()), conn(mock()));

        let response = service
            .set_read_states(&actor(permission::DEFAULT), "msg", true)
            .await
            .unwrap();
        assert_eq!(response.changed, 1);
        assert!(response.errors.is_empty());
    }
}
