//! Change events.
//!
//! Mutations describe what they changed as a [`ChangeMap`] and hand it to an
//! [`EventPublisher`]. Publishing never blocks the mutation path: the
//! publisher only enqueues, and failures are logged by [`Events`].

#![allow(missing_docs)]

use std::{collections::BTreeMap, sync::Arc};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use seventv_common::AppResult;
use seventv_db::entities::{enums::ObjectKind, user};
use tracing::warn;

/// Kind of a dispatched change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "emote.create")]
    CreateEmote,
    #[serde(rename = "emote.update")]
    UpdateEmote,
    #[serde(rename = "emote.delete")]
    DeleteEmote,
    #[serde(rename = "emote_set.create")]
    CreateEmoteSet,
    #[serde(rename = "emote_set.update")]
    UpdateEmoteSet,
    #[serde(rename = "emote_set.delete")]
    DeleteEmoteSet,
    #[serde(rename = "user.create")]
    CreateUser,
    #[serde(rename = "user.update")]
    UpdateUser,
    #[serde(rename = "user.delete")]
    DeleteUser,
}

impl EventType {
    /// Dotted wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateEmote => "emote.create",
            Self::UpdateEmote => "emote.update",
            Self::DeleteEmote => "emote.delete",
            Self::CreateEmoteSet => "emote_set.create",
            Self::UpdateEmoteSet => "emote_set.update",
            Self::DeleteEmoteSet => "emote_set.delete",
            Self::CreateUser => "user.create",
            Self::UpdateUser => "user.update",
            Self::DeleteUser => "user.delete",
        }
    }
}

/// Value type carried by a [`ChangeField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFieldType {
    String,
    Number,
    Bool,
    Object,
}

/// A single changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeField {
    pub key: String,
    pub index: Option<i32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nested: bool,
    #[serde(rename = "type")]
    pub kind: ChangeFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    pub value: Value,
}

impl ChangeField {
    pub fn new(key: impl Into<String>, kind: ChangeFieldType, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            index: None,
            nested: false,
            kind,
            old_value: None,
            value: value.into(),
        }
    }

    /// A field whose value is a list of nested changes, e.g. one version of an emote.
    pub fn nested(key: impl Into<String>, index: usize, fields: Vec<Self>) -> Self {
        Self {
            key: key.into(),
            index: Some(index as i32),
            nested: true,
            kind: ChangeFieldType::Object,
            old_value: None,
            value: serde_json::to_value(fields).unwrap_or(Value::Null),
        }
    }

    #[must_use]
    pub fn old(mut self, value: impl Into<Value>) -> Self {
        self.old_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index as i32);
        self
    }
}

/// Public identity attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventActor {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub user_type: String,
    pub username: String,
    pub display_name: String,
}

impl EventActor {
    /// Placeholder used when no actor is known.
    #[must_use]
    pub fn system() -> Self {
        Self {
            id: seventv_common::ObjectId::NIL.to_hex(),
            user_type: "SYSTEM".to_string(),
            username: "*system".to_string(),
            display_name: "System".to_string(),
        }
    }
}

impl From<&user::Model> for EventActor {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            user_type: user.user_type.clone(),
            username: user.username.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

/// Description of the changes made to one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMap {
    pub id: String,
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub contextual: bool,
    pub actor: EventActor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pushed: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pulled: Vec<ChangeField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

impl ChangeMap {
    pub fn new(id: impl Into<String>, kind: ObjectKind, actor: Option<&user::Model>) -> Self {
        Self {
            id: id.into(),
            kind,
            contextual: false,
            actor: actor.map_or_else(EventActor::system, EventActor::from),
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            pushed: Vec::new(),
            pulled: Vec::new(),
            object: None,
        }
    }

    /// Whether the map carries no change at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.pushed.is_empty()
            && self.pulled.is_empty()
            && self.object.is_none()
    }
}

/// Key/value filter a subscriber must match to receive a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCondition(pub BTreeMap<String, String>);

impl EventCondition {
    /// Condition on the object id.
    pub fn object_id(id: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("object_id".to_string(), id.into());
        Self(map)
    }

    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether every pair of `other` is present in `self`.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        other.0.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }

    /// Hex SHA-256 over the key/value pairs in key order.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (k, v) in &self.0 {
            hasher.update(k.as_bytes());
            hasher.update(v.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Payload of a dispatch message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub body: ChangeMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<u32>,
    #[serde(rename = "condition", default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<EventCondition>,
}

/// Envelope of a dispatch as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    /// Opcode, always `0` for dispatches.
    pub op: u8,
    /// Creation time in unix milliseconds.
    pub t: i64,
    pub d: DispatchPayload,
}

impl DispatchMessage {
    pub fn new(event_type: EventType, body: ChangeMap, conditions: Vec<EventCondition>) -> Self {
        let hash = body.object.as_ref().map(|object| {
            let mut hasher = Sha256::new();
            hasher.update(body.id.as_bytes());
            hasher.update(body.kind.as_str().as_bytes());
            hasher.update(object.to_string().as_bytes());
            let digest = hasher.finalize();
            u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
        });

        Self {
            op: 0,
            t: Utc::now().timestamp_millis(),
            d: DispatchPayload {
                event_type,
                body,
                hash,
                conditions,
            },
        }
    }

    /// Per-type channel suffix, e.g. `type.emote_set.update.<digest>`.
    #[must_use]
    pub fn type_keys(&self) -> Vec<String> {
        let base = format!("type.{}", self.d.event_type.as_str());
        if self.d.conditions.is_empty() {
            return vec![base];
        }
        self.d
            .conditions
            .iter()
            .map(|c| format!("{base}.{}", c.digest()))
            .collect()
    }
}

/// Sink for dispatches.
///
/// Implementations must not block; they queue the message and deliver it
/// from their own task.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, message: DispatchMessage) -> AppResult<()>;
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl EventPublisher for NoOpEventPublisher {
    fn publish(&self, _message: DispatchMessage) -> AppResult<()> {
        Ok(())
    }
}

/// Fire-and-forget front of an [`EventPublisher`].
#[derive(Clone)]
pub struct Events {
    publisher: Arc<dyn EventPublisher>,
}

impl Events {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Events that go nowhere.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoOpEventPublisher))
    }

    /// Dispatch a change. Empty change maps are skipped and failures are logged.
    pub fn dispatch(&self, event_type: EventType, body: ChangeMap, condition: EventCondition) {
        if body.is_empty() {
            return;
        }

        let id = body.id.clone();
        if let Err(e) = self
            .publisher
            .publish(DispatchMessage::new(event_type, body, vec![condition]))
        {
            warn!(error = %e, event = event_type.as_str(), object_id = %id, "failed to publish event");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Publisher that keeps every dispatch in memory.
    #[derive(Default)]
    pub struct RecordingPublisher {
        messages: Mutex<Vec<DispatchMessage>>,
    }

    impl RecordingPublisher {
        pub fn messages(&self) -> Vec<DispatchMessage> {
            self.messages
                .lock()
                .map(|m| m.clone())
                .unwrap_or_default()
        }
    }

    impl EventPublisher for RecordingPublisher {
        fn publish(&self, message: DispatchMessage) -> AppResult<()> {
            if let Ok(mut messages) = self.messages.lock() {
                messages.push(message);
            }
            Ok(())
        }
    }

    /// Events backed by a fresh recorder.
    pub fn recording() -> (Events, Arc<RecordingPublisher>) {
        let recorder = Arc::new(RecordingPublisher::default());
        (Events::new(recorder.clone()), recorder)
    }
}
