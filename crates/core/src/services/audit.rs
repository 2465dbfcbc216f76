//! Audit log writer.

use chrono::Utc;
use seventv_common::{AppResult, IdGenerator};
use seventv_db::{
    entities::{
        audit_log,
        enums::{AuditLogKind, ObjectKind},
    },
    repositories::AuditLogRepository,
};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// An element of an array change, with its position in the array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayChangeItem {
    pub position: usize,
    pub value: Value,
}

/// Change of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditChangeValue {
    /// Before and after.
    Single { o: Value, n: Value },
    /// Positional edits of an array field.
    Array {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        added: Vec<ArrayChangeItem>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        updated: Vec<ArrayChangeItem>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed: Vec<ArrayChangeItem>,
    },
}

/// One entry of an audit log's change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChange {
    pub key: String,
    /// `1` for a single value change, `2` for an array change.
    pub format: u8,
    pub value: AuditChangeValue,
}

impl AuditChange {
    /// A before/after change of `key`.
    pub fn single(key: impl Into<String>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            format: 1,
            value: AuditChangeValue::Single {
                o: old.into(),
                n: new.into(),
            },
        }
    }

    /// An empty array change of `key`.
    pub fn array(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            format: 2,
            value: AuditChangeValue::Array {
                added: Vec::new(),
                updated: Vec::new(),
                removed: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn added(mut self, position: usize, value: impl Into<Value>) -> Self {
        if let AuditChangeValue::Array { added, .. } = &mut self.value {
            added.push(ArrayChangeItem {
                position,
                value: value.into(),
            });
        }
        self
    }

    #[must_use]
    pub fn updated(mut self, position: usize, value: impl Into<Value>) -> Self {
        if let AuditChangeValue::Array { updated, .. } = &mut self.value {
            updated.push(ArrayChangeItem {
                position,
                value: value.into(),
            });
        }
        self
    }

    #[must_use]
    pub fn removed(mut self, position: usize, value: impl Into<Value>) -> Self {
        if let AuditChangeValue::Array { removed, .. } = &mut self.value {
            removed.push(ArrayChangeItem {
                position,
                value: value.into(),
            });
        }
        self
    }

    /// Whether an array change carries no edit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.value {
            AuditChangeValue::Single { .. } => false,
            AuditChangeValue::Array {
                added,
                updated,
                removed,
            } => added.is_empty() && updated.is_empty() && removed.is_empty(),
        }
    }
}

/// A pending audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub kind: AuditLogKind,
    pub actor_id: String,
    pub target_kind: ObjectKind,
    pub target_id: String,
    pub reason: String,
    pub changes: Vec<AuditChange>,
}

impl AuditEntry {
    pub fn new(
        kind: AuditLogKind,
        actor_id: impl Into<String>,
        target_kind: ObjectKind,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            actor_id: actor_id.into(),
            target_kind,
            target_id: target_id.into(),
            reason: String::new(),
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn change(mut self, change: AuditChange) -> Self {
        if !change.is_empty() {
            self.changes.push(change);
        }
        self
    }

    #[must_use]
    pub fn changes(mut self, changes: impl IntoIterator<Item = AuditChange>) -> Self {
        self.changes
            .extend(changes.into_iter().filter(|c| !c.is_empty()));
        self
    }
}

/// Writes audit logs. A failed write never fails the mutation that caused it.
#[derive(Clone)]
pub struct AuditLogger {
    repo: AuditLogRepository,
    id_gen: IdGenerator,
}

impl AuditLogger {
    #[must_use]
    pub fn new(repo: AuditLogRepository) -> Self {
        Self {
            repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Insert an entry, returning whether it was stored.
    pub async fn write(&self, entry: AuditEntry) -> bool {
        match self.try_write(entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to write audit log");
                false
            }
        }
    }

    async fn try_write(&self, entry: AuditEntry) -> AppResult<()> {
        let model = audit_log::ActiveModel {
            id: Set(self.id_gen.generate()),
            kind: Set(entry.kind),
            actor_id: Set(entry.actor_id),
            target_kind: Set(entry.target_kind),
            target_id: Set(entry.target_id),
            reason: Set(entry.reason),
            changes: Set(serde_json::to_value(&entry.changes)?),
            created_at: Set(Utc::now().into()),
        };
        self.repo.create(model).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_single_change_shape() {
        let change = AuditChange::single("name", "PepeLaugh", "PepeLaughing");
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({ "key": "name", "format": 1, "value": { "o": "PepeLaugh", "n": "PepeLaughing" } })
        );
    }

    #[test]
    fn test_array_change_shape() {
        let change = AuditChange::array("emotes")
            .added(3, json!({ "id": "a", "name": "KEKW" }))
            .removed(0, json!({ "id": "b", "name": "OMEGALUL" }));

        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({
                "key": "emotes",
                "format": 2,
                "value": {
                    "added": [{ "position": 3, "value": { "id": "a", "name": "KEKW" } }],
                    "removed": [{ "position": 0, "value": { "id": "b", "name": "OMEGALUL" } }],
                }
            })
        );
    }

    #[test]
    fn test_empty_array_changes_are_dropped() {
        let entry = AuditEntry::new(AuditLogKind::UpdateEmoteSet, "actor", ObjectKind::EmoteSet, "set")
            .change(AuditChange::array("emotes"));
        assert!(entry.changes.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let logger = AuditLogger::new(AuditLogRepository::new(db));

        let stored = logger
            .write(AuditEntry::new(AuditLogKind::BanUser, "actor", ObjectKind::User, "victim"))
            .await;
        assert!(!stored);
    }

    #[tokio::test]
    async fn test_write_inserts_row() {
        let row = audit_log::Model {
            id: "60ae434d1aa1d1b2f8d4a5c7".to_string(),
            kind: AuditLogKind::BanUser,
            actor_id: "actor".to_string(),
            target_kind: ObjectKind::User,
            target_id: "victim".to_string(),
            reason: "spam".to_string(),
            changes: json!([]),
            created_at: Utc::now().into(),
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );
        let logger = AuditLogger::new(AuditLogRepository::new(db));

        let stored = logger
            .write(
                AuditEntry::new(AuditLogKind::BanUser, "actor", ObjectKind::User, "victim")
                    .reason("spam"),
            )
            .await;
        assert!(stored);
    }
}
