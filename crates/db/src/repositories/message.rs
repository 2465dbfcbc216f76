//! Message and read state repository.

use std::sync::Arc;

use crate::entities::{Message, MessageRead, message, message_read};
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};

/// Message repository.
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a message by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<message::Model> {
        Message::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| {
                AppError::unknown(EntityKind::Message, format!("message {id} not found"))
            })
    }

    /// Insert a message and its read states in one transaction.
    pub async fn create(
        &self,
        message: message::ActiveModel,
        reads: Vec<message_read::ActiveModel>,
    ) -> AppResult<message::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let message = message
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !reads.is_empty() {
            MessageRead::insert_many(reads)
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(message)
    }

    /// Read states of the given messages.
    pub async fn find_read_states(
        &self,
        message_ids: &[String],
    ) -> AppResult<Vec<message_read::Model>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        MessageRead::find()
            .filter(message_read::Column::MessageId.is_in(message_ids.to_vec()))
            .order_by_desc(message_read::Column::Weight)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a read state, returning the row after the write.
    pub async fn update_read_state(
        &self,
        model: message_read::ActiveModel,
    ) -> AppResult<message_read::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete every message authored by a user. Read states cascade.
    pub async fn delete_by_author(&self, author_id: &str) -> AppResult<u64> {
        Message::delete_many()
            .filter(message::Column::AuthorId.eq(author_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete every read state addressed to a user.
    pub async fn delete_reads_by_recipient(&self, recipient_id: &str) -> AppResult<u64> {
        MessageRead::delete_many()
            .filter(message_read::Column::RecipientId.eq(recipient_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
