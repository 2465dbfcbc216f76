//! User presence repository.

use std::sync::Arc;

use crate::entities::{UserPresence, user_presence};
use chrono::Utc;
use seventv_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, sea_query::Expr,
};

/// User presence repository.
#[derive(Clone)]
pub struct UserPresenceRepository {
    db: Arc<DatabaseConnection>,
}

impl UserPresenceRepository {
    /// Create a new presence repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an unexpired channel presence of a user in a given channel.
    pub async fn find_channel(
        &self,
        user_id: &str,
        platform: &str,
        channel_id: &str,
    ) -> AppResult<Option<user_presence::Model>> {
        UserPresence::find()
            .filter(user_presence::Column::UserId.eq(user_id))
            .filter(user_presence::Column::Kind.eq("CHANNEL"))
            .filter(user_presence::Column::ExpiresAt.gt(Utc::now()))
            .filter(Expr::cust_with_values(
                "\"user_presence\".\"data\" @> $1",
                [serde_json::json!({ "platform": platform, "id": channel_id })],
            ))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a presence.
    pub async fn create(
        &self,
        model: user_presence::ActiveModel,
    ) -> AppResult<user_presence::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a presence, returning the row after the write.
    pub async fn update(
        &self,
        model: user_presence::ActiveModel,
    ) -> AppResult<user_presence::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete every presence of a user.
    pub async fn delete_by_user(&self, user_id: &str) -> AppResult<u64> {
        UserPresence::delete_many()
            .filter(user_presence::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
