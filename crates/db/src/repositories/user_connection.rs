//! User connection repository.

use std::sync::Arc;

use crate::entities::{UserConnection, enums::Platform, user_connection};
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::Expr,
};

/// Repository for platform connections.
#[derive(Clone)]
pub struct UserConnectionRepository {
    db: Arc<DatabaseConnection>,
}

impl UserConnectionRepository {
    /// Create a new connection repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a connection by its platform key.
    pub async fn find(
        &self,
        platform: Platform,
        id: &str,
    ) -> AppResult<Option<user_connection::Model>> {
        UserConnection::find_by_id((platform, id.to_string()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Connections of a user, oldest link first. The first one is the primary connection.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<user_connection::Model>> {
        UserConnection::find()
            .filter(user_connection::Column::UserId.eq(user_id))
            .order_by_asc(user_connection::Column::LinkedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a connection. Fails if `(platform, id)` is already linked.
    pub async fn create(
        &self,
        model: user_connection::ActiveModel,
    ) -> AppResult<user_connection::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a connection, returning the row after the write.
    pub async fn update(
        &self,
        model: user_connection::ActiveModel,
    ) -> AppResult<user_connection::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Move a connection to another user in a single statement.
    ///
    /// The row is never absent between detaching it from the donor and
    /// attaching it to the recipient.
    pub async fn reassign(
        &self,
        platform: Platform,
        id: &str,
        new_user_id: &str,
    ) -> AppResult<user_connection::Model> {
        let result = UserConnection::update_many()
            .col_expr(user_connection::Column::UserId, Expr::value(new_user_id))
            .filter(user_connection::Column::Platform.eq(platform))
            .filter(user_connection::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(AppError::unknown(
                EntityKind::Connection,
                format!("connection {id} not found"),
            ));
        }

        self.find(platform, id).await?.ok_or_else(|| {
            AppError::unknown(EntityKind::Connection, format!("connection {id} not found"))
        })
    }

    /// Unbind an emote set from every connection using it.
    pub async fn unset_emote_set(&self, set_id: &str) -> AppResult<u64> {
        UserConnection::update_many()
            .col_expr(
                user_connection::Column::EmoteSetId,
                Expr::value(Option::<String>::None),
            )
            .filter(user_connection::Column::EmoteSetId.eq(set_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn connection(user_id: &str) -> user_connection::Model {
        user_connection::Model {
            platform: Platform::Twitch,
            id: "22484632".to_string(),
            user_id: user_id.to_string(),
            username: "forsen".to_string(),
            display_name: "forsen".to_string(),
            linked_at: Utc::now().into(),
            emote_set_id: None,
            emote_slots: 600,
            data: serde_json::json!({}),
            grant: None,
        }
    }

    #[tokio::test]
    async fn test_reassign_returns_row_after() {
        let moved = connection("60ae434d1aa1d1b2f8d4a5c8");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .append_query_results([[moved.clone()]])
                .into_connection(),
        );

        let repo = UserConnectionRepository::new(db);
        let result = repo
            .reassign(Platform::Twitch, "22484632", "60ae434d1aa1d1b2f8d4a5c8")
            .await
            .unwrap();

        assert_eq!(result.user_id, "60ae434d1aa1d1b2f8d4a5c8");
    }

    #[tokio::test]
    async fn test_reassign_missing_connection() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = UserConnectionRepository::new(db);
        let result = repo
            .reassign(Platform::Twitch, "1", "60ae434d1aa1d1b2f8d4a5c8")
            .await;

        assert!(matches!(
            result,
            Err(AppError::UnknownEntity {
                kind: EntityKind::Connection,
                ..
            })
        ));
    }
}
