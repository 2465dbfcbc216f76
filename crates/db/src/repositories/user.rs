//! User repository.

use std::sync::Arc;

use crate::entities::{User, UserConnection, enums::Platform, user, user_connection};
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter,
    QuerySelect, RelationTrait, TransactionTrait, sea_query::Expr,
};
use serde_json::json;

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::unknown(EntityKind::User, format!("user {id} not found")))
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by lowercase username.
    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Username.eq(username.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the user owning the connection `(platform, id)`.
    pub async fn find_by_connection(
        &self,
        platform: Platform,
        id: &str,
    ) -> AppResult<Option<user::Model>> {
        User::find()
            .join(JoinType::InnerJoin, user::Relation::Connections.def())
            .filter(user_connection::Column::Platform.eq(platform))
            .filter(user_connection::Column::Id.eq(id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the user owning a connection, or the user with id `bind`.
    ///
    /// The connection owner wins when both exist.
    pub async fn find_for_login(
        &self,
        platform: Platform,
        id: &str,
        bind: Option<&str>,
    ) -> AppResult<Option<user::Model>> {
        if let Some(user) = self.find_by_connection(platform, id).await? {
            return Ok(Some(user));
        }

        match bind {
            Some(bind) if !bind.is_empty() => self.find_by_id(bind).await,
            _ => Ok(None),
        }
    }

    /// Find the user waiting on the avatar `pending_id`.
    pub async fn find_by_pending_avatar(&self, pending_id: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(Expr::cust_with_values(
                "\"user\".\"avatar\" ->> 'pending_id' = $1",
                [pending_id],
            ))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Resolve message recipients, optionally excluding users that blocked `actor_id`.
    pub async fn find_recipients(
        &self,
        ids: &[String],
        excluding_blockers_of: Option<&str>,
    ) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut query = User::find().filter(user::Column::Id.is_in(ids.to_vec()));
        if let Some(actor_id) = excluding_blockers_of {
            query = query.filter(Expr::cust_with_values(
                "NOT (\"user\".\"blocked_user_ids\" @> $1)",
                [json!([actor_id])],
            ));
        }

        query
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a new user together with its first connection in one transaction.
    pub async fn create_with_connection(
        &self,
        model: user::ActiveModel,
        connection: user_connection::ActiveModel,
    ) -> AppResult<(user::Model, user_connection::Model)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let user = model
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let connection = connection
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok((user, connection))
    }

    /// Update a user, returning the row after the write.
    pub async fn update(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a user. Connections cascade.
    pub async fn delete(&self, id: &str) -> AppResult<u64> {
        User::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove a role id from every user that holds it.
    pub async fn pull_role(&self, role_id: &str) -> AppResult<u64> {
        User::update_many()
            .col_expr(
                user::Column::RoleIds,
                Expr::cust_with_values("\"user\".\"role_ids\" - $1", [role_id]),
            )
            .filter(Expr::cust_with_values(
                "\"user\".\"role_ids\" @> $1",
                [json!([role_id])],
            ))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Remove `editor_id` from the editor list of every user.
    pub async fn pull_editor(&self, editor_id: &str) -> AppResult<u64> {
        User::update_many()
            .col_expr(
                user::Column::Editors,
                Expr::cust_with_values(
                    "COALESCE((SELECT jsonb_agg(e) FROM jsonb_array_elements(\"user\".\"editors\") e \
                     WHERE e->>'id' <> $1), '[]'::jsonb)",
                    [editor_id],
                ),
            )
            .filter(Expr::cust_with_values(
                "\"user\".\"editors\" @> $1",
                [json!([{ "id": editor_id }])],
            ))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count connections of a user.
    pub async fn connection_count(&self, user_id: &str) -> AppResult<u64> {
        use sea_orm::PaginatorTrait;

        UserConnection::find()
            .filter(user_connection::Column::UserId.eq(user_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
