//! Role repository.

use std::sync::Arc;

use crate::entities::{Role, role};
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};

/// Role repository.
#[derive(Clone)]
pub struct RoleRepository {
    db: Arc<DatabaseConnection>,
}

impl RoleRepository {
    /// Create a new role repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All roles, highest position first.
    pub async fn find_all(&self) -> AppResult<Vec<role::Model>> {
        Role::find()
            .order_by_desc(role::Column::Position)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a role by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<role::Model> {
        Role::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::unknown(EntityKind::Role, format!("role {id} not found")))
    }

    /// Roles granted to a user: the listed ones plus every default role,
    /// highest position first.
    pub async fn find_effective(&self, ids: &[String]) -> AppResult<Vec<role::Model>> {
        let mut condition = Condition::any().add(role::Column::IsDefault.eq(true));
        if !ids.is_empty() {
            condition = condition.add(role::Column::Id.is_in(ids.to_vec()));
        }

        Role::find()
            .filter(condition)
            .order_by_desc(role::Column::Position)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a role.
    pub async fn create(&self, model: role::ActiveModel) -> AppResult<role::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a role, returning the row after the write.
    pub async fn update(&self, model: role::ActiveModel) -> AppResult<role::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete a role.
    pub async fn delete(&self, id: &str) -> AppResult<u64> {
        Role::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
