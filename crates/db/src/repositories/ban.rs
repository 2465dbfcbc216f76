//! Ban repository.

use std::sync::Arc;

use crate::entities::{Ban, ban};
use chrono::Utc;
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

/// Ban repository.
#[derive(Clone)]
pub struct BanRepository {
    db: Arc<DatabaseConnection>,
}

impl BanRepository {
    /// Create a new ban repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a ban by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<ban::Model> {
        Ban::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::unknown(EntityKind::Ban, format!("ban {id} not found")))
    }

    /// Unexpired bans of a user, latest expiry first.
    pub async fn find_active(&self, victim_id: &str) -> AppResult<Vec<ban::Model>> {
        Ban::find()
            .filter(ban::Column::VictimId.eq(victim_id))
            .filter(ban::Column::ExpireAt.gt(Utc::now()))
            .order_by_desc(ban::Column::ExpireAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a ban.
    pub async fn create(&self, model: ban::ActiveModel) -> AppResult<ban::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a ban, returning the row after the write.
    pub async fn update(&self, model: ban::ActiveModel) -> AppResult<ban::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
