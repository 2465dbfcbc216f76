//! Emote and emote version repository.

use std::sync::Arc;

use crate::entities::{Emote, EmoteVersion, emote, emote_version, enums::EmoteLifecycle};
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
    sea_query::{Expr, Func},
};

/// Emote repository.
#[derive(Clone)]
pub struct EmoteRepository {
    db: Arc<DatabaseConnection>,
}

impl EmoteRepository {
    /// Create a new emote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an emote by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<emote::Model>> {
        Emote::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an emote by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<emote::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::unknown(EntityKind::Emote, format!("emote {id} not found")))
    }

    /// Find emotes by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<emote::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Emote::find()
            .filter(emote::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Search listed, live emotes by name.
    pub async fn search(
        &self,
        query: &str,
        page: u64,
        limit: u64,
    ) -> AppResult<(Vec<emote::Model>, u64)> {
        let mut select = Emote::find().filter(Expr::cust_with_values(
            "EXISTS (SELECT 1 FROM emote_version v WHERE v.emote_id = emote.id AND v.listed AND v.lifecycle = $1)",
            [EmoteLifecycle::Live.code()],
        ));
        if !query.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(emote::Column::Name)))
                    .like(format!("%{}%", query.to_lowercase())),
            );
        }

        let total = select
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let items = select
            .order_by_desc(emote::Column::CreatedAt)
            .offset(page.saturating_sub(1) * limit)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((items, total))
    }

    /// Insert an emote together with its first version.
    pub async fn create(
        &self,
        emote: emote::ActiveModel,
        version: emote_version::ActiveModel,
    ) -> AppResult<(emote::Model, emote_version::Model)> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let emote = emote
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let version = version
            .insert(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((emote, version))
    }

    /// Update an emote, returning the row after the write.
    pub async fn update(&self, model: emote::ActiveModel) -> AppResult<emote::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete an emote by id. Versions cascade.
    pub async fn delete(&self, id: &str) -> AppResult<u64> {
        Emote::delete_many()
            .filter(emote::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Versions of an emote, newest first.
    pub async fn find_versions(&self, emote_id: &str) -> AppResult<Vec<emote_version::Model>> {
        EmoteVersion::find()
            .filter(emote_version::Column::EmoteId.eq(emote_id))
            .order_by_desc(emote_version::Column::CreatedAt)
            .order_by_desc(emote_version::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a version by its id.
    pub async fn find_version(&self, id: &str) -> AppResult<Option<emote_version::Model>> {
        EmoteVersion::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a version.
    pub async fn create_version(
        &self,
        model: emote_version::ActiveModel,
    ) -> AppResult<emote_version::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update a version, returning the row after the write.
    pub async fn update_version(
        &self,
        model: emote_version::ActiveModel,
    ) -> AppResult<emote_version::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Set the lifecycle of every version of an emote.
    pub async fn set_lifecycle(&self, emote_id: &str, lifecycle: EmoteLifecycle) -> AppResult<u64> {
        EmoteVersion::update_many()
            .col_expr(emote_version::Column::Lifecycle, Expr::value(lifecycle.code()))
            .filter(emote_version::Column::EmoteId.eq(emote_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
