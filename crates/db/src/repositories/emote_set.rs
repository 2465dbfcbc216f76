//! Emote set repository.

use std::sync::Arc;

use crate::entities::{EmoteSet, emote_set};
use seventv_common::{AppError, AppResult, EntityKind};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, sea_query::Expr,
};
use serde_json::json;

/// Rewrites the `id` of every active emote equal to `$1` into `$2`, keeping order.
const REWRITE_ACTIVE_EMOTE_ID: &str = "(SELECT jsonb_agg(CASE WHEN t.e->>'id' = $1 \
     THEN jsonb_set(t.e, '{id}', to_jsonb($2::text)) ELSE t.e END ORDER BY t.ord) \
     FROM jsonb_array_elements(\"emote_set\".\"emotes\") WITH ORDINALITY AS t(e, ord))";

/// Emote set repository.
#[derive(Clone)]
pub struct EmoteSetRepository {
    db: Arc<DatabaseConnection>,
}

impl EmoteSetRepository {
    /// Create a new emote set repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an emote set by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<emote_set::Model>> {
        EmoteSet::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an emote set by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<emote_set::Model> {
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::unknown(EntityKind::EmoteSet, format!("emote set {id} not found"))
        })
    }

    /// Find emote sets by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<emote_set::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        EmoteSet::find()
            .filter(emote_set::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Sets owned by a user, oldest first.
    pub async fn find_by_owner(&self, owner_id: &str) -> AppResult<Vec<emote_set::Model>> {
        EmoteSet::find()
            .filter(emote_set::Column::OwnerId.eq(owner_id))
            .order_by_asc(emote_set::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Number of sets owned by a user.
    pub async fn count_by_owner(&self, owner_id: &str) -> AppResult<u64> {
        EmoteSet::find()
            .filter(emote_set::Column::OwnerId.eq(owner_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create an emote set.
    pub async fn create(&self, model: emote_set::ActiveModel) -> AppResult<emote_set::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update an emote set, returning the row after the write.
    pub async fn update(&self, model: emote_set::ActiveModel) -> AppResult<emote_set::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete an emote set.
    pub async fn delete(&self, id: &str) -> AppResult<u64> {
        EmoteSet::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Delete every set owned by a user.
    pub async fn delete_by_owner(&self, owner_id: &str) -> AppResult<u64> {
        EmoteSet::delete_many()
            .filter(emote_set::Column::OwnerId.eq(owner_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Point every active emote referencing `source` at `target`.
    ///
    /// Sets that already contain `target` are left unchanged so that active
    /// ids stay unique. Running it again once `source` is gone matches no rows.
    pub async fn merge_emote(&self, source: &str, target: &str) -> AppResult<u64> {
        EmoteSet::update_many()
            .col_expr(
                emote_set::Column::Emotes,
                Expr::cust_with_values(REWRITE_ACTIVE_EMOTE_ID, [source, target]),
            )
            .filter(Expr::cust_with_values(
                "\"emote_set\".\"emotes\" @> $1",
                [json!([{ "id": source }])],
            ))
            .filter(Expr::cust_with_values(
                "NOT (\"emote_set\".\"emotes\" @> $1)",
                [json!([{ "id": target }])],
            ))
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
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_merge_emote_reports_rewritten_sets() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = EmoteSetRepository::new(db);
        let rewritten = repo
            .merge_emote("60ae434d1aa1d1b2f8d4a5c1", "60ae434d1aa1d1b2f8d4a5c2")
            .await
            .unwrap();

        assert_eq!(rewritten, 1);
    }

    #[tokio::test]
    async fn test_count_by_owner() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(10)),
                }]])
                .into_connection(),
        );

        let repo = EmoteSetRepository::new(db);
        assert_eq!(repo.count_by_owner("60ae434d1aa1d1b2f8d4a5c7").await.unwrap(), 10);
    }
}
