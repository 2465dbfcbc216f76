//! System singleton repository.

use std::sync::Arc;

use crate::entities::{System, system};
use seventv_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait};

/// Access to the `system` row.
#[derive(Clone)]
pub struct SystemRepository {
    db: Arc<DatabaseConnection>,
}

impl SystemRepository {
    /// Create a new system repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Load the system row.
    pub async fn get(&self) -> AppResult<system::Model> {
        System::find_by_id(system::SYSTEM_ID)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::Internal("system row is missing".to_string()))
    }

    /// Update the system row.
    pub async fn update(&self, model: system::ActiveModel) -> AppResult<system::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_get_system() {
        let row = system::Model {
            id: system::SYSTEM_ID.to_string(),
            emote_set_id: Some("60ae434d1aa1d1b2f8d4a5c1".to_string()),
            config: serde_json::json!({ "extension": { "version": "3.0.0" } }),
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );

        let repo = SystemRepository::new(db);
        let system = repo.get().await.unwrap();

        assert_eq!(system.emote_set_id.as_deref(), Some("60ae434d1aa1d1b2f8d4a5c1"));
    }

    #[tokio::test]
    async fn test_missing_system_row_is_internal_error() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<system::Model>::new()])
                .into_connection(),
        );

        let repo = SystemRepository::new(db);
        assert!(matches!(repo.get().await, Err(AppError::Internal(_))));
    }
}
