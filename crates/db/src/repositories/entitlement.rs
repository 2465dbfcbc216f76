//! Entitlement repository.

use std::sync::Arc;

use crate::entities::{Entitlement, entitlement, enums::Platform};
use seventv_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, sea_query::Expr,
};

/// Entitlement repository.
#[derive(Clone)]
pub struct EntitlementRepository {
    db: Arc<DatabaseConnection>,
}

impl EntitlementRepository {
    /// Create a new entitlement repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Enabled entitlements of a user, highest priority first.
    pub async fn find_by_user(&self, user_id: &str) -> AppResult<Vec<entitlement::Model>> {
        Entitlement::find()
            .filter(entitlement::Column::UserId.eq(user_id))
            .filter(entitlement::Column::Disabled.eq(false))
            .order_by_desc(entitlement::Column::Priority)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Assign every unassigned entitlement claimed for `(platform, id)` to a user.
    pub async fn assign_claims(
        &self,
        platform: Platform,
        claim_id: &str,
        user_id: &str,
    ) -> AppResult<u64> {
        Entitlement::update_many()
            .col_expr(entitlement::Column::UserId, Expr::value(user_id))
            .col_expr(
                entitlement::Column::ClaimPlatform,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                entitlement::Column::ClaimId,
                Expr::value(Option::<String>::None),
            )
            .filter(entitlement::Column::UserId.is_null())
            .filter(entitlement::Column::ClaimPlatform.eq(platform))
            .filter(entitlement::Column::ClaimId.eq(claim_id))
            .exec(self.db.as_ref())
            .await
            .map(|r| r.rows_affected)
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
