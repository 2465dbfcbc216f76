//! Role entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    /// Higher means more authority.
    pub position: i32,

    pub color: i32,

    /// Granted permission bits.
    pub allowed: i64,

    /// Revoked permission bits, applied after every grant.
    pub denied: i64,

    /// Default roles apply to every user implicitly.
    pub is_default: bool,

    pub invisible: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
