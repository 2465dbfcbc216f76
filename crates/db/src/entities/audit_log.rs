//! Audit log entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{AuditLogKind, ObjectKind};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub kind: AuditLogKind,

    pub actor_id: String,

    pub target_kind: ObjectKind,

    pub target_id: String,

    #[sea_orm(column_type = "Text")]
    pub reason: String,

    /// Per-field changes.
    #[sea_orm(column_type = "JsonBinary")]
    pub changes: Json,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
