//! Entitlement entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{EntitlementKind, Platform};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "entitlement")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub kind: EntitlementKind,

    /// Assigned user, unset while the entitlement is only claimed.
    #[sea_orm(nullable)]
    pub user_id: Option<String>,

    #[sea_orm(nullable)]
    pub claim_platform: Option<Platform>,

    #[sea_orm(nullable)]
    pub claim_id: Option<String>,

    /// Kind-tagged reference and selection state.
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,

    /// Role requirements.
    #[sea_orm(column_type = "JsonBinary")]
    pub condition: Json,

    pub priority: i32,

    pub disabled: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
