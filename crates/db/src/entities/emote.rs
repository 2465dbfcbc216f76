//! Emote entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::embedded::StringList;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "emote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    pub owner_id: String,

    /// Unique lowercase tags.
    #[sea_orm(column_type = "JsonBinary")]
    pub tags: StringList,

    /// Emote flag bits.
    pub flags: i32,

    /// Users queued to receive ownership.
    #[sea_orm(column_type = "JsonBinary")]
    pub claimants: StringList,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::emote_version::Entity")]
    Versions,
}

impl Related<super::emote_version::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Versions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
