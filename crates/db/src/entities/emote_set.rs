//! Emote set entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::embedded::{ActiveEmoteList, OriginList, StringList};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "emote_set")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,

    #[sea_orm(nullable)]
    pub owner_id: Option<String>,

    /// Only super administrators may modify privileged sets.
    pub privileged: bool,

    /// Maximum number of native active emotes.
    pub capacity: i32,

    /// Emote set flag bits.
    pub flags: i32,

    #[sea_orm(column_type = "JsonBinary")]
    pub tags: StringList,

    /// Native entries first, then entries contributed by origins.
    #[sea_orm(column_type = "JsonBinary")]
    pub emotes: ActiveEmoteList,

    #[sea_orm(column_type = "JsonBinary")]
    pub origins: OriginList,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
