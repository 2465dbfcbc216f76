//! Message entity (inbox, mod requests, news).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::MessageKind;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub kind: MessageKind,

    #[sea_orm(nullable)]
    pub author_id: Option<String>,

    pub anonymous: bool,

    /// Kind-tagged payload.
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::message_read::Entity")]
    Reads,
}

impl Related<super::message_read::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reads.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
