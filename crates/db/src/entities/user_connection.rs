//! User connection entity.
//!
//! The composite key `(platform, id)` makes a platform account linkable to at
//! most one user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::embedded::ConnectionGrant;
use super::enums::Platform;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_connection")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub platform: Platform,

    /// Platform-local account id.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub user_id: String,

    /// Platform username, lowercase.
    pub username: String,

    pub display_name: String,

    pub linked_at: DateTimeWithTimeZone,

    /// Emote set bound to this connection.
    #[sea_orm(nullable)]
    pub emote_set_id: Option<String>,

    /// Capacity granted by this platform.
    pub emote_slots: i32,

    /// Opaque platform payload.
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub grant: Option<ConnectionGrant>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
