//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::embedded::{EditorList, StringList, UserAvatar};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Lowercase login name, derived from the primary connection.
    #[sea_orm(unique)]
    pub username: String,

    pub display_name: String,

    /// Empty for regular users, `BOT` or `SYSTEM` otherwise.
    #[sea_orm(default_value = "")]
    pub user_type: String,

    /// Assigned role ids. Default roles are implicit.
    #[sea_orm(column_type = "JsonBinary")]
    pub role_ids: StringList,

    #[sea_orm(column_type = "JsonBinary")]
    pub editors: EditorList,

    /// Users this user has blocked.
    #[sea_orm(column_type = "JsonBinary")]
    pub blocked_user_ids: StringList,

    /// Bumped to invalidate every outstanding session token.
    pub token_version: i32,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub avatar: Option<UserAvatar>,

    #[sea_orm(nullable)]
    pub last_login_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub last_visit_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub last_client_ip: Option<String>,

    #[sea_orm(nullable)]
    pub former_username: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_connection::Entity")]
    Connections,
}

impl Related<super::user_connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
