//! Emote version entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::embedded::{ImageFile, ImageFileList};
use super::enums::EmoteLifecycle;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "emote_version")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub emote_id: String,

    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub animated: bool,

    pub frame_count: i32,

    pub lifecycle: EmoteLifecycle,

    pub listed: bool,

    #[sea_orm(nullable)]
    pub allow_personal: Option<bool>,

    /// Processing error, set when the lifecycle is `Failed`.
    #[sea_orm(nullable)]
    pub error: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub input_file: Option<ImageFile>,

    #[sea_orm(column_type = "JsonBinary")]
    pub image_files: ImageFileList,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub archive_file: Option<ImageFile>,

    #[sea_orm(nullable)]
    pub started_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub completed_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::emote::Entity",
        from = "Column::EmoteId",
        to = "super::emote::Column::Id",
        on_delete = "Cascade"
    )]
    Emote,
}

impl Related<super::emote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Emote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
