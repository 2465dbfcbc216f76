//! Create emote and emote version tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Emote::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Emote::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(Emote::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Emote::OwnerId).string_len(24).not_null())
                    .col(
                        ColumnDef::new(Emote::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(Emote::Flags).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(Emote::Claimants)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Emote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_emote_owner_id")
                    .table(Emote::Table)
                    .col(Emote::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EmoteVersion::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmoteVersion::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(EmoteVersion::EmoteId).string_len(24).not_null())
                    .col(ColumnDef::new(EmoteVersion::Name).string_len(100).not_null())
                    .col(ColumnDef::new(EmoteVersion::Description).text().not_null().default(""))
                    .col(ColumnDef::new(EmoteVersion::Animated).boolean().not_null().default(false))
                    .col(ColumnDef::new(EmoteVersion::FrameCount).integer().not_null().default(1))
                    .col(ColumnDef::new(EmoteVersion::Lifecycle).small_integer().not_null().default(0))
                    .col(ColumnDef::new(EmoteVersion::Listed).boolean().not_null().default(false))
                    .col(ColumnDef::new(EmoteVersion::AllowPersonal).boolean())
                    .col(ColumnDef::new(EmoteVersion::Error).text())
                    .col(ColumnDef::new(EmoteVersion::InputFile).json_binary())
                    .col(
                        ColumnDef::new(EmoteVersion::ImageFiles)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(EmoteVersion::ArchiveFile).json_binary())
                    .col(ColumnDef::new(EmoteVersion::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(EmoteVersion::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(EmoteVersion::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_emote_version_emote")
                            .from(EmoteVersion::Table, EmoteVersion::EmoteId)
                            .to(Emote::Table, Emote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_emote_version_emote_id_created_at")
                    .table(EmoteVersion::Table)
                    .col(EmoteVersion::EmoteId)
                    .col(EmoteVersion::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmoteVersion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Emote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Emote {
    Table,
    Id,
    Name,
    OwnerId,
    Tags,
    Flags,
    Claimants,
    CreatedAt,
}

#[derive(Iden)]
enum EmoteVersion {
    Table,
    Id,
    EmoteId,
    Name,
    Description,
    Animated,
    FrameCount,
    Lifecycle,
    Listed,
    AllowPersonal,
    Error,
    InputFile,
    ImageFiles,
    ArchiveFile,
    StartedAt,
    CompletedAt,
    CreatedAt,
}
