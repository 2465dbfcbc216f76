//! Create emote set table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmoteSet::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EmoteSet::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(EmoteSet::Name).string_len(100).not_null())
                    .col(ColumnDef::new(EmoteSet::OwnerId).string_len(24))
                    .col(ColumnDef::new(EmoteSet::Privileged).boolean().not_null().default(false))
                    .col(ColumnDef::new(EmoteSet::Capacity).integer().not_null().default(0))
                    .col(ColumnDef::new(EmoteSet::Flags).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(EmoteSet::Tags)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(EmoteSet::Emotes)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(EmoteSet::Origins)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(EmoteSet::CreatedAt)
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
                    .name("idx_emote_set_owner_id")
                    .table(EmoteSet::Table)
                    .col(EmoteSet::OwnerId)
                    .to_owned(),
            )
            .await?;

        // Containment queries on active emotes (`emotes @> ...`) during merges.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_emote_set_emotes ON emote_set USING GIN (emotes jsonb_path_ops)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(EmoteSet::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum EmoteSet {
    Table,
    Id,
    Name,
    OwnerId,
    Privileged,
    Capacity,
    Flags,
    Tags,
    Emotes,
    Origins,
    CreatedAt,
}
