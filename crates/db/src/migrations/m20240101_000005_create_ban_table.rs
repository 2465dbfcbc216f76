//! Create ban table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ban::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Ban::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(Ban::VictimId).string_len(24).not_null())
                    .col(ColumnDef::new(Ban::ActorId).string_len(24).not_null())
                    .col(ColumnDef::new(Ban::Reason).text().not_null().default(""))
                    .col(ColumnDef::new(Ban::Effects).integer().not_null().default(0))
                    .col(ColumnDef::new(Ban::ExpireAt).timestamp_with_time_zone().not_null())
                    .col(
                        ColumnDef::new(Ban::CreatedAt)
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
                    .name("idx_ban_victim_id_expire_at")
                    .table(Ban::Table)
                    .col(Ban::VictimId)
                    .col(Ban::ExpireAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Ban::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Ban {
    Table,
    Id,
    VictimId,
    ActorId,
    Reason,
    Effects,
    ExpireAt,
    CreatedAt,
}
