//! Create role table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Role::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Role::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(Role::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Role::Position).integer().not_null().default(0))
                    .col(ColumnDef::new(Role::Color).integer().not_null().default(0))
                    .col(ColumnDef::new(Role::Allowed).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Role::Denied).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Role::IsDefault).boolean().not_null().default(false))
                    .col(ColumnDef::new(Role::Invisible).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Role::CreatedAt)
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
                    .name("idx_role_position")
                    .table(Role::Table)
                    .col(Role::Position)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Role::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Role {
    Table,
    Id,
    Name,
    Position,
    Color,
    Allowed,
    Denied,
    IsDefault,
    Invisible,
    CreatedAt,
}
