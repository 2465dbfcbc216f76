//! Create entitlement table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Entitlement::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Entitlement::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(Entitlement::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Entitlement::UserId).string_len(24))
                    .col(ColumnDef::new(Entitlement::ClaimPlatform).string_len(16))
                    .col(ColumnDef::new(Entitlement::ClaimId).string_len(64))
                    .col(
                        ColumnDef::new(Entitlement::Data)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Entitlement::Condition)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(ColumnDef::new(Entitlement::Priority).integer().not_null().default(0))
                    .col(ColumnDef::new(Entitlement::Disabled).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Entitlement::CreatedAt)
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
                    .name("idx_entitlement_user_id")
                    .table(Entitlement::Table)
                    .col(Entitlement::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_entitlement_claim")
                    .table(Entitlement::Table)
                    .col(Entitlement::ClaimPlatform)
                    .col(Entitlement::ClaimId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Entitlement::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Entitlement {
    Table,
    Id,
    Kind,
    UserId,
    ClaimPlatform,
    ClaimId,
    Data,
    Condition,
    Priority,
    Disabled,
    CreatedAt,
}
