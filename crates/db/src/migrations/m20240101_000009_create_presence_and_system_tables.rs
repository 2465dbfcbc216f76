//! Create user presence and system tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserPresence::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UserPresence::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(UserPresence::UserId).string_len(24).not_null())
                    .col(ColumnDef::new(UserPresence::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(UserPresence::Authentic).boolean().not_null().default(false))
                    .col(ColumnDef::new(UserPresence::IpAddress).string_len(64))
                    .col(
                        ColumnDef::new(UserPresence::Data)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(ColumnDef::new(UserPresence::Timestamp).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(UserPresence::ExpiresAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_presence_user_id_kind")
                    .table(UserPresence::Table)
                    .col(UserPresence::UserId)
                    .col(UserPresence::Kind)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(System::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(System::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(System::EmoteSetId).string_len(24))
                    .col(
                        ColumnDef::new(System::Config)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared("INSERT INTO system (id) VALUES ('system') ON CONFLICT DO NOTHING")
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(System::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserPresence::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum UserPresence {
    Table,
    Id,
    UserId,
    Kind,
    Authentic,
    IpAddress,
    Data,
    Timestamp,
    ExpiresAt,
}

#[derive(Iden)]
enum System {
    Table,
    Id,
    EmoteSetId,
    Config,
}
