//! Create user and user connection tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(User::Username).string_len(128).not_null())
                    .col(ColumnDef::new(User::DisplayName).string_len(128).not_null())
                    .col(ColumnDef::new(User::UserType).string_len(16).not_null().default(""))
                    .col(json_list(User::RoleIds))
                    .col(json_list(User::Editors))
                    .col(json_list(User::BlockedUserIds))
                    .col(ColumnDef::new(User::TokenVersion).integer().not_null().default(0))
                    .col(ColumnDef::new(User::Avatar).json_binary())
                    .col(ColumnDef::new(User::LastLoginAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(User::LastVisitAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(User::LastClientIp).string_len(64))
                    .col(ColumnDef::new(User::FormerUsername).string_len(128))
                    .col(
                        ColumnDef::new(User::CreatedAt)
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
                    .name("idx_user_username")
                    .table(User::Table)
                    .col(User::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserConnection::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UserConnection::Platform).string_len(16).not_null())
                    .col(ColumnDef::new(UserConnection::Id).string_len(64).not_null())
                    .col(ColumnDef::new(UserConnection::UserId).string_len(24).not_null())
                    .col(ColumnDef::new(UserConnection::Username).string_len(128).not_null())
                    .col(ColumnDef::new(UserConnection::DisplayName).string_len(128).not_null())
                    .col(
                        ColumnDef::new(UserConnection::LinkedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(UserConnection::EmoteSetId).string_len(24))
                    .col(ColumnDef::new(UserConnection::EmoteSlots).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(UserConnection::Data)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(ColumnDef::new(UserConnection::Grant).json_binary())
                    .primary_key(
                        Index::create()
                            .col(UserConnection::Platform)
                            .col(UserConnection::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_connection_user")
                            .from(UserConnection::Table, UserConnection::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_connection_user_id")
                    .table(UserConnection::Table)
                    .col(UserConnection::UserId)
                    .to_owned(),
            )
            .await?;

        // Channels are looked up by their bound set when it changes.
        manager
            .create_index(
                Index::create()
                    .name("idx_user_connection_emote_set_id")
                    .table(UserConnection::Table)
                    .col(UserConnection::EmoteSetId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserConnection::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

fn json_list(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col)
        .json_binary()
        .not_null()
        .default(Expr::cust("'[]'::jsonb"))
        .to_owned()
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    Username,
    DisplayName,
    UserType,
    RoleIds,
    Editors,
    BlockedUserIds,
    TokenVersion,
    Avatar,
    LastLoginAt,
    LastVisitAt,
    LastClientIp,
    FormerUsername,
    CreatedAt,
}

#[derive(Iden)]
enum UserConnection {
    Table,
    Platform,
    Id,
    UserId,
    Username,
    DisplayName,
    LinkedAt,
    EmoteSetId,
    EmoteSlots,
    Data,
    Grant,
}
