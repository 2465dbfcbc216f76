//! Create message and message read tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Message::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Message::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(Message::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(Message::AuthorId).string_len(24))
                    .col(ColumnDef::new(Message::Anonymous).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Message::Data)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Message::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MessageRead::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MessageRead::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(MessageRead::MessageId).string_len(24).not_null())
                    .col(ColumnDef::new(MessageRead::Kind).string_len(16).not_null())
                    .col(ColumnDef::new(MessageRead::RecipientId).string_len(24))
                    .col(ColumnDef::new(MessageRead::Read).boolean().not_null().default(false))
                    .col(ColumnDef::new(MessageRead::ReadAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(MessageRead::Weight).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(MessageRead::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_message_read_message")
                            .from(MessageRead::Table, MessageRead::MessageId)
                            .to(Message::Table, Message::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_read_recipient_id_read")
                    .table(MessageRead::Table)
                    .col(MessageRead::RecipientId)
                    .col(MessageRead::Read)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_read_message_id")
                    .table(MessageRead::Table)
                    .col(MessageRead::MessageId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MessageRead::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Message::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Message {
    Table,
    Id,
    Kind,
    AuthorId,
    Anonymous,
    Data,
    CreatedAt,
}

#[derive(Iden)]
enum MessageRead {
    Table,
    Id,
    MessageId,
    Kind,
    RecipientId,
    Read,
    ReadAt,
    Weight,
    CreatedAt,
}
