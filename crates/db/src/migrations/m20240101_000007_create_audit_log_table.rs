//! Create audit log table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuditLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuditLog::Id).string_len(24).not_null().primary_key())
                    .col(ColumnDef::new(AuditLog::Kind).small_integer().not_null())
                    .col(ColumnDef::new(AuditLog::ActorId).string_len(24).not_null())
                    .col(ColumnDef::new(AuditLog::TargetKind).small_integer().not_null())
                    .col(ColumnDef::new(AuditLog::TargetId).string_len(24).not_null())
                    .col(ColumnDef::new(AuditLog::Reason).text().not_null().default(""))
                    .col(
                        ColumnDef::new(AuditLog::Changes)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(AuditLog::CreatedAt)
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
                    .name("idx_audit_log_target")
                    .table(AuditLog::Table)
                    .col(AuditLog::TargetKind)
                    .col(AuditLog::TargetId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_audit_log_actor_id")
                    .table(AuditLog::Table)
                    .col(AuditLog::ActorId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuditLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum AuditLog {
    Table,
    Id,
    Kind,
    ActorId,
    TargetKind,
    TargetId,
    Reason,
    Changes,
    CreatedAt,
}
