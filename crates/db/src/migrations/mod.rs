//! Database migrations.

#![allow(missing_docs)]

use sea_orm_migration::prelude::*;

mod m20240101_000001_create_user_table;
mod m20240101_000002_create_role_table;
mod m20240101_000003_create_emote_tables;
mod m20240101_000004_create_emote_set_table;
mod m20240101_000005_create_ban_table;
mod m20240101_000006_create_message_tables;
mod m20240101_000007_create_audit_log_table;
mod m20240101_000008_create_entitlement_table;
mod m20240101_000009_create_presence_and_system_tables;

/// Migrator for running all migrations.
pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_user_table::Migration),
            Box::new(m20240101_000002_create_role_table::Migration),
            Box::new(m20240101_000003_create_emote_tables::Migration),
            Box::new(m20240101_000004_create_emote_set_table::Migration),
            Box::new(m20240101_000005_create_ban_table::Migration),
            Box::new(m20240101_000006_create_message_tables::Migration),
            Box::new(m20240101_000007_create_audit_log_table::Migration),
            Box::new(m20240101_000008_create_entitlement_table::Migration),
            Box::new(m20240101_000009_create_presence_and_system_tables::Migration),
        ]
    }
}
