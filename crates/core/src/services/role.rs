//! Role management.
//!
//! An actor may only touch roles positioned strictly below their own highest
//! role, and may not move a role to or above that position.

use chrono::Utc;
use sea_orm::Set;
use seventv_common::{AppError, AppResult, IdGenerator, permissions::permission};
use seventv_db::{
    entities::{
        enums::{AuditLogKind, ObjectKind},
        role,
    },
    repositories::{RoleRepository, UserRepository},
};
use serde::Deserialize;
use tracing::info;

use super::{
    actor::Actor,
    audit::{AuditChange, AuditEntry, AuditLogger},
};
use crate::builder::Builder;

#[derive(Debug, Clone, Deserialize)]
pub struct RoleCreate {
    pub name: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub color: i32,
    #[serde(default)]
    pub allowed: i64,
    #[serde(default)]
    pub denied: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub color: Option<i32>,
    #[serde(default)]
    pub allowed: Option<i64>,
    #[serde(default)]
    pub denied: Option<i64>,
}

#[derive(Clone)]
pub struct RoleService {
    roles: RoleRepository,
    users: UserRepository,
    audit: AuditLogger,
    id_gen: IdGenerator,
}

impl RoleService {
    #[must_use]
    pub fn new(roles: RoleRepository, users: UserRepository, audit: AuditLogger) -> Self {
        Self {
            roles,
            users,
            audit,
            id_gen: IdGenerator::new(),
        }
    }

    pub async fn list(&self) -> AppResult<Vec<role::Model>> {
        self.roles.find_all().await
    }

    fn require_above(actor: &Actor, position: i32) -> AppResult<()> {
        if actor.has(permission::SUPER_ADMINISTRATOR) || position < actor.highest_position() {
            return Ok(());
        }
        Err(AppError::forbidden("Insufficient Privilege")
            .with_field("ACTOR_ROLE_POSITION", actor.highest_position())
            .with_field("ROLE_POSITION", position))
    }

    pub async fn create(&self, actor: &Actor, input: RoleCreate) -> AppResult<role::Model> {
        actor.require(permission::MANAGE_ROLES, "MANAGE_ROLES")?;
        if input.name.trim().is_empty() {
            return Err(AppError::invalid("Missing role name"));
        }
        Self::require_above(actor, input.position)?;

        let role = self
            .roles
            .create(role::ActiveModel {
                id: Set(self.id_gen.generate()),
                name: Set(input.name),
                position: Set(input.position),
                color: Set(input.color),
                allowed: Set(input.allowed),
                denied: Set(input.denied),
                is_default: Set(false),
                invisible: Set(false),
                created_at: Set(Utc::now().into()),
            })
            .await?;

        self.audit
            .write(AuditEntry::new(
                AuditLogKind::CreateRole,
                actor.id(),
                ObjectKind::Role,
                &role.id,
            ))
            .await;
        info!(role_id = %role.id, name = %role.name, "created role");
        Ok(role)
    }

    pub async fn edit(&self, actor: &Actor, id: &str, input: RoleEdit) -> AppResult<role::Model> {
        actor.require(permission::MANAGE_ROLES, "MANAGE_ROLES")?;
        let current = self.roles.get_by_id(id).await?;
        Self::require_above(actor, current.position)?;
        if let Some(position) = input.position {
            Self::require_above(actor, position)?;
        }

        let mut changes = Vec::new();
        let mut builder = Builder::new(current.clone());
        if let Some(name) = input.name.filter(|n| *n != current.name) {
            if name.trim().is_empty() {
                return Err(AppError::invalid("Missing role name"));
            }
            changes.push(AuditChange::single("name", current.name.as_str(), name.as_str()));
            builder.update(|r| r.name = name)?;
        }
        if let Some(position) = input.position.filter(|p| *p != current.position) {
            changes.push(AuditChange::single("position", current.position, position));
            builder.update(|r| r.position = position)?;
        }
        if let Some(color) = input.color.filter(|c| *c != current.color) {
            changes.push(AuditChange::single("color", current.color, color));
            builder.update(|r| r.color = color)?;
        }
        if let Some(allowed) = input.allowed.filter(|a| *a != current.allowed) {
            changes.push(AuditChange::single("allowed", current.allowed, allowed));
            builder.update(|r| r.allowed = allowed)?;
        }
        if let Some(denied) = input.denied.filter(|d| *d != current.denied) {
            changes.push(AuditChange::single("denied", current.denied, denied));
            builder.update(|r| r.denied = denied)?;
        }

        let Some(model) = builder.finish::<role::ActiveModel>()? else {
            return Ok(current);
        };
        let role = self.roles.update(model).await?;

        self.audit
            .write(
                AuditEntry::new(AuditLogKind::UpdateRole, actor.id(), ObjectKind::Role, id)
                    .changes(changes),
            )
            .await;
        Ok(role)
    }

    /// Delete a role and strip it from every user. Returns how many users held it.
    pub async fn delete(&self, actor: &Actor, id: &str) -> AppResult<u64> {
        actor.require(permission::MANAGE_ROLES, "MANAGE_ROLES")?;
        let role = self.roles.get_by_id(id).await?;
        Self::require_above(actor, role.position)?;

        self.roles.delete(id).await?;
        let holders = self.users.pull_role(id).await?;

        self.audit
            .write(
                AuditEntry::new(AuditLogKind::DeleteRole, actor.id(), ObjectKind::Role, id)
                    .reason(format!("{} held by {holders} users", role.name)),
            )
            .await;
        info!(role_id = id, holders, "deleted role");
        Ok(holders)
    }
}
