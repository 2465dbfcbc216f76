//! Ban issuance and edits.
//!
//! Lifting a ban is an edit that moves `expire_at` to the present.

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Set, Unchanged};
use seventv_common::{
    AppError, AppResult, BanEffects, IdGenerator,
    permissions::{ban_effect, permission},
};
use seventv_db::{
    entities::{
        ban,
        enums::{AuditLogKind, ObjectKind},
    },
    repositories::{BanRepository, RoleRepository, UserRepository},
};
use serde::Deserialize;
use tracing::{error, info};

use super::{
    actor::Actor,
    audit::{AuditChange, AuditEntry, AuditLogger},
    message::{InboxMessage, MessageService},
};

/// Shown in place of an expiry for bans that never lift.
const NEVER: &str = "never";

#[derive(Debug, Clone, Deserialize)]
pub struct BanCreate {
    pub victim_id: String,
    pub reason: String,
    pub effects: i32,
    /// `None` bans permanently.
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BanEdit {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub effects: Option<i32>,
    #[serde(default)]
    pub expire_at: Option<DateTime<Utc>>,
}

/// Expiry stored for permanent bans.
fn permanent() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Clone)]
pub struct BanService {
    bans: BanRepository,
    users: UserRepository,
    roles: RoleRepository,
    messages: MessageService,
    audit: AuditLogger,
    id_gen: IdGenerator,
}

impl BanService {
    #[must_use]
    pub fn new(
        bans: BanRepository,
        users: UserRepository,
        roles: RoleRepository,
        messages: MessageService,
        audit: AuditLogger,
    ) -> Self {
        Self {
            bans,
            users,
            roles,
            messages,
            audit,
            id_gen: IdGenerator::new(),
        }
    }

    pub async fn create(&self, actor: &Actor, input: BanCreate) -> AppResult<ban::Model> {
        if input.victim_id == actor.id() {
            return Err(AppError::invalid("Don't be silly"));
        }
        actor.require(permission::MANAGE_BANS, "MANAGE_BANS")?;

        let victim = self.users.get_by_id(&input.victim_id).await?;
        let victim_position = self
            .roles
            .find_effective(&victim.role_ids.0)
            .await?
            .iter()
            .map(|r| r.position)
            .max()
            .unwrap_or(0);
        if !actor.has(permission::SUPER_ADMINISTRATOR) && victim_position >= actor.highest_position() {
            return Err(AppError::forbidden("Victim has an equal or higher privilege level")
                .with_field("ACTOR_ROLE_POSITION", actor.highest_position())
                .with_field("VICTIM_ROLE_POSITION", victim_position));
        }

        let now = Utc::now();
        let ban = self
            .bans
            .create(ban::ActiveModel {
                id: Set(self.id_gen.generate()),
                victim_id: Set(victim.id.clone()),
                actor_id: Set(actor.id().to_string()),
                reason: Set(input.reason.clone()),
                effects: Set(input.effects),
                expire_at: Set(input.expire_at.unwrap_or_else(permanent).into()),
                created_at: Set(now.into()),
            })
            .await?;

        let notice = ban_notice(&input.reason, input.expire_at, BanEffects(input.effects));
        if let Err(e) = self
            .messages
            .send_inbox(actor, notice, std::slice::from_ref(&victim.id), false)
            .await
        {
            error!(
                error = %e,
                actor_id = %actor.id(),
                victim_id = %victim.id,
                ban_id = %ban.id,
                "failed to send inbox message to victim about created ban"
            );
        }

        self.audit
            .write(
                AuditEntry::new(AuditLogKind::BanUser, actor.id(), ObjectKind::User, &victim.id)
                    .reason(&input.reason)
                    .change(AuditChange::single("ban_id", serde_json::Value::Null, ban.id.as_str())),
            )
            .await;

        info!(
            actor = %actor.user.username,
            victim = %victim.username,
            effects = input.effects,
            "issued ban"
        );
        Ok(ban)
    }

    /// Edit a ban. An expiry at or before now lifts it.
    pub async fn edit(&self, actor: &Actor, ban_id: &str, input: BanEdit) -> AppResult<ban::Model> {
        actor.require(permission::MANAGE_BANS, "MANAGE_BANS")?;
        let current = self.bans.get_by_id(ban_id).await?;

        let mut changes = Vec::new();
        let mut model = ban::ActiveModel {
            id: Unchanged(current.id.clone()),
            ..Default::default()
        };
        if let Some(reason) = input.reason.filter(|r| *r != current.reason) {
            changes.push(AuditChange::single("reason", current.reason.as_str(), reason.as_str()));
            model.reason = Set(reason);
        }
        if let Some(effects) = input.effects.filter(|e| *e != current.effects) {
            changes.push(AuditChange::single("effects", current.effects, effects));
            model.effects = Set(effects);
        }
        let mut lifted = false;
        if let Some(expire_at) = input.expire_at {
            lifted = expire_at <= Utc::now();
            changes.push(AuditChange::single(
                "expire_at",
                current.expire_at.to_rfc3339(),
                expire_at.to_rfc3339(),
            ));
            model.expire_at = Set(expire_at.into());
        }

        if changes.is_empty() {
            return Ok(current);
        }
        let ban = self.bans.update(model).await?;

        let kind = if lifted {
            AuditLogKind::UnbanUser
        } else {
            AuditLogKind::BanUser
        };
        self.audit
            .write(
                AuditEntry::new(kind, actor.id(), ObjectKind::User, &ban.victim_id)
                    .change(AuditChange::single("ban_id", ban.id.as_str(), ban.id.as_str()))
                    .changes(changes),
            )
            .await;

        info!(ban_id, victim_id = %ban.victim_id, lifted, "edited ban");
        Ok(ban)
    }
}

/// The inbox message telling a victim about their ban.
pub fn ban_notice(reason: &str, expire_at: Option<DateTime<Utc>>, effects: BanEffects) -> InboxMessage {
    let mut message = InboxMessage::localized(
        "inbox.generic.client_banned.subject",
        "inbox.generic.client_banned.content",
    );
    message.important = true;
    message
        .placeholders
        .insert("BAN_REASON".to_string(), reason.to_string());
    message.placeholders.insert(
        "BAN_EXPIRE_AT".to_string(),
        expire_at.map_or_else(
            || NEVER.to_string(),
            |t| t.format("%d %b %y %H:%M UTC").to_string(),
        ),
    );
    for (bit, name) in ban_effect::NAMED {
        if effects.has(bit) {
            message.placeholders.insert(
                format!("EFFECT_{name}"),
                format!("inbox.generic.client_banned.effect.{}", name.to_lowercase()),
            );
        }
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{conn, empty, mock};
    use seventv_db::{
        entities::{embedded::StringList, role},
        fixtures,
        repositories::{AuditLogRepository, EmoteRepository, EmoteSetRepository, MessageRepository},
    };

    const MOD_ID: &str = "60ae434d1aa1d1b2f8d4a5c7";
    const VICTIM_ID: &str = "60ae434d1aa1d1b2f8d4a5c8";

    fn service(bans: sea_orm::MockDatabase, users: sea_orm::MockDatabase, roles: sea_orm::MockDatabase) -> BanService {
        BanService::new(
            BanRepository::new(conn(bans)),
            UserRepository::new(conn(users)),
            RoleRepository::new(conn(roles)),
            MessageService::new(
                MessageRepository::new(empty()),
                UserRepository::new(empty()),
                EmoteRepository::new(empty()),
                EmoteSetRepository::new(empty()),
            ),
            AuditLogger::new(AuditLogRepository::new(empty())),
        )
    }

    fn moderator(position: i32) -> Actor {
        Actor::new(
            fixtures::user(MOD_ID, "moderator"),
            vec![fixtures::role("mod", position, permission::MANAGE_BANS | permission::SEND_MESSAGES)],
            vec![],
        )
    }

    fn request() -> BanCreate {
        BanCreate {
            victim_id: VICTIM_ID.to_string(),
            reason: "spam".to_string(),
            effects: ban_effect::NO_AUTH,
            expire_at: None,
        }
    }

    #[test]
    fn test_notice_placeholders() {
        let notice = ban_notice(
            "spam",
            None,
            BanEffects(ban_effect::NO_AUTH | ban_effect::MEMORY_HOLE),
        );
        assert!(notice.important);
        assert_eq!(notice.placeholders["BAN_EXPIRE_AT"], "never");
        assert_eq!(
            notice.placeholders["EFFECT_NO_AUTH"],
            "inbox.generic.client_banned.effect.no_auth"
        );
        assert!(notice.placeholders.contains_key("EFFECT_MEMORY_HOLE"));
        assert!(!notice.placeholders.contains_key("EFFECT_NO_PERMISSIONS"));
    }

    #[tokio::test]
    async fn test_self_ban_rejected() {
        let service = service(mock(), mock(), mock());
        let mut input = request();
        input.victim_id = MOD_ID.to_string();

        let err = service.create(&moderator(10), input).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_requires_manage_bans() {
        let service = service(mock(), mock(), mock());
        let actor = Actor::new(fixtures::user(MOD_ID, "user"), vec![], vec![]);

        let err = service.create(&actor, request()).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientPrivilege(_)));
    }

    #[tokio::test]
    async fn test_victim_must_be_outranked() {
        let mut victim = fixtures::user(VICTIM_ID, "victim");
        victim.role_ids = StringList(vec!["admin".to_string()]);

        let service = service(
            mock(),
            mock().append_query_results([vec![victim]]),
            mock().append_query_results([vec![fixtures::role("admin", 20, 0)]]),
        );

        let err = service.create(&moderator(10), request()).await.unwrap_err();
        assert!(err.to_string().contains("equal or higher privilege level"));
        assert_eq!(err.details().unwrap()["VICTIM_ROLE_POSITION"], 20);
    }

    #[tokio::test]
    async fn test_ban_survives_failed_notice() {
        let service = service(
            mock().append_query_results([vec![fixtures::ban("b1", VICTIM_ID, ban_effect::NO_AUTH)]]),
            mock().append_query_results([vec![fixtures::user(VICTIM_ID, "victim")]]),
            mock().append_query_results([Vec::<role::Model>::new()]),
        );

        let ban = service.create(&moderator(10), request()).await.unwrap();
        assert_eq!(ban.victim_id, VICTIM_ID);
    }

    #[tokio::test]
    async fn test_unban_by_expiring_now() {
        let current = fixtures::ban("b1", VICTIM_ID, ban_effect::NO_AUTH);
        let mut lifted = current.clone();
        let now = Utc::now();
        lifted.expire_at = now.into();

        let service = service(
            mock().append_query_results([vec![current], vec![lifted]]),
            mock(),
            mock(),
        );

        let ban = service
            .edit(
                &moderator(10),
                "b1",
                BanEdit {
                    expire_at: Some(now),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(ban.expire_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_edit_without_changes() {
        let current = fixtures::ban("b1", VICTIM_ID, ban_effect::NO_AUTH);
        let service = service(
            mock().append_query_results([vec![current.clone()]]),
            mock(),
            mock(),
        );

        let ban = service
            .edit(
                &moderator(10),
                "b1",
                BanEdit {
                    reason: Some(current.reason.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(ban, current);
    }
}
