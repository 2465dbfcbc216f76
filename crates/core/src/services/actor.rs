//! The authenticated caller and its effective permissions.

use chrono::Utc;
use seventv_common::{
    AppError, AppResult, BanEffects, EditorPermissions, ObjectId, Permissions,
    permissions::{ban_effect, editor_permission},
};
use seventv_db::{
    entities::{ban, role, user},
    repositories::{BanRepository, RoleRepository, UserRepository},
};
use sea_orm::Set;
use tracing::{debug, warn};

use super::auth::AuthService;

/// A user acting on the API, with roles and bans resolved.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user: user::Model,
    /// Effective roles, highest position first.
    pub roles: Vec<role::Model>,
    pub permissions: Permissions,
    /// Active bans.
    pub bans: Vec<ban::Model>,
}

impl Actor {
    /// Build an actor from its user, roles and active bans.
    #[must_use]
    pub fn new(user: user::Model, roles: Vec<role::Model>, bans: Vec<ban::Model>) -> Self {
        let effects = combined_effects(&bans);
        let roles = if effects.has(ban_effect::NO_PERMISSIONS) {
            vec![revocation_role()]
        } else {
            roles
        };

        Self {
            permissions: effective_permissions(&roles),
            user,
            roles,
            bans,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// Whether the actor holds every bit of `bits`.
    #[must_use]
    pub const fn has(&self, bits: i64) -> bool {
        self.permissions.allows(bits)
    }

    /// Fail with a missing-permission error unless the actor holds `bits`.
    pub fn require(&self, bits: i64, name: &str) -> AppResult<()> {
        if self.has(bits) {
            Ok(())
        } else {
            Err(AppError::forbidden("Insufficient Privilege").with_field("MISSING_PERMISSION", name))
        }
    }

    /// Position of the highest role, 0 without roles.
    #[must_use]
    pub fn highest_position(&self) -> i32 {
        self.roles.iter().map(|r| r.position).max().unwrap_or(0)
    }

    /// Union of the effects of every active ban.
    #[must_use]
    pub fn ban_effects(&self) -> BanEffects {
        combined_effects(&self.bans)
    }

    /// Whether the actor is an editor of `owner` holding `permission`.
    #[must_use]
    pub fn is_editor_of(&self, owner: &user::Model, permission: i32) -> bool {
        owner
            .editors
            .get(&self.user.id)
            .is_some_and(|e| EditorPermissions(e.permissions).has(permission))
    }

    /// Whether the actor is `user_id` or may act on its behalf with `permission`.
    #[must_use]
    pub fn acts_for(&self, owner: &user::Model, permission: i32) -> bool {
        owner.id == self.user.id || self.is_editor_of(owner, permission)
    }
}

/// Grant every allowed bit of every role, then revoke every denied bit.
#[must_use]
pub fn effective_permissions(roles: &[role::Model]) -> Permissions {
    let allowed = roles.iter().fold(0_i64, |acc, r| acc | r.allowed);
    let denied = roles.iter().fold(0_i64, |acc, r| acc | r.denied);
    Permissions(allowed & !denied)
}

fn combined_effects(bans: &[ban::Model]) -> BanEffects {
    BanEffects(bans.iter().fold(0, |acc, b| acc | b.effects))
}

/// Stand-in role for actors banned with `NO_PERMISSIONS`.
fn revocation_role() -> role::Model {
    role::Model {
        id: ObjectId::NIL.to_hex(),
        name: "Banned".to_string(),
        position: 0,
        color: 0,
        allowed: 0,
        denied: i64::MAX,
        is_default: false,
        invisible: true,
        created_at: Utc::now().into(),
    }
}

/// Resolves actors from tokens and users.
#[derive(Clone)]
pub struct ActorService {
    users: UserRepository,
    roles: RoleRepository,
    bans: BanRepository,
    auth: AuthService,
}

impl ActorService {
    #[must_use]
    pub const fn new(
        users: UserRepository,
        roles: RoleRepository,
        bans: BanRepository,
        auth: AuthService,
    ) -> Self {
        Self {
            users,
            roles,
            bans,
            auth,
        }
    }

    /// Resolve roles and bans of a user.
    pub async fn load(&self, user: user::Model) -> AppResult<Actor> {
        let roles = self.roles.find_effective(&user.role_ids.0).await?;
        let bans = self.bans.find_active(&user.id).await?;
        Ok(Actor::new(user, roles, bans))
    }

    /// Role position of any user, used for dominance checks.
    pub async fn position_of(&self, user: &user::Model) -> AppResult<i32> {
        let roles = self.roles.find_effective(&user.role_ids.0).await?;
        Ok(roles.iter().map(|r| r.position).max().unwrap_or(0))
    }

    /// Authenticate an access token.
    pub async fn from_token(&self, token: &str) -> AppResult<Actor> {
        let claims = self.auth.verify_access_token(token)?;

        let user = self
            .users
            .find_by_id(&claims.u)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Bad Token".to_string()))?;

        if user.token_version != claims.v {
            debug!(user_id = %user.id, "token version mismatch");
            return Err(AppError::Unauthorized("Token Version Mismatch".to_string()));
        }

        let actor = self.load(user).await?;
        if actor.ban_effects().has(ban_effect::NO_AUTH) {
            let ban = actor
                .bans
                .iter()
                .filter(|b| BanEffects(b.effects).has(ban_effect::NO_AUTH))
                .max_by_key(|b| b.expire_at);
            if let Some(ban) = ban {
                return Err(AppError::Banned {
                    reason: ban.reason.clone(),
                    expire_at: ban.expire_at.with_timezone(&Utc),
                });
            }
        }

        Ok(actor)
    }

    /// Remember the last address the actor was seen from.
    pub async fn record_client_ip(&self, actor: &Actor, ip: &str) {
        if actor.user.last_client_ip.as_deref() == Some(ip) {
            return;
        }

        let am = user::ActiveModel {
            id: Set(actor.user.id.clone()),
            last_client_ip: Set(Some(ip.to_string())),
            last_visit_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };
        if let Err(e) = self.users.update(am).await {
            warn!(error = %e, user_id = %actor.user.id, "Failed to record client ip");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seventv_common::permissions::permission;
    use seventv_db::{
        entities::embedded::{EditorList, UserEditor},
        fixtures,
    };
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    const USER_ID: &str = "60ae434d1aa1d1b2f8d4a5c7";

    fn service(
        users: Vec<Vec<user::Model>>,
        roles: Vec<Vec<role::Model>>,
        bans: Vec<Vec<ban::Model>>,
    ) -> (ActorService, AuthService) {
        let auth = AuthService::with_secret("secret");
        let users_db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(users)
                .into_connection(),
        );
        let roles_db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(roles)
                .into_connection(),
        );
        let bans_db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results(bans)
                .into_connection(),
        );
        (
            ActorService::new(
                UserRepository::new(users_db),
                RoleRepository::new(roles_db),
                BanRepository::new(bans_db),
                auth.clone(),
            ),
            auth,
        )
    }

    #[test]
    fn test_denied_bits_win_over_allowed() {
        let mut moderator = fixtures::role("r1", 10, permission::MANAGE_BANS | permission::CREATE_EMOTE);
        moderator.denied = permission::CREATE_EMOTE;
        let default = fixtures::role("r0", 0, permission::DEFAULT);

        let perms = effective_permissions(&[moderator, default]);
        assert!(perms.has(permission::MANAGE_BANS));
        assert!(!perms.has(permission::CREATE_EMOTE));
    }

    #[test]
    fn test_no_permissions_ban_revokes_everything() {
        let admin = fixtures::role("r1", 100, permission::SUPER_ADMINISTRATOR);
        let actor = Actor::new(
            fixtures::user(USER_ID, "forsen"),
            vec![admin],
            vec![fixtures::ban("b1", USER_ID, ban_effect::NO_PERMISSIONS)],
        );

        assert_eq!(actor.permissions, Permissions(0));
        assert!(!actor.has(permission::CREATE_EMOTE));
        assert_eq!(actor.highest_position(), 0);
    }

    #[test]
    fn test_require_reports_missing_permission() {
        let actor = Actor::new(fixtures::user(USER_ID, "forsen"), vec![], vec![]);
        let err = actor.require(permission::MANAGE_BANS, "MANAGE_BANS").unwrap_err();

        assert_eq!(
            err.details().unwrap().get("MISSING_PERMISSION"),
            Some(&serde_json::json!("MANAGE_BANS"))
        );
    }

    #[test]
    fn test_editor_permission_lookup() {
        let actor = Actor::new(fixtures::user(USER_ID, "editor"), vec![], vec![]);
        let mut owner = fixtures::user("60ae434d1aa1d1b2f8d4a5c8", "owner");
        owner.editors = EditorList(vec![UserEditor {
            id: USER_ID.to_string(),
            permissions: editor_permission::MODIFY_EMOTES,
            visible: true,
            added_at: Utc::now(),
        }]);

        assert!(actor.is_editor_of(&owner, editor_permission::MODIFY_EMOTES));
        assert!(!actor.is_editor_of(&owner, editor_permission::MANAGE_EMOTE_SETS));
        assert!(actor.acts_for(&owner, editor_permission::MODIFY_EMOTES));
    }

    #[tokio::test]
    async fn test_from_token_resolves_actor() {
        let user = fixtures::user(USER_ID, "forsen");
        let (service, auth) = service(
            vec![vec![user]],
            vec![vec![fixtures::role("r0", 0, permission::DEFAULT)]],
            vec![vec![]],
        );
        let (token, _) = auth.create_access_token(USER_ID, 1).unwrap();

        let actor = service.from_token(&token).await.unwrap();
        assert_eq!(actor.id(), USER_ID);
        assert!(actor.has(permission::CREATE_EMOTE));
    }

    #[tokio::test]
    async fn test_from_token_rejects_stale_version() {
        let mut user = fixtures::user(USER_ID, "forsen");
        user.token_version = 2;
        let (service, auth) = service(vec![vec![user]], vec![], vec![]);
        let (token, _) = auth.create_access_token(USER_ID, 1).unwrap();

        let err = service.from_token(&token).await.unwrap_err();
        assert!(err.to_string().contains("Token Version Mismatch"));
    }

    #[tokio::test]
    async fn test_from_token_rejects_no_auth_ban() {
        let user = fixtures::user(USER_ID, "forsen");
        let (service, auth) = service(
            vec![vec![user]],
            vec![vec![]],
            vec![vec![fixtures::ban("b1", USER_ID, ban_effect::NO_AUTH)]],
        );
        let (token, _) = auth.create_access_token(USER_ID, 1).unwrap();

        let err = service.from_token(&token).await.unwrap_err();
        assert!(matches!(err, AppError::Banned { ref reason, .. } if reason == "spam"));
    }

    #[tokio::test]
    async fn test_from_token_unknown_user() {
        let (service, auth) = service(vec![vec![]], vec![], vec![]);
        let (token, _) = auth.create_access_token(USER_ID, 1).unwrap();

        assert!(matches!(
            service.from_token(&token).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
