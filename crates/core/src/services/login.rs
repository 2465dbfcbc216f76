//! Sign in through a platform account.

use chrono::{DateTime, Duration, Utc};
use sea_orm::Set;
use seventv_common::{AppError, AppResult, IdGenerator};
use seventv_db::{
    entities::{
        embedded::{ConnectionGrant, EditorList, StringList},
        enums::{ObjectKind, Platform},
        user, user_connection,
    },
    repositories::{EntitlementRepository, UserConnectionRepository, UserRepository},
};
use serde_json::Value;
use tracing::{info, warn};

use super::{
    auth::AuthService,
    oauth::{OAuthGrant, PlatformUser},
};
use crate::events::{ChangeField, ChangeFieldType, ChangeMap, EventCondition, EventType, Events};

/// Emote slots granted to a freshly linked connection.
pub const DEFAULT_EMOTE_SLOTS: i32 = 600;

/// Result of a successful sign in.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: user::Model,
    pub connection: user_connection::Model,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Whether the user was created by this sign in.
    pub created: bool,
}

/// Finds or creates the user behind a platform account and issues a token.
#[derive(Clone)]
pub struct LoginService {
    users: UserRepository,
    connections: UserConnectionRepository,
    entitlements: EntitlementRepository,
    auth: AuthService,
    events: Events,
    id_gen: IdGenerator,
}

impl LoginService {
    #[must_use]
    pub fn new(
        users: UserRepository,
        connections: UserConnectionRepository,
        entitlements: EntitlementRepository,
        auth: AuthService,
        events: Events,
    ) -> Self {
        Self {
            users,
            connections,
            entitlements,
            auth,
            events,
            id_gen: IdGenerator::new(),
        }
    }

    /// Sign in with `account`, linking it to `bind` when set.
    pub async fn login(
        &self,
        platform: Platform,
        account: PlatformUser,
        grant: Option<&OAuthGrant>,
        bind: Option<&str>,
    ) -> AppResult<LoginOutcome> {
        let bind = bind.filter(|b| !b.is_empty());
        let existing = self.users.find_for_login(platform, &account.id, bind).await?;

        let (user, connection, created) = match existing {
            None => {
                let (user, connection) = self.create_user(platform, &account, grant).await?;
                (user, connection, true)
            }
            Some(user) => {
                if let Some(bind) = bind {
                    if bind != user.id {
                        return Err(AppError::forbidden(
                            "This connection is already bound to another user",
                        ));
                    }
                }
                let connection = self.link(&user, platform, &account, grant).await?;
                (user, connection, false)
            }
        };

        let user = self.touch(user).await;

        match self
            .entitlements
            .assign_claims(platform, &account.id, &user.id)
            .await
        {
            Ok(0) => {}
            Ok(n) => info!(user_id = %user.id, count = n, "assigned claimed entitlements"),
            Err(e) => warn!(error = %e, user_id = %user.id, "failed to assign claimed entitlements"),
        }

        let (token, expires_at) = self
            .auth
            .create_access_token(&user.id, user.token_version)?;

        Ok(LoginOutcome {
            user,
            connection,
            token,
            expires_at,
            created,
        })
    }

    async fn create_user(
        &self,
        platform: Platform,
        account: &PlatformUser,
        grant: Option<&OAuthGrant>,
    ) -> AppResult<(user::Model, user_connection::Model)> {
        let id = self.id_gen.generate();
        let username = self.available_username(&account.username, &id).await?;
        let now = Utc::now();

        let (user, connection) = self
            .users
            .create_with_connection(
                user::ActiveModel {
                    id: Set(id.clone()),
                    username: Set(username),
                    display_name: Set(display_name_of(account)),
                    user_type: Set(String::new()),
                    role_ids: Set(StringList::default()),
                    editors: Set(EditorList::default()),
                    blocked_user_ids: Set(StringList::default()),
                    token_version: Set(1),
                    avatar: Set(None),
                    last_login_at: Set(Some(now.into())),
                    last_visit_at: Set(Some(now.into())),
                    last_client_ip: Set(None),
                    former_username: Set(None),
                    created_at: Set(now.into()),
                },
                new_connection(platform, account, &id, grant),
            )
            .await?;

        info!(user_id = %user.id, platform = platform.as_str(), "created user");
        Ok((user, connection))
    }

    /// Refresh an existing connection or attach a new one to `user`.
    async fn link(
        &self,
        user: &user::Model,
        platform: Platform,
        account: &PlatformUser,
        grant: Option<&OAuthGrant>,
    ) -> AppResult<user_connection::Model> {
        if let Some(existing) = self.connections.find(platform, &account.id).await? {
            if existing.user_id != user.id {
                return Err(AppError::forbidden(
                    "This connection is already bound to another user",
                ));
            }

            let mut am = user_connection::ActiveModel {
                platform: sea_orm::Unchanged(existing.platform),
                id: sea_orm::Unchanged(existing.id.clone()),
                username: Set(account.username.clone()),
                display_name: Set(display_name_of(account)),
                data: Set(account.data.clone()),
                ..Default::default()
            };
            if let Some(grant) = grant {
                am.grant = Set(Some(connection_grant(grant)));
            }
            return self.connections.update(am).await;
        }

        let connection = self
            .connections
            .create(new_connection(platform, account, &user.id, grant))
            .await?;

        let index = self
            .users
            .connection_count(&user.id)
            .await
            .map_or(0, |n| usize::try_from(n.saturating_sub(1)).unwrap_or(0));

        let mut changes = ChangeMap::new(&user.id, ObjectKind::User, Some(user));
        changes.pushed.push(
            ChangeField::new(
                "connections",
                ChangeFieldType::Object,
                serde_json::to_value(&connection)?,
            )
            .at(index),
        );
        self.events.dispatch(
            EventType::UpdateUser,
            changes,
            EventCondition::object_id(&user.id),
        );

        info!(user_id = %user.id, platform = platform.as_str(), "linked connection");
        Ok(connection)
    }

    async fn available_username(&self, wanted: &str, id: &str) -> AppResult<String> {
        let base: String = wanted
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let base = if base.is_empty() {
            format!("user{}", &id[id.len().saturating_sub(8)..])
        } else {
            base
        };

        if self.users.find_by_username(&base).await?.is_none() {
            return Ok(base);
        }
        Ok(format!("{base}_{}", &id[id.len().saturating_sub(6)..]))
    }

    async fn touch(&self, user: user::Model) -> user::Model {
        let am = user::ActiveModel {
            id: sea_orm::Unchanged(user.id.clone()),
            last_login_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };
        match self.users.update(am).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, user_id = %user.id, "failed to update last login");
                user
            }
        }
    }
}

fn display_name_of(account: &PlatformUser) -> String {
    if account.display_name.is_empty() {
        account.username.clone()
    } else {
        account.display_name.clone()
    }
}

fn new_connection(
    platform: Platform,
    account: &PlatformUser,
    user_id: &str,
    grant: Option<&OAuthGrant>,
) -> user_connection::ActiveModel {
    user_connection::ActiveModel {
        platform: Set(platform),
        id: Set(account.id.clone()),
        user_id: Set(user_id.to_string()),
        username: Set(account.username.clone()),
        display_name: Set(display_name_of(account)),
        linked_at: Set(Utc::now().into()),
        emote_set_id: Set(None),
        emote_slots: Set(DEFAULT_EMOTE_SLOTS),
        data: Set(account.data.clone()),
        grant: Set(grant.map(connection_grant)),
    }
}

fn connection_grant(grant: &OAuthGrant) -> ConnectionGrant {
    let scope = match &grant.scope {
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    ConnectionGrant {
        access_token: grant.access_token.clone(),
        refresh_token: grant.refresh_token.clone().unwrap_or_default(),
        scope,
        expires_at: Utc::now() + Duration::seconds(grant.expires_in),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::testing::recording;
    use crate::testing::{conn, empty, mock};
    use sea_orm::{MockExecResult, Value as DbValue};
    use serde_json::json;
    use seventv_db::fixtures;
    use std::collections::BTreeMap;

    const USER_ID: &str = "60ae434d1aa1d1b2f8d4a5c7";

    fn account(id: &str, username: &str) -> PlatformUser {
        PlatformUser {
            id: id.to_string(),
            username: username.to_string(),
            display_name: username.to_string(),
            data: json!({ "id": id, "login": username }),
        }
    }

    fn count_row(n: i64) -> BTreeMap<&'static str, DbValue> {
        BTreeMap::from([("num_items", DbValue::BigInt(Some(n)))])
    }

    fn claims_exec(n: u64) -> sea_orm::MockDatabase {
        mock().append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: n,
        }])
    }

    #[test]
    fn test_grant_scope_forms() {
        let grant = OAuthGrant {
            access_token: "at".to_string(),
            scope: json!("identify email"),
            expires_in: 3600,
            ..Default::default()
        };
        assert_eq!(connection_grant(&grant).scope, vec!["identify", "email"]);

        let grant = OAuthGrant {
            scope: json!(["user:read:email"]),
            ..grant
        };
        let stored = connection_grant(&grant);
        assert_eq!(stored.scope, vec!["user:read:email"]);
        assert!(stored.expires_at > Utc::now() + Duration::seconds(3500));
    }

    #[tokio::test]
    async fn test_returning_user_refreshes_connection() {
        let user = fixtures::user(USER_ID, "forsen");
        let connection = fixtures::connection(Platform::Twitch, "22484632", USER_ID);

        let users = conn(mock().append_query_results([vec![user.clone()], vec![user.clone()]]));
        let connections = conn(mock().append_query_results([
            vec![connection.clone()],
            vec![connection.clone()],
        ]));
        let (events, recorder) = recording();
        let auth = AuthService::with_secret("secret");

        let service = LoginService::new(
            UserRepository::new(users),
            UserConnectionRepository::new(connections),
            EntitlementRepository::new(conn(claims_exec(0))),
            auth.clone(),
            events,
        );

        let outcome = service
            .login(Platform::Twitch, account("22484632", "forsen"), None, None)
            .await
            .unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.user.id, USER_ID);
        assert_eq!(auth.verify_access_token(&outcome.token).unwrap().u, USER_ID);
        assert!(recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_bind_to_other_user_is_forbidden() {
        let owner = fixtures::user(USER_ID, "forsen");
        let users = conn(mock().append_query_results([vec![owner]]));
        let service = LoginService::new(
            UserRepository::new(users),
            UserConnectionRepository::new(empty()),
            EntitlementRepository::new(empty()),
            AuthService::with_secret("secret"),
            Events::disabled(),
        );

        let err = service
            .login(
                Platform::Twitch,
                account("22484632", "forsen"),
                None,
                Some("60ae434d1aa1d1b2f8d4a5c8"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already bound to another user"));
    }

    #[tokio::test]
    async fn test_new_connection_is_pushed_to_user() {
        let user = fixtures::user(USER_ID, "forsen");
        let connection = fixtures::connection(Platform::Discord, "1234", USER_ID);

        // find_by_connection (none), find_by_id (bind), connection_count, touch
        let users = conn(
            mock()
                .append_query_results([Vec::<user::Model>::new(), vec![user.clone()]])
                .append_query_results([[count_row(2)]])
                .append_query_results([[user.clone()]]),
        );
        let connections = conn(
            mock()
                .append_query_results([Vec::<user_connection::Model>::new()])
                .append_query_results([[connection]]),
        );
        let (events, recorder) = recording();

        let service = LoginService::new(
            UserRepository::new(users),
            UserConnectionRepository::new(connections),
            EntitlementRepository::new(conn(claims_exec(1))),
            AuthService::with_secret("secret"),
            events,
        );

        let outcome = service
            .login(Platform::Discord, account("1234", "anatole"), None, Some(USER_ID))
            .await
            .unwrap();
        assert_eq!(outcome.connection.platform, Platform::Discord);

        let messages = recorder.messages();
        assert_eq!(messages.len(), 1);
        let pushed = &messages[0].d.body.pushed;
        assert_eq!(pushed[0].key, "connections");
        assert_eq!(pushed[0].index, Some(1));
    }

    #[tokio::test]
    async fn test_first_login_creates_user() {
        let user = fixtures::user(USER_ID, "forsen");
        let connection = fixtures::connection(Platform::Twitch, "22484632", USER_ID);

        // find_by_connection, find_by_username, insert user + connection, touch
        let users = conn(
            mock()
                .append_query_results([Vec::<user::Model>::new(), Vec::new(), vec![user.clone()]])
                .append_query_results([[connection]])
                .append_query_results([[user]]),
        );

        let service = LoginService::new(
            UserRepository::new(users),
            UserConnectionRepository::new(empty()),
            EntitlementRepository::new(conn(claims_exec(0))),
            AuthService::with_secret("secret"),
            Events::disabled(),
        );

        let outcome = service
            .login(Platform::Twitch, account("22484632", "Forsen"), None, None)
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.connection.emote_slots, DEFAULT_EMOTE_SLOTS);
    }

    #[tokio::test]
    async fn test_failed_connection_insert_aborts_signup() {
        let user = fixtures::user(USER_ID, "forsen");
        let users = conn(
            mock()
                .append_query_results([Vec::<user::Model>::new(), Vec::new(), vec![user]])
                .append_query_errors([sea_orm::DbErr::Custom("duplicate key".to_string())]),
        );
        let (events, recorder) = recording();

        let service = LoginService::new(
            UserRepository::new(users),
            UserConnectionRepository::new(empty()),
            EntitlementRepository::new(empty()),
            AuthService::with_secret("secret"),
            events,
        );

        let err = service
            .login(Platform::Twitch, account("22484632", "forsen"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert!(recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_bind_to_same_user_links() {
        let user = fixtures::user(USER_ID, "forsen");
        let connection = fixtures::connection(Platform::Twitch, "22484632", USER_ID);

        let users = conn(mock().append_query_results([vec![user.clone()], vec![user]]));
        let connections = conn(mock().append_query_results([
            vec![connection.clone()],
            vec![connection],
        ]));

        let service = LoginService::new(
            UserRepository::new(users),
            UserConnectionRepository::new(connections),
            EntitlementRepository::new(conn(claims_exec(0))),
            AuthService::with_secret("secret"),
            Events::disabled(),
        );

        let outcome = service
            .login(
                Platform::Twitch,
                account("22484632", "forsen"),
                None,
                Some(USER_ID),
            )
            .await
            .unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.user.id, USER_ID);
    }
}
