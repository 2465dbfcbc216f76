//! Client for the platforms users sign in with.
//!
//! Twitch, Discord and YouTube use the OAuth 2.0 authorization code flow.
//! Kick has no OAuth app support, so Kick accounts are verified manually: the
//! user is handed a short code, puts it in their channel bio, and we look for
//! it in the public channel payload.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use seventv_common::{AppError, AppResult, IdGenerator, config::{PlatformConfig, PlatformsConfig}};
use seventv_db::entities::enums::Platform;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::store::SharedStore;

/// Lifetime of a manual verification code.
pub const MANUAL_CODE_TTL: Duration = Duration::from_secs(5 * 60);

const USER_AGENT: &str = "SevenTV-API/3";

/// Token grant returned by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthGrant {
    #[serde(default)]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    /// Either a space separated string or a list, depending on the provider.
    #[serde(default)]
    pub scope: Value,
}

/// Account data fetched from a platform.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformUser {
    pub id: String,
    pub username: String,
    pub display_name: String,
    /// Raw payload, stored on the connection.
    pub data: Value,
}

/// Talks to the external identity providers.
#[derive(Clone)]
pub struct OAuthService {
    http: Client,
    platforms: PlatformsConfig,
    store: Arc<dyn SharedStore>,
    id_gen: IdGenerator,
}

impl OAuthService {
    pub fn new(platforms: PlatformsConfig, store: Arc<dyn SharedStore>) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            platforms,
            store,
            id_gen: IdGenerator::new(),
        })
    }

    fn credentials(&self, platform: Platform) -> AppResult<&PlatformConfig> {
        let cfg = match platform {
            Platform::Twitch => &self.platforms.twitch,
            Platform::Youtube => &self.platforms.youtube,
            Platform::Discord => &self.platforms.discord,
            Platform::Kick => &self.platforms.kick,
        };
        if cfg.enabled {
            Ok(cfg)
        } else {
            Err(AppError::invalid("Unsupported Account Provider"))
        }
    }

    /// Whether sign in through `platform` uses the OAuth redirect flow.
    #[must_use]
    pub fn supports_oauth(&self, platform: Platform) -> bool {
        platform != Platform::Kick && self.credentials(platform).is_ok()
    }

    /// Query parameters of the authorize redirect.
    pub fn query_values(&self, platform: Platform, state: &str) -> AppResult<Vec<(&'static str, String)>> {
        if platform == Platform::Kick {
            return Err(AppError::invalid("Unsupported Account Provider"));
        }
        let cfg = self.credentials(platform)?;

        Ok(vec![
            ("client_id", cfg.client_id.clone()),
            ("redirect_uri", cfg.redirect_uri.clone()),
            ("response_type", "code".to_string()),
            ("scope", scopes(platform).join(" ")),
            ("state", state.to_string()),
        ])
    }

    /// Provider URL the user is redirected to.
    pub fn authorize_url(&self, platform: Platform, state: &str) -> AppResult<String> {
        let params = self.query_values(platform, state)?;
        let mut url = url::Url::parse(authorize_endpoint(platform))
            .map_err(|e| AppError::Internal(format!("authorize url: {e}")))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url.into())
    }

    /// Trade an authorization code for a token grant.
    pub async fn exchange_code(&self, platform: Platform, code: &str) -> AppResult<OAuthGrant> {
        let cfg = self.credentials(platform)?;
        let params = [
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("redirect_uri", cfg.redirect_uri.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];

        let request = match platform {
            Platform::Discord => self.http.post(token_endpoint(platform)).form(&params),
            Platform::Twitch | Platform::Youtube => {
                self.http.post(token_endpoint(platform)).query(&params)
            }
            Platform::Kick => return Err(AppError::invalid("Unsupported Account Provider")),
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(platform = platform.as_str(), status = status.as_u16(), "code exchange failed");
            return Err(AppError::ExternalService(format!(
                "bad resp from provider: {} - {body}",
                status.as_u16()
            )));
        }

        resp.json::<OAuthGrant>()
            .await
            .map_err(|e| AppError::ExternalService(format!("bad grant from provider: {e}")))
    }

    /// Fetch the account behind a grant.
    pub async fn user_data(&self, platform: Platform, grant: &OAuthGrant) -> AppResult<PlatformUser> {
        let cfg = self.credentials(platform)?;
        let (request, parse): (_, fn(&Value) -> AppResult<PlatformUser>) = match platform {
            Platform::Twitch => (
                self.http
                    .get("https://api.twitch.tv/helix/users")
                    .header("Client-Id", &cfg.client_id),
                parse_twitch_user,
            ),
            Platform::Discord => (
                self.http.get("https://discord.com/api/users/@me"),
                parse_discord_user,
            ),
            Platform::Youtube => (
                self.http
                    .get("https://www.googleapis.com/youtube/v3/channels")
                    .query(&[("part", "snippet"), ("mine", "true")]),
                parse_youtube_user,
            ),
            Platform::Kick => return Err(AppError::invalid("Unsupported Account Provider")),
        };

        let payload = self
            .fetch_json(request.bearer_auth(&grant.access_token), platform)
            .await?;
        parse(&payload)
    }

    /// Fetch a Kick channel by slug.
    pub async fn kick_user_data(&self, slug: &str) -> AppResult<(PlatformUser, String)> {
        let cfg = self.credentials(Platform::Kick)?;
        let bust = self.id_gen.generate_token(4);
        let request = self
            .http
            .get(format!("https://kick.com/api/v2/channels/{}", urlencoding::encode(slug)))
            .query(&[("7tv-bust", bust)])
            .header("Content-Type", "application/json")
            .header("x-kick-auth", &cfg.client_secret);

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::unknown(
                seventv_common::EntityKind::Connection,
                "Kick channel not found",
            ));
        }
        if !status.is_success() {
            return Err(AppError::ExternalService(format!(
                "bad resp from provider: {}",
                status.as_u16()
            )));
        }

        let raw = resp.text().await?;
        let payload: Value = serde_json::from_str(&raw)?;
        Ok((parse_kick_user(&payload)?, raw))
    }

    /// Issue a verification code for a manually linked account.
    pub async fn request_manual_code(&self, platform: Platform, id: &str) -> AppResult<String> {
        if platform != Platform::Kick {
            return Err(AppError::invalid("Unsupported Account Provider"));
        }
        self.credentials(platform)?;
        if id.is_empty() {
            return Err(AppError::invalid("Missing Field").with_field("query", "id"));
        }

        let code = self.id_gen.generate_token(16);
        self.store
            .set_ex(&manual_key(platform, id), &code, MANUAL_CODE_TTL)
            .await?;
        debug!(platform = platform.as_str(), id, "manual verification code issued");
        Ok(code)
    }

    /// Check that the account shows the issued code and return it.
    pub async fn verify_manual(&self, platform: Platform, id: &str) -> AppResult<PlatformUser> {
        if platform != Platform::Kick {
            return Err(AppError::invalid("Unsupported Account Provider"));
        }
        if id.is_empty() {
            return Err(AppError::invalid("Missing Field").with_field("query", "id"));
        }

        let key = manual_key(platform, id);
        let code = self
            .store
            .get(&key)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Invalid Code".to_string()))?;

        let (user, raw) = self.kick_user_data(id).await?;
        if !raw.contains(&code) {
            return Err(AppError::Unauthorized("Invalid Code".to_string()));
        }

        self.store.del(&key).await?;
        Ok(user)
    }

    async fn fetch_json(&self, request: reqwest::RequestBuilder, platform: Platform) -> AppResult<Value> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "bad resp from provider ({}): {} - {body}",
                platform.as_str(),
                status.as_u16()
            )));
        }
        Ok(resp.json().await?)
    }
}

fn manual_key(platform: Platform, id: &str) -> String {
    format!(
        "api:manual-auth:{}:{id}",
        platform.as_str().to_ascii_lowercase()
    )
}

/// Scopes requested from each provider.
#[must_use]
pub const fn scopes(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Twitch => &["user:read:email"],
        Platform::Discord => &["identify", "email"],
        Platform::Youtube => &["https://www.googleapis.com/auth/youtube.readonly"],
        Platform::Kick => &[],
    }
}

const fn authorize_endpoint(platform: Platform) -> &'static str {
    match platform {
        Platform::Twitch => "https://id.twitch.tv/oauth2/authorize",
        Platform::Discord => "https://discord.com/api/oauth2/authorize",
        Platform::Youtube => "https://accounts.google.com/o/oauth2/v2/auth",
        Platform::Kick => "https://kick.com",
    }
}

const fn token_endpoint(platform: Platform) -> &'static str {
    match platform {
        Platform::Twitch => "https://id.twitch.tv/oauth2/token",
        Platform::Discord => "https://discord.com/api/oauth2/token",
        Platform::Youtube => "https://oauth2.googleapis.com/token",
        Platform::Kick => "https://kick.com",
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> &'a str {
    v.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn missing_account() -> AppError {
    AppError::ExternalService("provider returned no account".to_string())
}

/// Helix `GET /users` response.
pub fn parse_twitch_user(payload: &Value) -> AppResult<PlatformUser> {
    let user = payload
        .get("data")
        .and_then(|d| d.get(0))
        .ok_or_else(missing_account)?;

    Ok(PlatformUser {
        id: str_field(user, "id").to_string(),
        username: str_field(user, "login").to_string(),
        display_name: str_field(user, "display_name").to_string(),
        data: user.clone(),
    })
}

/// Discord `GET /users/@me` response.
pub fn parse_discord_user(payload: &Value) -> AppResult<PlatformUser> {
    let id = str_field(payload, "id");
    if id.is_empty() {
        return Err(missing_account());
    }
    let username = str_field(payload, "username");
    let display_name = payload
        .get("global_name")
        .and_then(Value::as_str)
        .unwrap_or(username);

    Ok(PlatformUser {
        id: id.to_string(),
        username: username.to_string(),
        display_name: display_name.to_string(),
        data: payload.clone(),
    })
}

/// YouTube `GET /channels?mine=true` response.
pub fn parse_youtube_user(payload: &Value) -> AppResult<PlatformUser> {
    let channel = payload
        .get("items")
        .and_then(|d| d.get(0))
        .ok_or_else(missing_account)?;
    let snippet = channel.get("snippet").unwrap_or(&Value::Null);
    let title = str_field(snippet, "title");
    let username = snippet
        .get("customUrl")
        .and_then(Value::as_str)
        .map_or(title, |u| u.trim_start_matches('@'));

    Ok(PlatformUser {
        id: str_field(channel, "id").to_string(),
        username: username.to_string(),
        display_name: title.to_string(),
        data: channel.clone(),
    })
}

/// Kick `GET /api/v2/channels/{slug}` response.
pub fn parse_kick_user(payload: &Value) -> AppResult<PlatformUser> {
    let user_id = payload
        .get("user_id")
        .and_then(Value::as_i64)
        .ok_or_else(missing_account)?;
    let chatroom_id = payload
        .pointer("/chatroom/id")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let slug = str_field(payload, "slug");
    let display_name = payload
        .pointer("/user/username")
        .and_then(Value::as_str)
        .unwrap_or(slug);
    let bio = payload
        .pointer("/user/bio")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(PlatformUser {
        id: user_id.to_string(),
        username: slug.to_string(),
        display_name: display_name.to_string(),
        data: json!({
            "id": user_id.to_string(),
            "chatroom_id": chatroom_id.to_string(),
            "username": slug,
            "display_name": display_name,
            "bio": bio,
        }),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn enabled(id: &str) -> PlatformConfig {
        PlatformConfig {
            enabled: true,
            client_id: id.to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:3000/v3/auth?platform=twitch&callback=true".to_string(),
        }
    }

    fn service() -> (OAuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let platforms = PlatformsConfig {
            twitch: enabled("twitch-client"),
            kick: enabled("kick-client"),
            ..Default::default()
        };
        (OAuthService::new(platforms, store.clone()).unwrap(), store)
    }

    #[test]
    fn test_authorize_url_carries_state_and_scope() {
        let (oauth, _) = service();
        let url = oauth.authorize_url(Platform::Twitch, "abc").unwrap();
        let parsed = url::Url::parse(&url).unwrap();

        assert_eq!(parsed.host_str(), Some("id.twitch.tv"));
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "twitch-client".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("scope".into(), "user:read:email".into())));
        assert!(pairs.contains(&("state".into(), "abc".into())));
    }

    #[test]
    fn test_disabled_platform_is_rejected() {
        let (oauth, _) = service();
        let err = oauth.authorize_url(Platform::Discord, "abc").unwrap_err();
        assert!(err.to_string().contains("Unsupported Account Provider"));
        assert!(!oauth.supports_oauth(Platform::Kick));
    }

    #[tokio::test]
    async fn test_manual_code_is_stored_per_account() {
        let (oauth, store) = service();
        let code = oauth.request_manual_code(Platform::Kick, "xqc").await.unwrap();

        assert_eq!(code.len(), 32);
        assert_eq!(
            store.get("api:manual-auth:kick:xqc").await.unwrap(),
            Some(code)
        );
    }

    #[tokio::test]
    async fn test_manual_code_requires_id() {
        let (oauth, _) = service();
        let err = oauth.request_manual_code(Platform::Kick, "").await.unwrap_err();
        assert_eq!(
            err.details().unwrap().get("query"),
            Some(&json!("id"))
        );
    }

    #[tokio::test]
    async fn test_verify_without_code_is_unauthorized() {
        let (oauth, _) = service();
        assert!(matches!(
            oauth.verify_manual(Platform::Kick, "xqc").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_parse_twitch_payload() {
        let user = parse_twitch_user(&json!({
            "data": [{ "id": "22484632", "login": "forsen", "display_name": "forsen" }]
        }))
        .unwrap();
        assert_eq!(user.id, "22484632");
        assert_eq!(user.username, "forsen");

        assert!(parse_twitch_user(&json!({ "data": [] })).is_err());
    }

    #[test]
    fn test_parse_discord_prefers_global_name() {
        let user = parse_discord_user(&json!({
            "id": "1234", "username": "anatole", "global_name": "Anatole"
        }))
        .unwrap();
        assert_eq!(user.display_name, "Anatole");
    }

    #[test]
    fn test_parse_youtube_strips_handle_prefix() {
        let user = parse_youtube_user(&json!({
            "items": [{ "id": "UC123", "snippet": { "title": "Channel", "customUrl": "@channel" } }]
        }))
        .unwrap();
        assert_eq!(user.id, "UC123");
        assert_eq!(user.username, "channel");
    }

    #[test]
    fn test_parse_kick_connection_data() {
        let user = parse_kick_user(&json!({
            "id": 1, "user_id": 668, "slug": "xqc",
            "chatroom": { "id": 668 },
            "user": { "username": "xQc", "bio": "7tv:abcdef" }
        }))
        .unwrap();

        assert_eq!(user.id, "668");
        assert_eq!(user.display_name, "xQc");
        assert_eq!(user.data["chatroom_id"], "668");
        assert_eq!(user.data["bio"], "7tv:abcdef");
    }
}
