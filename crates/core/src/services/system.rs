//! The singleton system row: global emote set and client configuration.

use seventv_common::{AppError, AppResult, EntityKind};
use seventv_db::repositories::SystemRepository;
use serde_json::Value;

/// Alias accepted wherever an emote set id is expected.
pub const GLOBAL_SET_ALIAS: &str = "GLOBAL";

/// Client configurations that can be fetched by name.
pub const CONFIG_NAMES: [&str; 2] = ["extension", "extension-beta"];

#[derive(Clone)]
pub struct SystemService {
    system: SystemRepository,
}

impl SystemService {
    #[must_use]
    pub const fn new(system: SystemRepository) -> Self {
        Self { system }
    }

    /// Resolve the `GLOBAL` alias to the configured global emote set id.
    pub async fn resolve_set_id(&self, id: &str) -> AppResult<String> {
        if !id.eq_ignore_ascii_case(GLOBAL_SET_ALIAS) {
            return Ok(id.to_string());
        }

        self.system
            .get()
            .await?
            .emote_set_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::unknown(EntityKind::EmoteSet, "No global emote set"))
    }

    /// A named client configuration document.
    pub async fn config(&self, name: &str) -> AppResult<Value> {
        if !CONFIG_NAMES.contains(&name) {
            return Err(AppError::invalid("Invalid config name"));
        }

        let system = self.system.get().await?;
        let key = name.replace('-', "_");
        Ok(system.config.get(&key).cloned().unwrap_or(Value::Null))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{conn, empty, mock};
    use serde_json::json;
    use seventv_db::entities::system::{self, SYSTEM_ID};

    fn row() -> system::Model {
        system::Model {
            id: SYSTEM_ID.to_string(),
            emote_set_id: Some("62cdd34e72a832540de95857".to_string()),
            config: json!({
                "extension": { "version": "3.0.0" },
                "extension_beta": { "version": "3.1.0-beta" },
            }),
        }
    }

    #[tokio::test]
    async fn test_plain_ids_pass_through() {
        let service = SystemService::new(SystemRepository::new(empty()));
        assert_eq!(
            service.resolve_set_id("60ae434d1aa1d1b2f8d4a5c7").await.unwrap(),
            "60ae434d1aa1d1b2f8d4a5c7"
        );
    }

    #[tokio::test]
    async fn test_global_alias_resolves() {
        let service =
            SystemService::new(SystemRepository::new(conn(mock().append_query_results([[row()]]))));
        assert_eq!(
            service.resolve_set_id("GLOBAL").await.unwrap(),
            "62cdd34e72a832540de95857"
        );
    }

    #[tokio::test]
    async fn test_config_by_name() {
        let service =
            SystemService::new(SystemRepository::new(conn(mock().append_query_results([[row()]]))));
        assert_eq!(
            service.config("extension-beta").await.unwrap(),
            json!({ "version": "3.1.0-beta" })
        );
    }

    #[tokio::test]
    async fn test_unknown_config_name() {
        let service = SystemService::new(SystemRepository::new(empty()));
        let err = service.config("website").await.unwrap_err();
        assert!(err.to_string().contains("Invalid config name"));
    }
}
