//! Redis connections.

use fred::clients::Client;
use fred::interfaces::ClientLike;
use fred::types::config::Config as RedisConfig;
use seventv_common::{AppError, AppResult};
use tracing::info;

/// Map a fred error into the app taxonomy.
pub(crate) fn redis_err(e: fred::error::Error) -> AppError {
    AppError::Redis(e.to_string())
}

/// Connect a fred client and wait until it is ready.
pub async fn connect(url: &str) -> AppResult<Client> {
    let config = RedisConfig::from_url(url).map_err(redis_err)?;
    let client = Client::new(config, None, None, None);
    client.init().await.map_err(redis_err)?;
    info!("connected to redis");
    Ok(client)
}
