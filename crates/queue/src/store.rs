//! Shared memory store on Redis.

use std::time::Duration;

use async_trait::async_trait;
use fred::clients::Client;
use fred::interfaces::{ClientLike, KeysInterface, LuaInterface, PubsubInterface};
use fred::types::{Expiration, SetOptions};
use seventv_common::AppResult;
use seventv_core::store::SharedStore;

use crate::connection::redis_err;

/// Increment a counter, opening its window on first hit. Returns `{count, ttl}`.
const HIT_SCRIPT: &str = r"
local existed = redis.call('EXISTS', KEYS[1])
local count = redis.call('INCRBY', KEYS[1], ARGV[1])
if existed == 0 then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return {count, redis.call('TTL', KEYS[1])}
";

fn seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

#[derive(Clone)]
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.client
            .set::<(), _, _>(key, value, Some(Expiration::EX(seconds(ttl))), None, false)
            .await
            .map_err(redis_err)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.client.get(key).await.map_err(redis_err)
    }

    async fn del(&self, key: &str) -> AppResult<()> {
        self.client.del::<i64, _>(key).await.map_err(redis_err)?;
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> AppResult<()> {
        self.client
            .publish::<i64, _, _>(channel, message)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn hit(&self, key: &str, by: i64, window: Duration) -> AppResult<(i64, i64)> {
        let reply: Vec<i64> = self
            .client
            .eval(
                HIT_SCRIPT,
                vec![key.to_string()],
                vec![by.to_string(), seconds(window).to_string()],
            )
            .await
            .map_err(redis_err)?;
        match reply.as_slice() {
            [count, ttl] => Ok((*count, *ttl)),
            _ => Err(seventv_common::AppError::Redis(format!(
                "unexpected rate limit reply: {reply:?}"
            ))),
        }
    }

    async fn try_lock(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let taken: Option<String> = self
            .client
            .set(
                key,
                "1",
                Some(Expiration::EX(seconds(ttl))),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(redis_err)?;
        Ok(taken.is_some())
    }

    async fn ping(&self) -> AppResult<()> {
        self.client.ping::<()>(None).await.map_err(redis_err)
    }
}
