//! Reliable message queue on Redis lists.
//!
//! Each queue uses three keys: the pending list, a processing list holding
//! in-flight deliveries and a sorted set of visibility deadlines. Receiving
//! moves a message atomically from pending to processing. A delivery that is
//! neither acked nor extended before its deadline is put back by the reaper.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use fred::clients::Client;
use fred::interfaces::{ClientLike, LuaInterface};
use serde::{Deserialize, Serialize};
use seventv_common::{AppError, AppResult};
use seventv_core::mq::{IncomingMessage, MessageQueue, OutgoingMessage};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::connection::redis_err;

/// How often an empty queue is polled while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

const RECEIVE_SCRIPT: &str = r"
local raw = redis.call('RPOP', KEYS[1])
if not raw then
  return false
end
redis.call('LPUSH', KEYS[2], raw)
redis.call('ZADD', KEYS[3], ARGV[1], raw)
return raw
";

const ACK_SCRIPT: &str = r"
redis.call('ZREM', KEYS[3], ARGV[1])
return redis.call('LREM', KEYS[2], 1, ARGV[1])
";

const NACK_SCRIPT: &str = r"
redis.call('ZREM', KEYS[3], ARGV[1])
local removed = redis.call('LREM', KEYS[2], 1, ARGV[1])
if removed > 0 then
  redis.call('RPUSH', KEYS[1], ARGV[1])
end
return removed
";

const EXTEND_SCRIPT: &str = r"
return redis.call('ZADD', KEYS[3], 'XX', 'CH', ARGV[2], ARGV[1])
";

const REAP_SCRIPT: &str = r"
local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', ARGV[1])
for _, raw in ipairs(expired) do
  redis.call('ZREM', KEYS[3], raw)
  if redis.call('LREM', KEYS[2], 1, raw) > 0 then
    redis.call('RPUSH', KEYS[1], raw)
  end
end
return #expired
";

/// Stored form of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Base64 payload.
    pub body: String,
}

impl Envelope {
    #[must_use]
    pub fn wrap(message: &OutgoingMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_type: message.content_type.clone(),
            reply_to: message.reply_to.clone(),
            headers: message.headers.clone(),
            body: STANDARD.encode(&message.body),
        }
    }

    pub fn payload(&self) -> AppResult<Vec<u8>> {
        STANDARD
            .decode(&self.body)
            .map_err(|e| AppError::Queue(format!("bad envelope body: {e}")))
    }
}

/// Keys backing one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub pending: String,
    pub processing: String,
    pub visibility: String,
}

impl QueueKeys {
    #[must_use]
    pub fn new(queue: &str) -> Self {
        Self {
            pending: format!("mq:{queue}"),
            processing: format!("mq:{queue}:processing"),
            visibility: format!("mq:{queue}:visibility"),
        }
    }

    fn all(&self) -> Vec<String> {
        vec![
            self.pending.clone(),
            self.processing.clone(),
            self.visibility.clone(),
        ]
    }
}

fn deadline(after: Duration) -> String {
    let millis = i64::try_from(after.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_add(millis).to_string()
}

#[derive(Clone)]
pub struct RedisMessageQueue {
    client: Client,
    visibility_timeout: Duration,
}

impl RedisMessageQueue {
    #[must_use]
    pub const fn new(client: Client, visibility_timeout: Duration) -> Self {
        Self {
            client,
            visibility_timeout,
        }
    }

    /// Requeue expired deliveries of `queues` every `every` until `shutdown` flips.
    pub fn spawn_reaper(
        &self,
        queues: Vec<String>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                for queue in &queues {
                    let keys = QueueKeys::new(queue);
                    match client
                        .eval::<i64, _, _, _>(REAP_SCRIPT, keys.all(), vec![deadline(Duration::ZERO)])
                        .await
                    {
                        Ok(0) => {}
                        Ok(n) => warn!(queue = %queue, requeued = n, "requeued expired deliveries"),
                        Err(e) => error!(error = %e, queue = %queue, "failed to reap queue"),
                    }
                }
            }
            debug!("queue reaper stopped");
        })
    }
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    async fn publish(&self, message: OutgoingMessage) -> AppResult<()> {
        let keys = QueueKeys::new(&message.queue);
        let raw = serde_json::to_string(&Envelope::wrap(&message))?;
        let _: i64 = self
            .client
            .eval(
                "return redis.call('LPUSH', KEYS[1], ARGV[1])",
                vec![keys.pending],
                vec![raw],
            )
            .await
            .map_err(redis_err)?;
        debug!(queue = %message.queue, size = message.body.len(), "published message");
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        wait: Duration,
    ) -> AppResult<Option<Box<dyn IncomingMessage>>> {
        let keys = QueueKeys::new(queue);
        let until = tokio::time::Instant::now() + wait;

        loop {
            let raw: Option<String> = self
                .client
                .eval(
                    RECEIVE_SCRIPT,
                    keys.all(),
                    vec![deadline(self.visibility_timeout)],
                )
                .await
                .map_err(redis_err)?;

            if let Some(raw) = raw {
                let delivery = RedisDelivery {
                    client: self.client.clone(),
                    keys: keys.clone(),
                    raw,
                    body: Vec::new(),
                    headers: HashMap::new(),
                };
                match serde_json::from_str::<Envelope>(&delivery.raw) {
                    Ok(envelope) => {
                        let body = envelope.payload()?;
                        let mut headers = envelope.headers;
                        headers.insert("content-type".to_string(), envelope.content_type);
                        if let Some(reply_to) = envelope.reply_to {
                            headers.insert("reply-to".to_string(), reply_to);
                        }
                        return Ok(Some(Box::new(RedisDelivery {
                            body,
                            headers,
                            ..delivery
                        })));
                    }
                    Err(e) => {
                        error!(error = %e, queue, "dropping undecodable envelope");
                        delivery.ack().await?;
                        continue;
                    }
                }
            }

            let now = tokio::time::Instant::now();
            if now >= until {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL.min(until - now)).await;
        }
    }

    async fn ping(&self) -> AppResult<()> {
        self.client.ping::<()>(None).await.map_err(redis_err)
    }
}

/// An in-flight message.
pub struct RedisDelivery {
    client: Client,
    keys: QueueKeys,
    raw: String,
    body: Vec<u8>,
    headers: HashMap<String, String>,
}

#[async_trait]
impl IncomingMessage for RedisDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    async fn ack(&self) -> AppResult<()> {
        let removed: i64 = self
            .client
            .eval(ACK_SCRIPT, self.keys.all(), vec![self.raw.clone()])
            .await
            .map_err(redis_err)?;
        if removed == 0 {
            warn!(queue = %self.keys.pending, "acked a delivery that was already requeued");
        }
        Ok(())
    }

    async fn nack(&self) -> AppResult<()> {
        let _: i64 = self
            .client
            .eval(NACK_SCRIPT, self.keys.all(), vec![self.raw.clone()])
            .await
            .map_err(redis_err)?;
        info!(queue = %self.keys.pending, "requeued delivery");
        Ok(())
    }

    async fn extend(&self, by: Duration) -> AppResult<()> {
        let _: i64 = self
            .client
            .eval(
                EXTEND_SCRIPT,
                self.keys.all(),
                vec![self.raw.clone(), deadline(by)],
            )
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}
