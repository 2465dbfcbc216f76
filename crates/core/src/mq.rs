//! Message queue gateway.
//!
//! The image processor is driven through a queue: jobs are published with a
//! `reply_to` queue and results are consumed from it. Deliveries must be
//! acked, nacked or extended while they are being handled.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use seventv_common::AppResult;
use tokio::time::{Instant, interval_at};
use tracing::{error, warn};

/// How often a running handler extends its delivery.
pub const EXTEND_EVERY: Duration = Duration::from_secs(10);

/// How far each extension pushes the visibility deadline.
pub const EXTEND_BY: Duration = Duration::from_secs(30);

/// A message to publish.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    /// Target queue.
    pub queue: String,
    /// Payload.
    pub body: Bytes,
    /// Payload MIME type.
    pub content_type: String,
    /// Queue the consumer should answer on.
    pub reply_to: Option<String>,
    /// Extra headers.
    pub headers: HashMap<String, String>,
}

impl OutgoingMessage {
    /// A JSON message for `queue`.
    pub fn json<T: serde::Serialize>(queue: impl Into<String>, body: &T) -> AppResult<Self> {
        Ok(Self {
            queue: queue.into(),
            body: Bytes::from(serde_json::to_vec(body)?),
            content_type: "application/json".to_string(),
            ..Default::default()
        })
    }

    /// Set the reply queue.
    #[must_use]
    pub fn reply_to(mut self, queue: impl Into<String>) -> Self {
        self.reply_to = Some(queue.into());
        self
    }
}

/// A delivery received from a queue.
#[async_trait]
pub trait IncomingMessage: Send + Sync {
    /// Payload.
    fn body(&self) -> &[u8];

    /// Headers sent with the message.
    fn headers(&self) -> &HashMap<String, String>;

    /// Remove the message from the queue.
    async fn ack(&self) -> AppResult<()>;

    /// Return the message to the queue for redelivery.
    async fn nack(&self) -> AppResult<()>;

    /// Push the visibility deadline of this delivery.
    async fn extend(&self, by: Duration) -> AppResult<()>;
}

/// Queue backend.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish a message.
    async fn publish(&self, message: OutgoingMessage) -> AppResult<()>;

    /// Wait up to `wait` for the next delivery of `queue`.
    async fn receive(
        &self,
        queue: &str,
        wait: Duration,
    ) -> AppResult<Option<Box<dyn IncomingMessage>>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> AppResult<()>;
}

/// Endless stream of deliveries from `queue`.
///
/// Receive failures are logged and retried after a second. Drop the stream to stop.
pub fn subscribe(
    mq: Arc<dyn MessageQueue>,
    queue: String,
    wait: Duration,
) -> impl Stream<Item = Box<dyn IncomingMessage>> + Send {
    futures::stream::unfold((mq, queue), move |(mq, queue)| async move {
        loop {
            match mq.receive(&queue, wait).await {
                Ok(Some(msg)) => return Some((msg, (mq, queue))),
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, queue = %queue, "Failed to receive from queue");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    })
}

/// Drive `fut` while extending `msg` every [`EXTEND_EVERY`] by [`EXTEND_BY`].
pub async fn with_extension<F, T>(msg: &dyn IncomingMessage, fut: F) -> T
where
    F: Future<Output = T>,
{
    let mut ticker = interval_at(Instant::now() + EXTEND_EVERY, EXTEND_EVERY);
    tokio::pin!(fut);

    loop {
        tokio::select! {
            out = &mut fut => return out,
            _ = ticker.tick() => {
                if let Err(e) = msg.extend(EXTEND_BY).await {
                    warn!(error = %e, "Failed to extend delivery");
                }
            }
        }
    }
}

/// Outcome of an in-memory delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Not settled yet.
    Pending,
    /// Acked.
    Acked,
    /// Nacked and requeued.
    Nacked,
}

type Queues = Arc<Mutex<HashMap<String, VecDeque<OutgoingMessage>>>>;

/// Process-local queue for development and tests.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    queues: Queues,
    published: Arc<Mutex<Vec<OutgoingMessage>>>,
}

impl MemoryQueue {
    /// Create an empty queue set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message ever published, in order.
    #[must_use]
    pub fn published(&self) -> Vec<OutgoingMessage> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages waiting in `queue`.
    #[must_use]
    pub fn pending(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(queue)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, message: OutgoingMessage) -> AppResult<()> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(message.queue.clone())
            .or_default()
            .push_back(message);
        Ok(())
    }

    async fn receive(
        &self,
        queue: &str,
        wait: Duration,
    ) -> AppResult<Option<Box<dyn IncomingMessage>>> {
        let next = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(queue)
            .and_then(VecDeque::pop_front);

        match next {
            Some(message) => Ok(Some(Box::new(MemoryDelivery::new(message, self.queues.clone())))),
            None => {
                tokio::time::sleep(wait).await;
                Ok(None)
            }
        }
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

/// A delivery from a [`MemoryQueue`].
pub struct MemoryDelivery {
    message: OutgoingMessage,
    queues: Queues,
    settlement: Arc<Mutex<Settlement>>,
    extended: Arc<Mutex<Duration>>,
}

impl MemoryDelivery {
    /// Wrap a message that is not attached to a queue yet.
    #[must_use]
    pub fn detached(message: OutgoingMessage) -> Self {
        Self::new(message, Queues::default())
    }

    fn new(message: OutgoingMessage, queues: Queues) -> Self {
        Self {
            message,
            queues,
            settlement: Arc::new(Mutex::new(Settlement::Pending)),
            extended: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// How the delivery was settled.
    #[must_use]
    pub fn settlement(&self) -> Settlement {
        *self.settlement.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total extension granted so far.
    #[must_use]
    pub fn extended(&self) -> Duration {
        *self.extended.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IncomingMessage for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.message.headers
    }

    async fn ack(&self) -> AppResult<()> {
        *self.settlement.lock().unwrap_or_else(PoisonError::into_inner) = Settlement::Acked;
        Ok(())
    }

    async fn nack(&self) -> AppResult<()> {
        *self.settlement.lock().unwrap_or_else(PoisonError::into_inner) = Settlement::Nacked;
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.message.queue.clone())
            .or_default()
            .push_back(self.message.clone());
        Ok(())
    }

    async fn extend(&self, by: Duration) -> AppResult<()> {
        *self.extended.lock().unwrap_or_else(PoisonError::into_inner) += by;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_published_messages_are_delivered_in_order() {
        let mq = MemoryQueue::new();
        mq.publish(OutgoingMessage::json("jobs", &json!({ "n": 1 })).unwrap())
            .await
            .unwrap();
        mq.publish(OutgoingMessage::json("jobs", &json!({ "n": 2 })).unwrap())
            .await
            .unwrap();

        let stream = subscribe(Arc::new(mq.clone()), "jobs".to_string(), Duration::from_millis(5));
        let received: Vec<_> = stream.take(2).collect().await;

        let first: serde_json::Value = serde_json::from_slice(received[0].body()).unwrap();
        let second: serde_json::Value = serde_json::from_slice(received[1].body()).unwrap();
        assert_eq!(first["n"], 1);
        assert_eq!(second["n"], 2);
        assert_eq!(mq.pending("jobs"), 0);
    }

    #[tokio::test]
    async fn test_nack_requeues() {
        let mq = MemoryQueue::new();
        mq.publish(OutgoingMessage::json("results", &json!({})).unwrap())
            .await
            .unwrap();

        let msg = mq
            .receive("results", Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        msg.nack().await.unwrap();

        assert_eq!(mq.pending("results"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_handler_is_extended() {
        let delivery = MemoryDelivery::detached(OutgoingMessage::default());

        with_extension(&delivery, tokio::time::sleep(Duration::from_secs(25))).await;

        assert_eq!(delivery.extended(), EXTEND_BY * 2);
    }
}
