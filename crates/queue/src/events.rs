//! Event fan-out over Redis pub/sub.
//!
//! Dispatches are buffered and flushed every [`FLUSH_INTERVAL`] through one
//! pipeline. Every message goes to [`DISPATCH_CHANNEL`] and to one typed
//! channel per condition.

use std::time::Duration;

use fred::clients::Client;
use fred::interfaces::PubsubInterface;
use seventv_common::{AppError, AppResult};
use seventv_core::events::{DispatchMessage, EventPublisher};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

pub const DISPATCH_CHANNEL: &str = "events:op:dispatch";

pub const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Every `(channel, payload)` pair a dispatch is published as.
pub fn channels_for(message: &DispatchMessage) -> AppResult<Vec<(String, String)>> {
    let payload = serde_json::to_string(message)?;
    let mut out = vec![(DISPATCH_CHANNEL.to_string(), payload.clone())];
    out.extend(
        message
            .type_keys()
            .into_iter()
            .map(|suffix| (format!("{DISPATCH_CHANNEL}.{suffix}"), payload.clone())),
    );
    Ok(out)
}

/// Buffered publisher. Dropping every clone flushes and stops the task.
#[derive(Clone)]
pub struct RedisEventPublisher {
    tx: mpsc::UnboundedSender<DispatchMessage>,
}

impl RedisEventPublisher {
    /// Start the flush task on `client`.
    pub fn spawn(client: Client) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<DispatchMessage>();

        let handle = tokio::spawn(async move {
            let mut buffer = Vec::new();
            let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(message) => buffer.push(message),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if !buffer.is_empty() {
                            flush(&client, std::mem::take(&mut buffer)).await;
                        }
                    }
                }
            }
            if !buffer.is_empty() {
                flush(&client, buffer).await;
            }
            info!("event publisher stopped");
        });

        (Self { tx }, handle)
    }
}

async fn flush(client: &Client, batch: Vec<DispatchMessage>) {
    let pipeline = client.pipeline();
    let mut queued = 0usize;
    for message in &batch {
        let channels = match channels_for(message) {
            Ok(channels) => channels,
            Err(e) => {
                error!(error = %e, "failed to encode dispatch");
                continue;
            }
        };
        for (channel, payload) in channels {
            if let Err(e) = pipeline.publish::<(), _, _>(channel, payload).await {
                error!(error = %e, "failed to queue dispatch");
                continue;
            }
            queued += 1;
        }
    }

    if queued == 0 {
        return;
    }
    match pipeline.all::<Vec<i64>>().await {
        Ok(_) => debug!(events = batch.len(), publishes = queued, "flushed dispatches"),
        Err(e) => error!(error = %e, events = batch.len(), "failed to flush dispatches"),
    }
}

impl EventPublisher for RedisEventPublisher {
    fn publish(&self, message: DispatchMessage) -> AppResult<()> {
        self.tx
            .send(message)
            .map_err(|_| AppError::Internal("event publisher stopped".to_string()))
    }
}
