//! Image processor result listeners.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use seventv_core::{
    mq::{MessageQueue, subscribe},
    services::ingest::IngestService,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

/// Long-poll duration of one receive.
const RECEIVE_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultKind {
    Emote,
    Avatar,
}

/// Start one listener per results queue. Each delivery is handled on its own task.
pub fn spawn_result_listeners(
    ingest: IngestService,
    mq: Arc<dyn MessageQueue>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let settings = ingest.settings().clone();
    vec![
        spawn_listener(
            ResultKind::Emote,
            settings.results_queue,
            ingest.clone(),
            mq.clone(),
            shutdown.clone(),
        ),
        spawn_listener(
            ResultKind::Avatar,
            settings.picture_results_queue,
            ingest,
            mq,
            shutdown,
        ),
    ]
}

fn spawn_listener(
    kind: ResultKind,
    queue: String,
    ingest: IngestService,
    mq: Arc<dyn MessageQueue>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(queue = %queue, ?kind, "listening for processing results");
        let deliveries = subscribe(mq, queue.clone(), RECEIVE_WAIT);
        tokio::pin!(deliveries);

        loop {
            tokio::select! {
                next = deliveries.next() => {
                    let Some(msg) = next else { break };
                    let ingest = ingest.clone();
                    tokio::spawn(async move {
                        match kind {
                            ResultKind::Emote => ingest.process_emote_delivery(msg.as_ref()).await,
                            ResultKind::Avatar => ingest.process_avatar_delivery(msg.as_ref()).await,
                        }
                    });
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!(queue = %queue, "result listener stopped");
    })
}
