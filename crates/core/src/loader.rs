//! Batched loaders.
//!
//! Requests submitted within one window are coalesced into a single fetch.
//! Results come back in submission order; ids the fetch did not return are
//! filled with the fetcher's sentinel value.

use std::{collections::HashMap, hash::Hash, marker::PhantomData, sync::Arc, time::Duration};

use async_trait::async_trait;
use seventv_common::{AppError, AppResult};
use seventv_db::{
    entities::{emote, user},
    repositories::{EmoteRepository, UserRepository},
};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Default coalescing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(25);

/// Source of a [`BatchLoader`].
#[async_trait]
pub trait BatchFetch: Send + Sync + 'static {
    /// Key type.
    type Key: Clone + Eq + Hash + Send + Sync + 'static;
    /// Value type.
    type Value: Clone + Send + Sync + 'static;

    /// Fetch every key in one round trip.
    async fn fetch(&self, keys: &[Self::Key]) -> AppResult<HashMap<Self::Key, Self::Value>>;

    /// Value returned for a key that does not exist.
    fn missing(&self, key: &Self::Key) -> Self::Value;
}

type Reply<V> = oneshot::Sender<Result<Vec<V>, String>>;

struct Request<K, V> {
    keys: Vec<K>,
    reply: Reply<V>,
}

/// Coalesces lookups by key.
pub struct BatchLoader<F: BatchFetch> {
    tx: mpsc::UnboundedSender<Request<F::Key, F::Value>>,
    _fetcher: PhantomData<F>,
}

impl<F: BatchFetch> Clone for BatchLoader<F> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            _fetcher: PhantomData,
        }
    }
}

impl<F: BatchFetch> BatchLoader<F> {
    /// Start a loader with the default window. Must be called inside a runtime.
    pub fn new(fetcher: F) -> Self {
        Self::with_window(fetcher, DEFAULT_WINDOW)
    }

    /// Start a loader with a custom window.
    pub fn with_window(fetcher: F, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(Arc::new(fetcher), rx, window));
        Self {
            tx,
            _fetcher: PhantomData,
        }
    }

    /// Load one key.
    pub async fn load(&self, key: F::Key) -> AppResult<F::Value> {
        self.load_many(vec![key])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("loader returned no result".to_string()))
    }

    /// Load many keys, in order.
    pub async fn load_many(&self, keys: Vec<F::Key>) -> AppResult<Vec<F::Value>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { keys, reply })
            .map_err(|_| AppError::Internal("loader stopped".to_string()))?;

        rx.await
            .map_err(|_| AppError::Internal("loader dropped the request".to_string()))?
            .map_err(AppError::Database)
    }
}

async fn run<F: BatchFetch>(
    fetcher: Arc<F>,
    mut rx: mpsc::UnboundedReceiver<Request<F::Key, F::Value>>,
    window: Duration,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(req) => batch.push(req),
                    None => break,
                },
            }
        }

        let mut keys: Vec<F::Key> = Vec::new();
        for req in &batch {
            for key in &req.keys {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }

        debug!(requests = batch.len(), keys = keys.len(), "loader batch");

        let fetcher = fetcher.clone();
        tokio::spawn(async move {
            match fetcher.fetch(&keys).await {
                Ok(found) => {
                    for req in batch {
                        let values = req
                            .keys
                            .iter()
                            .map(|k| found.get(k).cloned().unwrap_or_else(|| fetcher.missing(k)))
                            .collect();
                        let _ = req.reply.send(Ok(values));
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    for req in batch {
                        let _ = req.reply.send(Err(message.clone()));
                    }
                }
            }
        });
    }
}

/// Users by id. Unknown ids load as `None`.
pub struct UserFetch(pub UserRepository);

#[async_trait]
impl BatchFetch for UserFetch {
    type Key = String;
    type Value = Option<user::Model>;

    async fn fetch(&self, keys: &[String]) -> AppResult<HashMap<String, Option<user::Model>>> {
        let found = self.0.find_by_ids(keys).await?;
        Ok(found.into_iter().map(|u| (u.id.clone(), Some(u))).collect())
    }

    fn missing(&self, _key: &String) -> Option<user::Model> {
        None
    }
}

/// Emotes by id. Unknown ids load as `None`.
pub struct EmoteFetch(pub EmoteRepository);

#[async_trait]
impl BatchFetch for EmoteFetch {
    type Key = String;
    type Value = Option<emote::Model>;

    async fn fetch(&self, keys: &[String]) -> AppResult<HashMap<String, Option<emote::Model>>> {
        let found = self.0.find_by_ids(keys).await?;
        Ok(found.into_iter().map(|e| (e.id.clone(), Some(e))).collect())
    }

    fn missing(&self, _key: &String) -> Option<emote::Model> {
        None
    }
}

pub type UserLoader = BatchLoader<UserFetch>;
pub type EmoteLoader = BatchLoader<EmoteFetch>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Squares {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BatchFetch for Squares {
        type Key = u32;
        type Value = i64;

        async fn fetch(&self, keys: &[u32]) -> AppResult<HashMap<u32, i64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(keys
                .iter()
                .filter(|k| **k != 0)
                .map(|k| (*k, i64::from(*k) * i64::from(*k)))
                .collect())
        }

        fn missing(&self, _key: &u32) -> i64 {
            -1
        }
    }

    #[tokio::test]
    async fn test_requests_in_window_are_coalesced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BatchLoader::new(Squares {
            calls: calls.clone(),
        });

        let (a, b) = tokio::join!(loader.load(3), loader.load_many(vec![2, 0, 3]));

        assert_eq!(a.unwrap(), 9);
        assert_eq!(b.unwrap(), vec![4, -1, 9]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_user_loads_as_none() {
        let known = seventv_db::fixtures::user("60ae434d1aa1d1b2f8d4a5c7", "alice");
        let db = crate::testing::conn(crate::testing::mock().append_query_results([vec![known.clone()]]));
        let loader = BatchLoader::new(UserFetch(UserRepository::new(db)));

        let loaded = loader
            .load_many(vec![known.id.clone(), "60ae434d1aa1d1b2f8d4a5ff".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded, vec![Some(known), None]);
    }
}
