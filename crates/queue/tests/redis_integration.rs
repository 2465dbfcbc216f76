//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

use std::time::Duration;

use seventv_core::{
    mq::{MessageQueue, OutgoingMessage},
    store::SharedStore,
};
use seventv_queue::{RedisMessageQueue, RedisStore, connect};

fn get_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn unique(name: &str) -> String {
    format!("test:{name}:{}", uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_connection() {
    let client = connect(&get_redis_url()).await;
    assert!(client.is_ok(), "Failed to connect to Redis: {:?}", client.err());
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_receive_then_ack() {
    let client = connect(&get_redis_url()).await.expect("Failed to connect to Redis");
    let mq = RedisMessageQueue::new(client, Duration::from_secs(30));
    let queue = unique("ack");

    mq.publish(
        OutgoingMessage::json(&queue, &serde_json::json!({"id": "1"}))
            .expect("encode")
            .reply_to("results"),
    )
    .await
    .expect("publish");

    let msg = mq
        .receive(&queue, Duration::from_secs(1))
        .await
        .expect("receive")
        .expect("a delivery");
    assert_eq!(msg.body(), br#"{"id":"1"}"#);
    assert_eq!(msg.headers().get("reply-to").map(String::as_str), Some("results"));
    msg.ack().await.expect("ack");

    let next = mq.receive(&queue, Duration::from_millis(300)).await.expect("receive");
    assert!(next.is_none());
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_nack_redelivers() {
    let client = connect(&get_redis_url()).await.expect("Failed to connect to Redis");
    let mq = RedisMessageQueue::new(client, Duration::from_secs(30));
    let queue = unique("nack");

    mq.publish(OutgoingMessage::json(&queue, &"payload").expect("encode"))
        .await
        .expect("publish");

    let first = mq.receive(&queue, Duration::from_secs(1)).await.expect("receive").expect("delivery");
    first.nack().await.expect("nack");

    let again = mq.receive(&queue, Duration::from_secs(1)).await.expect("receive").expect("redelivery");
    assert_eq!(again.body(), first.body());
    again.ack().await.expect("ack");
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_reaper_requeues_expired_delivery() {
    let client = connect(&get_redis_url()).await.expect("Failed to connect to Redis");
    let mq = RedisMessageQueue::new(client, Duration::from_millis(100));
    let queue = unique("reap");

    mq.publish(OutgoingMessage::json(&queue, &"slow").expect("encode"))
        .await
        .expect("publish");
    let _abandoned = mq.receive(&queue, Duration::from_secs(1)).await.expect("receive").expect("delivery");

    let (tx, rx) = tokio::sync::watch::channel(false);
    let reaper = mq.spawn_reaper(vec![queue.clone()], Duration::from_millis(50), rx);

    let again = mq.receive(&queue, Duration::from_secs(2)).await.expect("receive");
    assert!(again.is_some());

    tx.send(true).expect("stop reaper");
    reaper.await.expect("reaper exits");
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_hit_counts_within_window() {
    let client = connect(&get_redis_url()).await.expect("Failed to connect to Redis");
    let store = RedisStore::new(client);
    let key = unique("rl");

    let (first, ttl) = store.hit(&key, 1, Duration::from_secs(60)).await.expect("hit");
    let (second, _) = store.hit(&key, 1, Duration::from_secs(60)).await.expect("hit");

    assert_eq!((first, second), (1, 2));
    assert!(ttl > 0 && ttl <= 60);
    store.del(&key).await.expect("del");
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_try_lock_is_exclusive() {
    let client = connect(&get_redis_url()).await.expect("Failed to connect to Redis");
    let store = RedisStore::new(client);
    let key = unique("lock");

    assert!(store.try_lock(&key, Duration::from_secs(5)).await.expect("lock"));
    assert!(!store.try_lock(&key, Duration::from_secs(5)).await.expect("lock"));
    store.del(&key).await.expect("unlock");
    assert!(store.try_lock(&key, Duration::from_secs(5)).await.expect("lock"));
    store.del(&key).await.expect("cleanup");
}
