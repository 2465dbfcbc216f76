//! Redis backends for the emote platform.
//!
//! - **Message queue**: reliable list queue with visibility deadlines
//! - **Events**: batched dispatch fan-out over pub/sub
//! - **Store**: shared keys, rate limit counters and locks
//! - **Listeners**: image processor result consumers
//! - **Jobs**: apalis asset cleanup

pub mod cleanup;
pub mod connection;
pub mod events;
pub mod jobs;
pub mod listeners;
pub mod mq;
pub mod store;
pub mod workers;

pub use cleanup::QueuedAssetCleanup;
pub use connection::connect;
pub use events::RedisEventPublisher;
pub use jobs::*;
pub use listeners::spawn_result_listeners;
pub use mq::RedisMessageQueue;
pub use store::RedisStore;
pub use workers::*;
