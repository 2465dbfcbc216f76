//! Domain layer of the emote platform API.
//!
//! - [`services`]: authentication, the mutation engine and the ingestion pipeline
//! - [`events`]: change maps and the dispatch front used by every mutation
//! - [`mq`] and [`store`]: gateways to the message queue and the shared memory store
//! - [`builder`], [`loader`], [`locks`]: one-shot update builders, batched loads and
//!   per-entity locks
//! - [`probe`] and [`validation`]: upload inspection and field validators

pub mod builder;
pub mod events;
pub mod loader;
pub mod locks;
pub mod mq;
pub mod probe;
pub mod services;
pub mod store;
pub mod validation;

pub use builder::Builder;
pub use loader::{EmoteLoader, UserLoader};
pub use events::{EventPublisher, EventType, Events};
pub use mq::{IncomingMessage, MessageQueue, OutgoingMessage};
pub use services::*;
pub use store::SharedStore;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};

    /// An empty Postgres mock.
    pub fn mock() -> MockDatabase {
        MockDatabase::new(DatabaseBackend::Postgres)
    }

    /// Turn a mock into a shared connection.
    pub fn conn(mock: MockDatabase) -> Arc<DatabaseConnection> {
        Arc::new(mock.into_connection())
    }

    /// A connection with no prepared results.
    pub fn empty() -> Arc<DatabaseConnection> {
        conn(mock())
    }
}
