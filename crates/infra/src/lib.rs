//! Infrastructure layer: storage boundary and order orchestration.
//!
//! `store` defines the transaction coordinator interface the domain depends
//! on, with in-memory (tests/dev) and Postgres (production) implementations.
//! `service` hosts the order builder and status machine on top of it.

pub mod service;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod integration_tests;

pub use service::{OrderItemRequest, OrderService};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreTx, TxError};
