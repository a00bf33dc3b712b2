#![deny(missing_docs)]

//! A bounded recency store for entity positions.
//!
//! Position updates are kept per entity in a newest-first list capped at
//! [`RECENCY_CAPACITY`] entries. The cap is enforced by evicting the oldest
//! entry and pushing the newest one inside a single optimistic (watch-based)
//! transaction against a networked key/list store.
//!
//! The crate also ships that store: a TCP server with pluggable storage
//! engines, and a managed client implementing [`KeyValueStore`].

mod client;
mod common;
mod engines;
mod error;
pub mod recency;
mod server;
mod service;
pub mod store;
/// Thread pool implementations for concurrent connection handling.
pub mod thread_pool;

pub use common::{Command, Reply, Request, Response};
pub use engines::{ListEngine, MemoryEngine, SledEngine};
pub use error::{GeoError, Result};
pub use recency::{push_bounded, storage_key, RECENCY_CAPACITY};
pub use server::StoreServer;
pub use service::{GeoService, Ingest, Latest, Position, Rejection, ServiceConfig};
pub use store::{
    Batch, KeyValueStore, ManagedStoreClient, RecordingStore, StoreCall, StoreConfig,
    TransactionOutcome, TransactionReader,
};
pub use thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
