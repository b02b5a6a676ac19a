//! Tiered key-value storage for tracked package metrics.
//!
//! Writers and readers go through [`Storage`], which prefers the durable
//! [`blob::HttpBlobStore`] and degrades to an in-process [`backend::MemoryStore`]
//! whenever the durable store cannot be built or a call to it fails.

pub mod backend;
pub mod blob;
pub mod config;
pub mod keys;
pub mod metrics_defs;
pub mod registry;
pub mod storage;
pub mod types;

pub use backend::{KeyValueStore, MemoryStore, StoreError};
pub use keys::KeyAliaser;
pub use registry::{ConfigRegistry, SeedOutcome};
pub use storage::{Probe, Storage, Tier};
