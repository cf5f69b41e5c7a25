#![warn(missing_docs)]
//! Storage contract for httpstash backends.
//!
//! If you want to implement your own storage, you are in the right place.
//!
//! A [`Storage`] is one logical namespace inside a physical resource (a
//! table). Every operation addresses entries by the composite
//! `(namespace, key)` pair, so several namespaces can share one resource
//! without seeing each other's keys.
//!
//! - [`Storage`] - async key-value contract with batched deletion
//! - [`format`] - value serialization formats
//! - [`provision`] - idempotent resource bootstrap with readiness polling
//! - [`MemoryStorage`] - in-process storage following the same contract
mod error;
pub mod format;
pub mod memory;
pub mod provision;
mod storage;

pub use error::StorageError;
pub use memory::{MemoryServer, MemoryStorage};
pub use provision::{Provision, ReadinessPolicy, ensure_resource};
pub use storage::{
    DEFAULT_BATCH_SIZE, KeyStream, Storage, StorageExt, StorageResult, chunked,
};
