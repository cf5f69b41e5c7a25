#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! Redis storage for httpstash.
//!
//! A physical resource (a "table") is a group of Redis keys sharing the hash
//! tag `{table}`: a marker hash `{table}:meta` and one hash per namespace,
//! `{table}:ns:{namespace}`. Keeping every key of a table in one hash slot
//! lets a whole table live on a single cluster node.

pub mod backend;
pub mod error;

#[doc(inline)]
pub use crate::backend::{RedisStorage, RedisStorageBuilder};
#[doc(inline)]
pub use crate::error::Error;
