#![warn(missing_docs)]
//! HTTP snapshots for httpstash.
//!
//! [`CachedResponse`] is the storage-ready form of a response together with
//! the request that produced it and its flattened redirect chain. Live
//! responses enter as [`FetchedResponse`] and leave the cache as a tagged
//! [`Response`].
pub mod headers;
pub mod key;
pub mod original;
mod fetched;
mod raw;
mod request;
mod response;

pub use fetched::FetchedResponse;
pub use key::Sha256KeyGenerator;
pub use original::{CacheAware, OriginalResponse, Response};
pub use raw::CachedHttpResponse;
pub use request::CachedRequest;
pub use response::{CachedResponse, DisplayAt, ResponseSource, SnapshotOverrides, format_file_size};
