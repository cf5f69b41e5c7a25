#![warn(missing_docs)]
//! # httpstash-core
//!
//! Policy primitives shared by every httpstash crate.
//!
//! - [`expiration`] - expiration values, sentinels and per-URL patterns
//! - [`directives`] - `Cache-Control` and validator parsing
//! - [`Clock`] - the time source used by every freshness comparison
//! - [`Transport`] and [`KeyGenerator`] - the collaborators the cache relies on
//!   but does not implement

pub mod clock;
pub mod directives;
pub mod expiration;
pub mod key;
pub mod label;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use directives::{CacheDirectives, ExpireOffset, MaxStale, StaleIfError};
pub use expiration::{
    DO_NOT_CACHE, EXPIRE_IMMEDIATELY, ExpireAfter, NEVER_EXPIRE, UrlPattern, resolve,
    resolve_seconds, url_expiration, url_matches,
};
pub use key::KeyGenerator;
pub use label::StorageLabel;
pub use transport::Transport;

/// Raw byte data type used for serialized cache values.
pub type Raw = bytes::Bytes;
