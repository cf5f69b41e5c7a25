//! # httpstash
//!
//! An HTTP response cache that sits between a client and its transport.
//!
//! For each request the cache decides whether to serve a stored response,
//! revalidate it with a conditional request, or fetch a fresh one, and then
//! whether the fetched response may be stored. Decisions combine the
//! [`CacheSettings`], the request's `Cache-Control` directives and, when
//! enabled, the response's cache headers.
//!
//! ```rust,ignore
//! use httpstash::{Cache, CacheSettings, CachedSession};
//!
//! let settings = CacheSettings::builder()
//!     .expire_after(std::time::Duration::from_secs(300))
//!     .cache_control(true)
//!     .build();
//! let session = CachedSession::new(transport, Cache::in_memory(), settings);
//! let response = session.send(request).await?;
//! ```
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Per-request cache decisions.
///
/// [`CacheActions`] turns settings and headers into read, revalidate and
/// write decisions.
pub mod actions;

/// Response cache with redirect aliases.
///
/// [`Cache`] keeps snapshots in a `responses` namespace and redirect aliases
/// in a `redirects` namespace of any [`Storage`](httpstash_backend::Storage).
pub mod cache;

/// Error types for cache operations.
pub mod error;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, the session counts hits, misses,
/// stale responses, revalidations, skipped writes and unsatisfiable
/// requests.
pub mod metrics;

/// Request orchestration over a transport.
pub mod session;

/// Cache configuration.
///
/// Settings are built in code with [`CacheSettings::builder`] or
/// deserialized as a [`SettingsConfig`].
pub mod settings;

pub use actions::{ActionState, CacheActions};
pub use cache::{Cache, REDIRECTS_NAMESPACE, RESPONSES_NAMESPACE};
pub use error::CacheError;
pub use session::CachedSession;
pub use settings::{CacheSettings, CacheSettingsBuilder, FilterFn, SettingsConfig, StaleIfErrorConfig};

pub use httpstash_core::{
    CacheDirectives, Clock, ExpireAfter, FixedClock, KeyGenerator, StaleIfError, SystemClock,
    Transport, UrlPattern,
};
pub use httpstash_http::{
    CacheAware, CachedRequest, CachedResponse, FetchedResponse, OriginalResponse, Response,
};

/// The `httpstash` prelude.
///
/// ```rust
/// use httpstash::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Cache, CacheAware, CacheError, CacheSettings, CachedRequest, CachedSession, ExpireAfter,
        Response,
    };
}
