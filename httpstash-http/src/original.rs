//! Cache-aware responses returned to callers.
//!
//! A caller either gets a live response from the network ([`OriginalResponse`])
//! or a stored snapshot ([`CachedResponse`]). [`Response`] tags the two and
//! both expose their cache metadata through [`CacheAware`].

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};

use crate::{CachedResponse, FetchedResponse};

/// Cache metadata shared by live and cached responses.
pub trait CacheAware {
    /// `true` if the response was read from the cache.
    fn from_cache(&self) -> bool;

    /// `true` if the response is expired at `now`.
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool;

    /// `true` if the response is expired by the wall clock.
    ///
    /// Callers holding a [`Clock`](httpstash_core::Clock) should use
    /// [`CacheAware::is_expired_at`] with its reading instead.
    fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Key the response is stored under, if any.
    fn cache_key(&self) -> Option<&str>;

    /// When the response was received or snapshotted.
    fn created_at(&self) -> DateTime<Utc>;

    /// When the stored copy expires, if it was stored with an expiration.
    fn expires(&self) -> Option<DateTime<Utc>>;
}

/// A live response decorated with cache metadata.
///
/// `cache_key` and `expires` are only set when the response was written to
/// the cache.
#[derive(Debug, Clone)]
pub struct OriginalResponse {
    /// The response as returned by the transport.
    pub response: FetchedResponse,
    /// Key the response was stored under.
    pub cache_key: Option<String>,
    /// When the response was received.
    pub created_at: DateTime<Utc>,
    /// Expiration of the stored copy.
    pub expires: Option<DateTime<Utc>>,
}

impl OriginalResponse {
    /// Wraps a live response.
    pub fn wrap(
        response: FetchedResponse,
        cache_key: Option<String>,
        created_at: DateTime<Utc>,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            response,
            cache_key,
            created_at,
            expires,
        }
    }

    /// Returns the wrapped response.
    pub fn into_inner(self) -> FetchedResponse {
        self.response
    }
}

impl CacheAware for OriginalResponse {
    fn from_cache(&self) -> bool {
        false
    }

    fn is_expired_at(&self, _now: DateTime<Utc>) -> bool {
        false
    }

    fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }
}

impl CacheAware for CachedResponse {
    fn from_cache(&self) -> bool {
        true
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        CachedResponse::is_expired_at(self, now)
    }

    fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }
}

/// A response handed back by the cache: either live or cached.
#[derive(Debug, Clone)]
pub enum Response {
    /// Fetched from the network.
    Original(OriginalResponse),
    /// Read from storage.
    Cached(CachedResponse),
}

impl Response {
    /// Response status.
    pub fn status(&self) -> StatusCode {
        match self {
            Response::Original(response) => response.response.status(),
            Response::Cached(response) => response
                .status()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        match self {
            Response::Original(response) => response.response.headers(),
            Response::Cached(response) => &response.headers,
        }
    }

    /// Response body.
    pub fn body(&self) -> &Bytes {
        match self {
            Response::Original(response) => response.response.body(),
            Response::Cached(response) => &response.body,
        }
    }

    /// Final URL.
    pub fn url(&self) -> &str {
        match self {
            Response::Original(response) => &response.response.url,
            Response::Cached(response) => &response.url,
        }
    }

    /// Returns the snapshot if the response came from the cache.
    pub fn as_cached(&self) -> Option<&CachedResponse> {
        match self {
            Response::Cached(response) => Some(response),
            Response::Original(_) => None,
        }
    }

    /// Returns the live response if it came from the network.
    pub fn as_original(&self) -> Option<&OriginalResponse> {
        match self {
            Response::Original(response) => Some(response),
            Response::Cached(_) => None,
        }
    }
}

impl CacheAware for Response {
    fn from_cache(&self) -> bool {
        match self {
            Response::Original(response) => response.from_cache(),
            Response::Cached(response) => response.from_cache(),
        }
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Response::Original(response) => CacheAware::is_expired_at(response, now),
            Response::Cached(response) => CacheAware::is_expired_at(response, now),
        }
    }

    fn cache_key(&self) -> Option<&str> {
        match self {
            Response::Original(response) => CacheAware::cache_key(response),
            Response::Cached(response) => CacheAware::cache_key(response),
        }
    }

    fn created_at(&self) -> DateTime<Utc> {
        match self {
            Response::Original(response) => response.created_at,
            Response::Cached(response) => response.created_at,
        }
    }

    fn expires(&self) -> Option<DateTime<Utc>> {
        match self {
            Response::Original(response) => response.expires,
            Response::Cached(response) => response.expires,
        }
    }
}

impl From<OriginalResponse> for Response {
    fn from(response: OriginalResponse) -> Self {
        Response::Original(response)
    }
}

impl From<CachedResponse> for Response {
    fn from(response: CachedResponse) -> Self {
        Response::Cached(response)
    }
}
