use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::LOCATION;
use http::{HeaderMap, StatusCode};
use httpstash_backend::format::{Format, FormatError};
use httpstash_core::expiration::ceil_seconds;
use httpstash_core::{ExpireAfter, Raw, resolve};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::headers;
use crate::{CachedHttpResponse, CachedRequest, FetchedResponse};

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Something a [`CachedResponse`] can be built from.
///
/// Implemented for live [`FetchedResponse`]s and for existing snapshots.
pub trait ResponseSource {
    /// Builds a snapshot with `overrides` applied and redirect history flattened.
    fn snapshot(&self, overrides: &SnapshotOverrides) -> CachedResponse;
}

/// Field overrides applied when building a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotOverrides {
    received_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    expires: Option<Option<DateTime<Utc>>>,
    cache_key: Option<String>,
}

impl SnapshotOverrides {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation time for live responses, which otherwise use the current time.
    ///
    /// Snapshots keep their own creation time.
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }

    /// Sets the creation time, for live responses and snapshots alike.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Sets the expiration time; `None` means the snapshot never expires.
    pub fn expires(mut self, expires: Option<DateTime<Utc>>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Sets the cache key.
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    fn apply(&self, snapshot: &mut CachedResponse) {
        if let Some(created_at) = self.created_at {
            snapshot.created_at = created_at;
        }
        if let Some(expires) = self.expires {
            snapshot.expires = expires;
        }
        if let Some(cache_key) = &self.cache_key {
            snapshot.cache_key = Some(cache_key.clone());
        }
    }
}

/// Serializable snapshot of a response and the request that produced it.
///
/// `expires == None` means the snapshot never expires. A snapshot that is
/// itself a redirect always has an empty `history`, and history entries never
/// carry history of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Status code.
    pub status_code: u16,
    /// Final URL.
    pub url: String,
    /// Reason phrase.
    pub reason: String,
    /// Response headers.
    #[serde(with = "crate::headers::pairs")]
    pub headers: HeaderMap,
    /// `Set-Cookie` values.
    pub cookies: Vec<String>,
    /// Text encoding from `Content-Type`.
    pub encoding: Option<String>,
    /// Time the original fetch took.
    pub elapsed: Duration,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// When the snapshot stops being fresh.
    pub expires: Option<DateTime<Utc>>,
    /// Response body.
    pub body: Bytes,
    /// The originating request.
    pub request: CachedRequest,
    /// Next request of the redirect chain.
    pub next: Option<CachedRequest>,
    /// Flattened redirect history, oldest first.
    pub history: Vec<CachedResponse>,
    /// Transport-level metadata.
    pub raw: CachedHttpResponse,
    /// Key the snapshot was read from. Not stored.
    #[serde(skip)]
    pub cache_key: Option<String>,
}

impl CachedResponse {
    /// Builds a snapshot from a live response or from another snapshot.
    pub fn from_response<S>(source: &S, overrides: SnapshotOverrides) -> Self
    where
        S: ResponseSource + ?Sized,
    {
        source.snapshot(&overrides)
    }

    /// Enforces the history invariant.
    ///
    /// A redirect keeps no history; otherwise every history entry loses its
    /// own history.
    pub fn convert_redirects(&mut self) {
        if self.is_redirect() {
            self.history.clear();
            return;
        }
        for entry in &mut self.history {
            entry.history.clear();
        }
    }

    /// Returns `true` for a redirect status with a `Location` header.
    pub fn is_redirect(&self) -> bool {
        is_redirect(self.status_code, &self.headers)
    }

    /// Status as an [`http::StatusCode`].
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status_code).ok()
    }

    /// Returns `true` if the snapshot has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| now >= expires)
    }

    /// Whole seconds until expiration, rounded up.
    ///
    /// `None` if the snapshot never expires or has already expired.
    pub fn ttl_at(&self, now: DateTime<Utc>) -> Option<i64> {
        match self.expires {
            Some(expires) if now < expires => Some(ceil_seconds(expires - now)),
            _ => None,
        }
    }

    /// Stores a new expiration and returns whether the snapshot is now expired.
    pub fn reset_expiration(&mut self, expire_after: Option<&ExpireAfter>, now: DateTime<Utc>) -> bool {
        self.expires = resolve(expire_after, now);
        debug!(url = %self.url, expires = ?self.expires, "Reset response expiration");
        self.is_expired_at(now)
    }

    /// Summary line with freshness judged at `now`.
    pub fn display_at(&self, now: DateTime<Utc>) -> DisplayAt<'_> {
        DisplayAt { response: self, now }
    }

    /// Body size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Encodes the snapshot.
    pub fn serialize<F: Format>(&self, format: &F) -> Result<Raw, FormatError> {
        format.serialize(self)
    }

    /// Decodes a snapshot and rebuilds the state that is not stored.
    pub fn deserialize<F: Format>(data: &[u8], format: &F) -> Result<Self, FormatError> {
        let mut response: Self = format.deserialize(data)?;
        response.restore();
        Ok(response)
    }

    fn restore(&mut self) {
        if self.raw.body_is_empty() && !self.body.is_empty() {
            self.raw.reset(self.body.clone());
        }
        if self.raw.headers.is_empty() {
            self.raw.headers = self.headers.clone();
        }
        for entry in &mut self.history {
            entry.restore();
        }
    }
}

impl ResponseSource for CachedResponse {
    fn snapshot(&self, overrides: &SnapshotOverrides) -> CachedResponse {
        let mut snapshot = self.clone();
        overrides.apply(&mut snapshot);
        snapshot.convert_redirects();
        snapshot
    }
}

impl ResponseSource for FetchedResponse {
    fn snapshot(&self, overrides: &SnapshotOverrides) -> CachedResponse {
        let mut snapshot = snapshot_entry(self, overrides);
        if !snapshot.is_redirect() {
            let entry_overrides = SnapshotOverrides::new().created_at(snapshot.created_at);
            snapshot.history = self
                .history
                .iter()
                .map(|entry| snapshot_entry(entry, &entry_overrides))
                .collect();
        }
        snapshot
    }
}

fn snapshot_entry(fetched: &FetchedResponse, overrides: &SnapshotOverrides) -> CachedResponse {
    let response_headers = fetched.headers();
    let status = fetched.status();
    let mut snapshot = CachedResponse {
        status_code: status.as_u16(),
        url: fetched.url.clone(),
        reason: status.canonical_reason().unwrap_or_default().to_owned(),
        headers: response_headers.clone(),
        cookies: headers::cookies(response_headers),
        encoding: headers::encoding(response_headers),
        elapsed: fetched.elapsed,
        created_at: overrides.received_at.unwrap_or_else(Utc::now),
        expires: None,
        body: fetched.body().clone(),
        request: fetched.request.clone(),
        next: fetched.next.clone(),
        history: Vec::new(),
        raw: CachedHttpResponse::from_response(&fetched.response),
        cache_key: None,
    };
    overrides.apply(&mut snapshot);
    snapshot
}

pub(crate) fn is_redirect(status: u16, headers: &HeaderMap) -> bool {
    REDIRECT_STATUSES.contains(&status) && headers.contains_key(LOCATION)
}

/// Summary of a [`CachedResponse`] with freshness judged at a fixed time.
///
/// Returned by [`CachedResponse::display_at`].
#[derive(Debug)]
pub struct DisplayAt<'a> {
    response: &'a CachedResponse,
    now: DateTime<Utc>,
}

impl fmt::Display for DisplayAt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.response;
        write!(
            f,
            "<CachedResponse [{}]: created: {}, expires: {} ({}), size: {}, request: {}>",
            response.status_code,
            format_datetime(Some(response.created_at)),
            format_datetime(response.expires),
            if response.is_expired_at(self.now) { "stale" } else { "fresh" },
            format_file_size(response.size()),
            response.request,
        )
    }
}

/// Judges freshness against the wall clock; use [`CachedResponse::display_at`]
/// with a [`Clock`](httpstash_core::Clock) reading otherwise.
impl fmt::Display for CachedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_at(Utc::now()).fmt(f)
    }
}

fn format_datetime(value: Option<DateTime<Utc>>) -> String {
    match value {
        Some(value) => value.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "N/A".to_owned(),
    }
}

/// Formats a byte count as `bytes`, `KiB`, `MiB` or `GiB`.
///
/// ```
/// use httpstash_http::format_file_size;
///
/// assert_eq!(format_file_size(12), "12 bytes");
/// assert_eq!(format_file_size(1536), "1.50 KiB");
/// ```
pub fn format_file_size(n_bytes: usize) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if n_bytes < 1024 {
        return format!("{n_bytes} bytes");
    }
    let mut size = n_bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use http::Response;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn fetched(status: u16, location: Option<&str>, body: &'static [u8]) -> FetchedResponse {
        let mut builder = Response::builder().status(status);
        if let Some(location) = location {
            builder = builder.header(LOCATION, location);
        }
        let request = CachedRequest {
            method: "GET".to_owned(),
            url: "https://example.com/start".to_owned(),
            ..Default::default()
        };
        FetchedResponse::new(request, builder.body(Bytes::from_static(body)).unwrap())
    }

    fn snapshot_at(expires: Option<DateTime<Utc>>) -> CachedResponse {
        CachedResponse::from_response(
            &fetched(200, None, b"hello"),
            SnapshotOverrides::new().created_at(now()).expires(expires),
        )
    }

    #[test]
    fn test_expired_snapshot_has_no_ttl() {
        let snapshot = snapshot_at(Some(now() - TimeDelta::seconds(1)));
        assert!(snapshot.is_expired_at(now()));
        assert_eq!(snapshot.ttl_at(now()), None);
    }

    #[test]
    fn test_fresh_snapshot_ttl() {
        let snapshot = snapshot_at(Some(now() + TimeDelta::seconds(60)));
        assert!(!snapshot.is_expired_at(now()));
        assert_eq!(snapshot.ttl_at(now()), Some(60));
        assert_eq!(
            snapshot.ttl_at(now() + TimeDelta::milliseconds(500)),
            Some(60)
        );
    }

    #[test]
    fn test_never_expiring_snapshot() {
        let snapshot = snapshot_at(None);
        assert!(!snapshot.is_expired_at(now() + TimeDelta::days(365_000)));
        assert_eq!(snapshot.ttl_at(now()), None);
    }

    #[test]
    fn test_reset_expiration() {
        let mut snapshot = snapshot_at(None);
        assert!(snapshot.reset_expiration(Some(&ExpireAfter::Immediately), now()));
        assert!(!snapshot.reset_expiration(Some(&ExpireAfter::Seconds(30)), now()));
        assert_eq!(snapshot.expires, Some(now() + TimeDelta::seconds(30)));
        assert!(!snapshot.reset_expiration(None, now()));
        assert_eq!(snapshot.expires, None);
    }

    #[test]
    fn test_redirect_flattening() {
        let nested = fetched(301, Some("/a"), b"").with_history(vec![fetched(302, Some("/b"), b"")]);
        let plain = fetched(307, Some("/final"), b"");
        let response = fetched(200, None, b"done").with_history(vec![nested, plain]);

        let snapshot = CachedResponse::from_response(&response, SnapshotOverrides::new());
        assert_eq!(snapshot.history.len(), 2);
        assert!(snapshot.history.iter().all(|entry| entry.history.is_empty()));
        assert_eq!(snapshot.history[0].status_code, 301);
        assert_eq!(snapshot.history[1].status_code, 307);
    }

    #[test]
    fn test_redirect_keeps_no_history() {
        let response =
            fetched(302, Some("/next"), b"").with_history(vec![fetched(301, Some("/x"), b"")]);
        let snapshot = CachedResponse::from_response(&response, SnapshotOverrides::new());
        assert!(snapshot.is_redirect());
        assert!(snapshot.history.is_empty());
    }

    #[test]
    fn test_redirect_status_without_location_is_not_a_redirect() {
        let snapshot = CachedResponse::from_response(&fetched(301, None, b""), SnapshotOverrides::new());
        assert!(!snapshot.is_redirect());
    }

    #[test]
    fn test_evolve_from_snapshot() {
        let original = snapshot_at(None);
        let mut nested = original.clone();
        nested.history = vec![original.clone()];
        let mut with_history = original.clone();
        with_history.history = vec![nested];

        let evolved = CachedResponse::from_response(
            &with_history,
            SnapshotOverrides::new()
                .expires(Some(now()))
                .cache_key("abc"),
        );
        assert_eq!(evolved.expires, Some(now()));
        assert_eq!(evolved.cache_key.as_deref(), Some("abc"));
        assert_eq!(evolved.created_at, original.created_at);
        assert_eq!(evolved.history.len(), 1);
        assert!(evolved.history[0].history.is_empty());
    }

    #[test]
    fn test_display() {
        let snapshot = snapshot_at(Some(now()));
        assert_eq!(
            snapshot.to_string(),
            "<CachedResponse [200]: created: 2023-11-14 22:13:20 UTC, \
             expires: 2023-11-14 22:13:20 UTC (stale), size: 5 bytes, \
             request: GET https://example.com/start>"
        );
    }

    #[test]
    fn test_display_at_fixed_time() {
        let snapshot = snapshot_at(Some(now()));
        let summary = "<CachedResponse [200]: created: 2023-11-14 22:13:20 UTC, \
             expires: 2023-11-14 22:13:20 UTC ({}), size: 5 bytes, \
             request: GET https://example.com/start>";
        assert_eq!(
            snapshot.display_at(now() - TimeDelta::seconds(1)).to_string(),
            summary.replace("{}", "fresh")
        );
        assert_eq!(
            snapshot.display_at(now()).to_string(),
            summary.replace("{}", "stale")
        );
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 bytes");
        assert_eq!(format_file_size(1023), "1023 bytes");
        assert_eq!(format_file_size(1024), "1.00 KiB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(format_file_size(4096 * 1024 * 1024 * 1024), "4096.00 GiB");
    }
}
