//! Per-request cache decisions.
//!
//! [`CacheActions`] merges settings, request directives and response
//! directives into one decision record. The session drives it through three
//! phases:
//!
//! 1. [`CacheActions::from_request`] decides whether the cache may be read.
//! 2. [`CacheActions::update_from_cached_response`] decides whether the stored
//!    response can be served, must be revalidated, or the request cannot be
//!    satisfied at all.
//! 3. [`CacheActions::update_from_response`] decides whether a freshly fetched
//!    response may be written.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use http::HeaderMap;
use http::header::{HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};
use httpstash_core::{
    CacheDirectives, EXPIRE_IMMEDIATELY, ExpireAfter, ExpireOffset, StaleIfError, resolve,
    resolve_seconds, url_expiration,
};
use httpstash_http::{CachedRequest, CachedResponse, FetchedResponse};
use tracing::debug;

use crate::CacheSettings;

/// Lifecycle of a [`CacheActions`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    /// Read decision made, cache not consulted yet.
    ReadPending,
    /// The stored response (or its absence) has been evaluated.
    ReadDecided,
    /// A fetched response has been evaluated for writing.
    WriteDecided,
}

/// Decision record for one request.
///
/// The public fields are the outputs read by the session.
#[derive(Debug, Clone)]
pub struct CacheActions {
    /// Key created from the initial request.
    pub cache_key: String,
    /// The request cannot be satisfied from the cache and must not be sent.
    pub error_504: bool,
    /// Expiration for the response being stored or revalidated.
    pub expire_after: Option<ExpireAfter>,
    /// Send the request, possibly as a conditional request.
    pub send_request: bool,
    /// Send the request again to refresh a stale stored response.
    pub resend_request: bool,
    /// Do not read from the cache.
    pub skip_read: bool,
    /// Do not write to the cache.
    pub skip_write: bool,

    directives: CacheDirectives,
    settings: Arc<CacheSettings>,
    only_if_cached: bool,
    refresh: bool,
    stale_if_error: Option<StaleIfError>,
    validation_headers: HeaderMap,
    state: ActionState,
}

impl CacheActions {
    /// Builds the read decision from a request and the settings.
    ///
    /// `must-revalidate` is not a standard request directive. Here it marks a
    /// refresh requested by the user, the same way a request `max-age=0`
    /// does: a stored response with a validator is revalidated even if it is
    /// still fresh.
    pub fn from_request(
        cache_key: impl Into<String>,
        request: &CachedRequest,
        settings: Arc<CacheSettings>,
    ) -> Self {
        let directives = CacheDirectives::from_headers(&request.headers);
        debug!(?directives, "Cache directives from request headers");

        let only_if_cached = settings.only_if_cached || directives.only_if_cached;
        let refresh = directives.max_age == Some(EXPIRE_IMMEDIATELY) || directives.must_revalidate;
        let stale_if_error = settings
            .stale_if_error
            .clone()
            .or_else(|| directives.stale_if_error.clone());

        let expire_after = directives
            .max_age_expiration()
            .or_else(|| url_expiration(&request.url, &settings.urls_expire_after).cloned())
            .or_else(|| settings.expire_after.clone());

        let skip_read = log_criteria(
            "read",
            &[
                ("disabled cache", settings.disabled),
                ("disabled method", !settings.allows_method(&request.method)),
                (
                    "disabled by headers or refresh",
                    directives.no_cache || directives.no_store,
                ),
                (
                    "disabled by expiration",
                    expire_after.as_ref().is_some_and(ExpireAfter::is_do_not_cache),
                ),
            ],
        );

        Self {
            cache_key: cache_key.into(),
            error_504: false,
            expire_after,
            send_request: false,
            resend_request: false,
            skip_read,
            skip_write: directives.no_store,
            directives,
            settings,
            only_if_cached,
            refresh,
            stale_if_error,
            validation_headers: HeaderMap::new(),
            state: ActionState::ReadPending,
        }
    }

    /// Absolute expiration for a new or revalidated response.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        resolve(self.expire_after.as_ref(), self.now())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Settings the decisions are based on.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// `only-if-cached` from the settings or the request.
    pub fn only_if_cached(&self) -> bool {
        self.only_if_cached
    }

    /// Stale-if-error policy merged from settings and headers.
    pub fn stale_if_error(&self) -> Option<&StaleIfError> {
        self.stale_if_error.as_ref()
    }

    /// Conditional headers added to the outgoing request.
    pub fn validation_headers(&self) -> &HeaderMap {
        &self.validation_headers
    }

    /// Returns `true` if `cached` is fresh enough to satisfy the request.
    ///
    /// `min-fresh` and `max-stale` shift the expiration time. When `error` is
    /// set, the stale-if-error policy is applied instead.
    pub fn is_usable(&self, cached: Option<&CachedResponse>, error: bool) -> bool {
        let Some(cached) = cached else {
            return false;
        };
        let Some(expires) = cached.expires else {
            return true;
        };

        let now = self.now();
        let offset = match &self.stale_if_error {
            Some(StaleIfError::Always) if error => return true,
            Some(StaleIfError::Within(window)) if error => window_offset(window, now),
            _ => self.directives.expire_offset(),
        };

        match offset {
            ExpireOffset::Unlimited => true,
            ExpireOffset::Seconds(seconds) => {
                match TimeDelta::try_seconds(seconds).and_then(|delta| expires.checked_add_signed(delta)) {
                    Some(limit) => now < limit,
                    // Out of range: only a forward offset can get there.
                    None => seconds > 0,
                }
            }
        }
    }

    /// Decides what to do with the stored response, or with its absence.
    ///
    /// Also prepares validation headers when the stored response has a
    /// validator and needs revalidation.
    pub fn update_from_cached_response(&mut self, cached: Option<&CachedResponse>) {
        let usable = self.is_usable(cached, false);
        let usable_if_error = self.is_usable(cached, true);

        if !usable && self.only_if_cached && !usable_if_error {
            self.error_504 = true;
        } else if cached.is_none() {
            self.send_request = true;
        } else if !usable && !(self.only_if_cached && usable_if_error) {
            self.resend_request = true;
        }

        if let Some(cached) = cached {
            self.update_validation_headers(cached);
        }
        self.state = ActionState::ReadDecided;
        debug!(
            cache_key = %self.cache_key,
            error_504 = self.error_504,
            send_request = self.send_request,
            resend_request = self.resend_request,
            skip_read = self.skip_read,
            skip_write = self.skip_write,
            expire_after = ?self.expire_after,
            "Post-read cache actions"
        );
    }

    /// Decides whether a freshly fetched response may be written.
    pub fn update_from_response(&mut self, response: &FetchedResponse) {
        debug_assert!(
            self.state == ActionState::ReadDecided,
            "write decision made before the read decision"
        );

        let directives = CacheDirectives::from_headers(response.headers());
        if self.settings.cache_control {
            self.update_from_response_headers(&directives);
        }

        // An expired response with a validator is still stored and revalidated on use.
        let do_not_cache = self
            .expire_after
            .as_ref()
            .is_some_and(ExpireAfter::is_do_not_cache);
        let skip_stale = self
            .expire_after
            .as_ref()
            .is_some_and(ExpireAfter::is_immediately)
            && !directives.has_validator();
        let filtered_out = self
            .settings
            .filter_fn
            .as_ref()
            .is_some_and(|filter| !filter(response));

        self.skip_write = log_criteria(
            "write",
            &[
                ("disabled cache", self.settings.disabled),
                (
                    "disabled method",
                    !self.settings.allows_method(&response.request.method),
                ),
                (
                    "disabled status",
                    !self.settings.allows_code(response.status().as_u16()),
                ),
                ("disabled by filter", filtered_out),
                ("disabled by headers", self.skip_write),
                ("disabled by expiration", do_not_cache || skip_stale),
            ],
        );
        self.state = ActionState::WriteDecided;
    }

    /// Adds the validation headers, if any, to an outgoing request.
    pub fn update_request(&self, request: &mut CachedRequest) {
        for (name, value) in &self.validation_headers {
            request.headers.insert(name.clone(), value.clone());
        }
    }

    /// Refreshes a stored response after a `304 Not Modified`.
    ///
    /// The expiration is recomputed and the new response headers replace the
    /// stored headers of the same name.
    pub fn update_revalidated_response(
        &self,
        response: &FetchedResponse,
        mut cached: CachedResponse,
    ) -> CachedResponse {
        debug!(url = %response.request.url, "Response has not been modified");
        cached.expires = self.expires();
        for name in response.headers().keys() {
            cached.headers.remove(name);
            for value in response.headers().get_all(name) {
                cached.headers.append(name.clone(), value.clone());
            }
        }
        cached
    }

    fn update_from_response_headers(&mut self, directives: &CacheDirectives) {
        debug!(?directives, "Cache directives from response headers");

        if self.stale_if_error.is_none() {
            self.stale_if_error = directives.stale_if_error.clone();
        }
        if directives.immutable {
            self.expire_after = Some(ExpireAfter::Never);
        } else {
            self.expire_after = directives
                .max_age_expiration()
                .or_else(|| directives.expires_expiration())
                .or_else(|| self.expire_after.take());
        }
        self.skip_write |= directives.no_store;
    }

    fn update_validation_headers(&mut self, cached: &CachedResponse) {
        let directives = CacheDirectives::from_headers(&cached.headers);
        let revalidate = directives.has_validator()
            && (cached.is_expired_at(self.now())
                || self.refresh
                || directives.no_cache
                || (directives.must_revalidate && directives.max_age == Some(0)));
        if !revalidate {
            return;
        }

        if let Some(value) = directives.etag.as_deref().and_then(header_value) {
            self.validation_headers.insert(IF_NONE_MATCH, value);
        }
        if let Some(value) = directives.last_modified.as_deref().and_then(header_value) {
            self.validation_headers.insert(IF_MODIFIED_SINCE, value);
        }
        self.send_request = true;
        self.resend_request = false;
    }

    fn now(&self) -> DateTime<Utc> {
        self.settings.clock.now()
    }
}

fn window_offset(window: &ExpireAfter, now: DateTime<Utc>) -> ExpireOffset {
    if window.is_never() {
        ExpireOffset::Unlimited
    } else {
        ExpireOffset::Seconds(resolve_seconds(Some(window), now))
    }
}

fn header_value(value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value).ok()
}

/// Logs the checks that fired and returns `true` if any did.
fn log_criteria(operation: &str, criteria: &[(&str, bool)]) -> bool {
    let fired: Vec<&str> = criteria
        .iter()
        .filter(|(_, fired)| *fired)
        .map(|(name, _)| *name)
        .collect();
    if fired.is_empty() {
        debug!("Pre-{operation} cache checks: Passed");
        false
    } else {
        debug!("Pre-{operation} cache checks: {}", fired.join(", "));
        true
    }
}
