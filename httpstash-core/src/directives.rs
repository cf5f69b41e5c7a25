//! Cache directives parsed from request or response headers.
//!
//! [`CacheDirectives::from_headers`] reads `Cache-Control` sub-directives
//! together with the validator headers (`ETag`, `Last-Modified`) and the
//! `Expires` header into a single immutable record.

use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::{CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED};
use tracing::trace;

use crate::expiration::{ExpireAfter, parse_http_date};

/// Value of a `max-stale` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxStale {
    /// `max-stale` without a value: any staleness is acceptable.
    Unlimited,
    /// `max-stale=N`.
    Seconds(i64),
}

/// Value of a `stale-if-error` directive or setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleIfError {
    /// Serve stale data on error regardless of its age.
    Always,
    /// Serve stale data on error while it is within this window past expiration.
    Within(ExpireAfter),
}

/// Extra freshness margin a request grants to (or demands from) a stored response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireOffset {
    /// Stored responses are usable however stale they are.
    Unlimited,
    /// Seconds added to the expiration time; negative values demand extra freshness.
    Seconds(i64),
}

/// Parsed cache directives from one header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    /// `no-cache`
    pub no_cache: bool,
    /// `no-store`
    pub no_store: bool,
    /// `only-if-cached`
    pub only_if_cached: bool,
    /// `must-revalidate`
    pub must_revalidate: bool,
    /// `immutable`
    pub immutable: bool,
    /// `max-age=N`, in seconds.
    pub max_age: Option<i64>,
    /// `min-fresh=N`, in seconds.
    pub min_fresh: Option<i64>,
    /// `max-stale[=N]`
    pub max_stale: Option<MaxStale>,
    /// `stale-if-error[=N]`
    pub stale_if_error: Option<StaleIfError>,
    /// `ETag` header.
    pub etag: Option<String>,
    /// `Last-Modified` header.
    pub last_modified: Option<String>,
    /// `Expires` header, if it holds a valid date.
    pub expires: Option<DateTime<Utc>>,
}

impl CacheDirectives {
    /// Parses directives out of a header map.
    ///
    /// Unknown directives are ignored and malformed numeric values are treated
    /// as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut directives = CacheDirectives::default();

        for value in headers.get_all(CACHE_CONTROL) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for token in value.split(',') {
                let (name, argument) = match token.split_once('=') {
                    Some((name, argument)) => {
                        (name.trim(), Some(argument.trim().trim_matches('"')))
                    }
                    None => (token.trim(), None),
                };
                if name.is_empty() {
                    continue;
                }
                directives.apply(name, argument);
            }
        }

        directives.etag = header_string(headers, ETAG);
        directives.last_modified = header_string(headers, LAST_MODIFIED);
        directives.expires = header_string(headers, EXPIRES)
            .as_deref()
            .and_then(parse_http_date);
        directives
    }

    fn apply(&mut self, name: &str, argument: Option<&str>) {
        match name.to_ascii_lowercase().as_str() {
            "no-cache" => self.no_cache = true,
            "no-store" => self.no_store = true,
            "only-if-cached" => self.only_if_cached = true,
            "must-revalidate" => self.must_revalidate = true,
            "immutable" => self.immutable = true,
            "max-age" => self.max_age = argument.and_then(try_int),
            "min-fresh" => self.min_fresh = argument.and_then(try_int),
            "max-stale" => {
                self.max_stale = match argument {
                    None => Some(MaxStale::Unlimited),
                    Some(argument) => try_int(argument).map(MaxStale::Seconds),
                }
            }
            "stale-if-error" => {
                self.stale_if_error = match argument {
                    None => Some(StaleIfError::Always),
                    Some(argument) => try_int(argument)
                        .map(|seconds| StaleIfError::Within(ExpireAfter::from_seconds(seconds))),
                }
            }
            _ => trace!(directive = name, "Ignoring unsupported cache directive"),
        }
    }

    /// Returns `true` if an `ETag` or `Last-Modified` validator is present.
    pub fn has_validator(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// `max-age` as an expiration value.
    pub fn max_age_expiration(&self) -> Option<ExpireAfter> {
        self.max_age.map(ExpireAfter::from_seconds)
    }

    /// `Expires` as an expiration value.
    pub fn expires_expiration(&self) -> Option<ExpireAfter> {
        self.expires.map(ExpireAfter::At)
    }

    /// Freshness margin requested through `max-stale` and `min-fresh`.
    pub fn expire_offset(&self) -> ExpireOffset {
        let min_fresh = self.min_fresh.unwrap_or(0);
        match self.max_stale {
            Some(MaxStale::Unlimited) => ExpireOffset::Unlimited,
            Some(MaxStale::Seconds(max_stale)) => {
                ExpireOffset::Seconds(max_stale.saturating_sub(min_fresh))
            }
            None => ExpireOffset::Seconds(min_fresh.saturating_neg()),
        }
    }
}

fn header_string(headers: &HeaderMap, name: http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Delta-seconds are non-negative; anything else is treated as absent.
fn try_int(value: &str) -> Option<i64> {
    value.trim().parse().ok().filter(|seconds: &i64| *seconds >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_empty_headers() {
        let directives = CacheDirectives::from_headers(&HeaderMap::new());
        assert_eq!(directives, CacheDirectives::default());
        assert!(!directives.has_validator());
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(0));
    }

    #[test]
    fn test_boolean_directives() {
        let directives = CacheDirectives::from_headers(&headers(&[(
            "cache-control",
            "No-Cache, no-store,only-if-cached, must-revalidate, immutable",
        )]));
        assert!(directives.no_cache);
        assert!(directives.no_store);
        assert!(directives.only_if_cached);
        assert!(directives.must_revalidate);
        assert!(directives.immutable);
    }

    #[test]
    fn test_numeric_directives() {
        let directives = CacheDirectives::from_headers(&headers(&[
            ("cache-control", "max-age=60, min-fresh=5"),
            ("cache-control", "max-stale=30, stale-if-error=120"),
        ]));
        assert_eq!(directives.max_age, Some(60));
        assert_eq!(directives.min_fresh, Some(5));
        assert_eq!(directives.max_stale, Some(MaxStale::Seconds(30)));
        assert_eq!(
            directives.stale_if_error,
            Some(StaleIfError::Within(ExpireAfter::Seconds(120)))
        );
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(25));
    }

    #[test]
    fn test_valueless_directives() {
        let directives =
            CacheDirectives::from_headers(&headers(&[("cache-control", "max-stale, stale-if-error")]));
        assert_eq!(directives.max_stale, Some(MaxStale::Unlimited));
        assert_eq!(directives.stale_if_error, Some(StaleIfError::Always));
        assert_eq!(directives.expire_offset(), ExpireOffset::Unlimited);
    }

    #[test]
    fn test_malformed_values_are_absent() {
        let directives = CacheDirectives::from_headers(&headers(&[(
            "cache-control",
            "max-age=abc, min-fresh=, max-stale=soon",
        )]));
        assert_eq!(directives.max_age, None);
        assert_eq!(directives.min_fresh, None);
        assert_eq!(directives.max_stale, None);
    }

    #[test]
    fn test_negative_values_are_absent() {
        let directives = CacheDirectives::from_headers(&headers(&[(
            "cache-control",
            "max-age=-1, min-fresh=-9223372036854775808, max-stale=-5, stale-if-error=-60",
        )]));
        assert_eq!(directives.max_age, None);
        assert_eq!(directives.min_fresh, None);
        assert_eq!(directives.max_stale, None);
        assert_eq!(directives.stale_if_error, None);
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(0));
    }

    #[test]
    fn test_offset_at_range_edges() {
        let directives = CacheDirectives::from_headers(&headers(&[(
            "cache-control",
            "max-stale=9223372036854775807, min-fresh=-1",
        )]));
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(i64::MAX));

        let directives = CacheDirectives {
            min_fresh: Some(i64::MIN),
            ..Default::default()
        };
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(i64::MAX));

        let directives = CacheDirectives {
            min_fresh: Some(i64::MIN),
            max_stale: Some(MaxStale::Seconds(i64::MAX)),
            ..Default::default()
        };
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(i64::MAX));
    }

    #[test]
    fn test_min_fresh_demands_margin() {
        let directives = CacheDirectives::from_headers(&headers(&[("cache-control", "min-fresh=10")]));
        assert_eq!(directives.expire_offset(), ExpireOffset::Seconds(-10));
    }

    #[test]
    fn test_validators_and_expires() {
        let directives = CacheDirectives::from_headers(&headers(&[
            ("etag", "\"abc\""),
            ("last-modified", "Wed, 01 May 2024 10:00:00 GMT"),
            ("expires", "Wed, 01 May 2024 12:00:00 GMT"),
        ]));
        assert_eq!(directives.etag.as_deref(), Some("\"abc\""));
        assert!(directives.has_validator());
        assert_eq!(
            directives.expires,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_expires_is_ignored() {
        let directives = CacheDirectives::from_headers(&headers(&[("expires", "0")]));
        assert_eq!(directives.expires, None);
    }

    #[test]
    fn test_max_age_zero_maps_to_immediately() {
        let directives = CacheDirectives::from_headers(&headers(&[("cache-control", "max-age=0")]));
        assert_eq!(directives.max_age_expiration(), Some(ExpireAfter::Immediately));
    }
}
