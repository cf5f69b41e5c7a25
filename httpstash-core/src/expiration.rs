//! Expiration values and their resolution to absolute timestamps.
//!
//! An expiration can come from several places: the cache settings, a per-URL
//! pattern, a `max-age` directive or an `Expires` header. They all end up as an
//! [`ExpireAfter`] and are resolved against "now" with [`resolve`].
//!
//! Three values carry policy meaning instead of a duration:
//!
//! | Value | Meaning |
//! |-------|---------|
//! | [`ExpireAfter::Never`] (`-1`) | Stored responses never expire |
//! | [`ExpireAfter::Immediately`] (`0`) | Stored responses are expired right away and must be revalidated |
//! | [`ExpireAfter::DoNotCache`] | Responses are neither read from nor written to the cache |
//!
//! ```
//! use chrono::{TimeDelta, Utc};
//! use httpstash_core::expiration::{ExpireAfter, resolve};
//!
//! let now = Utc::now();
//! assert_eq!(resolve(Some(&ExpireAfter::Seconds(60)), now), Some(now + TimeDelta::seconds(60)));
//! assert_eq!(resolve(Some(&ExpireAfter::Never), now), None);
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

/// Second-count value meaning "never expire".
pub const NEVER_EXPIRE: i64 = -1;

/// Second-count value meaning "expire immediately".
pub const EXPIRE_IMMEDIATELY: i64 = 0;

/// Second-count value meaning "do not cache".
///
/// Spells "DONOTCACHE" in maritime signal flags (RFC 4824), far outside any
/// plausible expiration in seconds.
pub const DO_NOT_CACHE: i64 = 0x0D0E_0200_0207_04;

/// An expiration value in any of the supported shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpireAfter {
    /// Never expire.
    Never,
    /// Expire as soon as the response is stored.
    Immediately,
    /// Skip the cache entirely.
    DoNotCache,
    /// Relative expiration in seconds.
    Seconds(i64),
    /// Relative expiration.
    Duration(Duration),
    /// Absolute expiration time.
    At(DateTime<Utc>),
    /// Absolute expiration time as an HTTP date, parsed lazily.
    HttpDate(String),
}

impl ExpireAfter {
    /// Builds an expiration from a second count, mapping the reserved values
    /// onto their sentinel variants.
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            NEVER_EXPIRE => ExpireAfter::Never,
            EXPIRE_IMMEDIATELY => ExpireAfter::Immediately,
            DO_NOT_CACHE => ExpireAfter::DoNotCache,
            seconds => ExpireAfter::Seconds(seconds),
        }
    }

    /// Returns `true` for the "never expire" sentinel.
    pub fn is_never(&self) -> bool {
        matches!(self, ExpireAfter::Never | ExpireAfter::Seconds(NEVER_EXPIRE))
    }

    /// Returns `true` for the "expire immediately" sentinel.
    pub fn is_immediately(&self) -> bool {
        matches!(
            self,
            ExpireAfter::Immediately | ExpireAfter::Seconds(EXPIRE_IMMEDIATELY)
        )
    }

    /// Returns `true` for the "do not cache" sentinel.
    pub fn is_do_not_cache(&self) -> bool {
        matches!(self, ExpireAfter::DoNotCache | ExpireAfter::Seconds(DO_NOT_CACHE))
    }

    /// Resolves this value to an absolute expiration time.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_never() || self.is_do_not_cache() {
            return None;
        }
        if self.is_immediately() {
            return Some(now);
        }
        match self {
            ExpireAfter::HttpDate(value) => parse_http_date(value),
            ExpireAfter::At(at) => Some(*at),
            ExpireAfter::Seconds(seconds) => TimeDelta::try_seconds(*seconds)
                .and_then(|delta| now.checked_add_signed(delta)),
            ExpireAfter::Duration(duration) => TimeDelta::from_std(*duration)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta)),
            ExpireAfter::Never | ExpireAfter::Immediately | ExpireAfter::DoNotCache => None,
        }
    }
}

impl From<Duration> for ExpireAfter {
    fn from(duration: Duration) -> Self {
        ExpireAfter::Duration(duration)
    }
}

impl From<DateTime<Utc>> for ExpireAfter {
    fn from(at: DateTime<Utc>) -> Self {
        ExpireAfter::At(at)
    }
}

impl From<i64> for ExpireAfter {
    fn from(seconds: i64) -> Self {
        ExpireAfter::from_seconds(seconds)
    }
}

impl fmt::Display for ExpireAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpireAfter::Never => f.write_str("never"),
            ExpireAfter::Immediately => f.write_str("immediately"),
            ExpireAfter::DoNotCache => f.write_str("do-not-cache"),
            ExpireAfter::Seconds(seconds) => write!(f, "{seconds}s"),
            ExpireAfter::Duration(duration) => {
                write!(f, "{}", humantime_serde::re::humantime::format_duration(*duration))
            }
            ExpireAfter::At(at) => f.write_str(&at.to_rfc2822()),
            ExpireAfter::HttpDate(value) => f.write_str(value),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExpireAfterRepr {
    Seconds(i64),
    Text(String),
}

impl Serialize for ExpireAfter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExpireAfter::Seconds(seconds) => ExpireAfterRepr::Seconds(*seconds),
            other => ExpireAfterRepr::Text(other.to_string()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExpireAfter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ExpireAfterRepr::deserialize(deserializer)? {
            ExpireAfterRepr::Seconds(seconds) => ExpireAfter::from_seconds(seconds),
            ExpireAfterRepr::Text(text) => parse_expire_after(&text),
        })
    }
}

fn parse_expire_after(text: &str) -> ExpireAfter {
    let text = text.trim();
    match text.to_ascii_lowercase().as_str() {
        "never" => return ExpireAfter::Never,
        "immediately" => return ExpireAfter::Immediately,
        "do-not-cache" | "do_not_cache" => return ExpireAfter::DoNotCache,
        _ => {}
    }
    if let Ok(seconds) = text.parse::<i64>() {
        return ExpireAfter::from_seconds(seconds);
    }
    if let Some(seconds) = text.strip_suffix('s').and_then(|s| s.parse::<i64>().ok()) {
        return ExpireAfter::from_seconds(seconds);
    }
    match humantime_serde::re::humantime::parse_duration(text) {
        Ok(duration) => ExpireAfter::Duration(duration),
        Err(_) => ExpireAfter::HttpDate(text.to_owned()),
    }
}

/// Resolves an optional expiration value to an absolute timestamp.
///
/// Returns `None` when no expiration is tracked: the value is absent, is
/// [`ExpireAfter::Never`] or [`ExpireAfter::DoNotCache`], or is a date that
/// cannot be parsed.
pub fn resolve(expire_after: Option<&ExpireAfter>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expire_after.and_then(|value| value.resolve(now))
}

/// Resolves an optional expiration value to a number of seconds from `now`.
///
/// [`DO_NOT_CACHE`] passes through unchanged and an untracked expiration maps to
/// [`NEVER_EXPIRE`].
pub fn resolve_seconds(expire_after: Option<&ExpireAfter>, now: DateTime<Utc>) -> i64 {
    if expire_after.is_some_and(ExpireAfter::is_do_not_cache) {
        return DO_NOT_CACHE;
    }
    match resolve(expire_after, now) {
        Some(expires) => ceil_seconds(expires - now),
        None => NEVER_EXPIRE,
    }
}

/// Rounds a time delta up to whole seconds.
pub fn ceil_seconds(delta: TimeDelta) -> i64 {
    let seconds = delta.num_seconds();
    if delta.subsec_nanos() > 0 {
        seconds + 1
    } else {
        seconds
    }
}

/// Parses an HTTP (RFC 5322 style) date into UTC.
///
/// Failures are logged and yield `None`.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc2822(value.trim()) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(error) => {
            debug!(value, %error, "Failed to parse timestamp");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    Segment,
    Recursive,
}

/// A compiled per-URL expiration pattern.
///
/// Schemes are ignored on both sides. `*` matches within a single path segment,
/// `**` matches across segments and `?` matches one character other than `/`.
/// Patterns without a trailing wildcard match everything below them, so
/// `httpbin.org/delay` matches `https://httpbin.org/delay/1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    source: String,
    tokens: Vec<Token>,
}

impl UrlPattern {
    /// Compiles a pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        let source = pattern.into();
        let normalized = format!("{}**", strip_scheme(&source).trim_end_matches('*'));
        let mut tokens = Vec::with_capacity(normalized.len());
        let mut chars = normalized.chars().peekable();
        while let Some(c) = chars.next() {
            let token = match c {
                '*' if chars.peek() == Some(&'*') => {
                    while chars.peek() == Some(&'*') {
                        chars.next();
                    }
                    Token::Recursive
                }
                '*' => Token::Segment,
                '?' => Token::AnyChar,
                c => Token::Literal(c),
            };
            tokens.push(token);
        }
        Self { source, tokens }
    }

    /// The pattern as originally configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Checks whether `url` matches this pattern.
    pub fn matches(&self, url: &str) -> bool {
        let text: Vec<char> = strip_scheme(url).chars().collect();
        // row[j]: the tokens consumed so far match text[..j]
        let mut row = vec![false; text.len() + 1];
        row[0] = true;
        for token in &self.tokens {
            let mut next = vec![false; text.len() + 1];
            match token {
                Token::Literal(expected) => {
                    for j in 1..=text.len() {
                        next[j] = row[j - 1] && text[j - 1] == *expected;
                    }
                }
                Token::AnyChar => {
                    for j in 1..=text.len() {
                        next[j] = row[j - 1] && text[j - 1] != '/';
                    }
                }
                Token::Segment => {
                    next[0] = row[0];
                    for j in 1..=text.len() {
                        next[j] = row[j] || (next[j - 1] && text[j - 1] != '/');
                    }
                }
                Token::Recursive => {
                    next[0] = row[0];
                    for j in 1..=text.len() {
                        next[j] = row[j] || next[j - 1];
                    }
                }
            }
            row = next;
        }
        row[text.len()]
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for UrlPattern {
    fn from(pattern: &str) -> Self {
        UrlPattern::new(pattern)
    }
}

fn strip_scheme(url: &str) -> &str {
    url.rsplit("://").next().unwrap_or(url)
}

/// Checks a URL against a single pattern string.
pub fn url_matches(url: &str, pattern: &str) -> bool {
    UrlPattern::new(pattern).matches(url)
}

/// Returns the expiration of the first pattern matching `url`, in configured order.
pub fn url_expiration<'a, I>(url: &str, patterns: I) -> Option<&'a ExpireAfter>
where
    I: IntoIterator<Item = &'a (UrlPattern, ExpireAfter)>,
{
    if url.is_empty() {
        return None;
    }
    patterns
        .into_iter()
        .find(|(pattern, _)| pattern.matches(url))
        .map(|(pattern, expire_after)| {
            debug!(url, pattern = %pattern, expire_after = %expire_after, "URL matched pattern");
            expire_after
        })
}
