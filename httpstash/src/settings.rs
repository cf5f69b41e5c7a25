//! Cache settings.
//!
//! [`CacheSettings`] is built once (directly through
//! [`CacheSettings::builder`] or from a deserialized [`SettingsConfig`]) and
//! then shared read-only between requests as an `Arc`.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::Method;
use httpstash_core::{Clock, ExpireAfter, StaleIfError, SystemClock, UrlPattern};
use httpstash_http::FetchedResponse;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Response filter: returns `false` to keep a response out of the cache.
pub type FilterFn = Arc<dyn Fn(&FetchedResponse) -> bool + Send + Sync>;

/// Immutable cache configuration.
#[derive(Clone)]
pub struct CacheSettings {
    /// Default expiration for new responses.
    pub expire_after: Option<ExpireAfter>,
    /// Methods whose responses may be read from and written to the cache.
    pub allowable_methods: HashSet<Method>,
    /// Status codes that may be written to the cache.
    pub allowable_codes: HashSet<u16>,
    /// Per-URL expiration overrides; the first matching pattern wins.
    pub urls_expire_after: Vec<(UrlPattern, ExpireAfter)>,
    /// Honor `Cache-Control` and `Expires` response headers.
    pub cache_control: bool,
    /// Extra response filter.
    pub filter_fn: Option<FilterFn>,
    /// Serve stale responses when revalidation fails.
    pub stale_if_error: Option<StaleIfError>,
    /// Never send requests; answer from the cache or not at all.
    pub only_if_cached: bool,
    /// Bypass the cache entirely.
    pub disabled: bool,
    /// Time source for every freshness comparison.
    pub clock: Arc<dyn Clock>,
}

impl CacheSettings {
    /// Starts building settings from the defaults.
    pub fn builder() -> CacheSettingsBuilder {
        CacheSettingsBuilder::default()
    }

    /// Returns `true` if `method` is allowed.
    pub fn allows_method(&self, method: &str) -> bool {
        Method::from_bytes(method.as_bytes())
            .is_ok_and(|method| self.allowable_methods.contains(&method))
    }

    /// Returns `true` if `status` is allowed.
    pub fn allows_code(&self, status: u16) -> bool {
        self.allowable_codes.contains(&status)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            expire_after: Some(ExpireAfter::Never),
            allowable_methods: HashSet::from([Method::GET, Method::HEAD]),
            allowable_codes: HashSet::from([200]),
            urls_expire_after: Vec::new(),
            cache_control: false,
            filter_fn: None,
            stale_if_error: None,
            only_if_cached: false,
            disabled: false,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSettings")
            .field("expire_after", &self.expire_after)
            .field("allowable_methods", &self.allowable_methods)
            .field("allowable_codes", &self.allowable_codes)
            .field("urls_expire_after", &self.urls_expire_after)
            .field("cache_control", &self.cache_control)
            .field("filter_fn", &self.filter_fn.as_ref().map(|_| "..."))
            .field("stale_if_error", &self.stale_if_error)
            .field("only_if_cached", &self.only_if_cached)
            .field("disabled", &self.disabled)
            .field("clock", &self.clock)
            .finish()
    }
}

/// Builder for [`CacheSettings`].
///
/// ```
/// use std::time::Duration;
/// use httpstash::CacheSettings;
/// use httpstash_core::ExpireAfter;
///
/// let settings = CacheSettings::builder()
///     .expire_after(Duration::from_secs(300))
///     .url_expire_after("example.com/static", ExpireAfter::Never)
///     .cache_control(true)
///     .build();
/// assert!(settings.cache_control);
/// ```
#[derive(Debug, Default)]
pub struct CacheSettingsBuilder {
    settings: CacheSettings,
}

impl CacheSettingsBuilder {
    /// Default expiration for new responses.
    pub fn expire_after(mut self, expire_after: impl Into<ExpireAfter>) -> Self {
        self.settings.expire_after = Some(expire_after.into());
        self
    }

    /// Replaces the allowed methods.
    pub fn allowable_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.settings.allowable_methods = methods.into_iter().collect();
        self
    }

    /// Replaces the allowed status codes.
    pub fn allowable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.settings.allowable_codes = codes.into_iter().collect();
        self
    }

    /// Appends a per-URL expiration override.
    pub fn url_expire_after(
        mut self,
        pattern: impl Into<UrlPattern>,
        expire_after: impl Into<ExpireAfter>,
    ) -> Self {
        self.settings
            .urls_expire_after
            .push((pattern.into(), expire_after.into()));
        self
    }

    /// Honor cache headers of responses.
    pub fn cache_control(mut self, enabled: bool) -> Self {
        self.settings.cache_control = enabled;
        self
    }

    /// Keeps responses for which `filter` returns `false` out of the cache.
    pub fn filter_fn<F>(mut self, filter: F) -> Self
    where
        F: Fn(&FetchedResponse) -> bool + Send + Sync + 'static,
    {
        self.settings.filter_fn = Some(Arc::new(filter));
        self
    }

    /// Serve stale responses when revalidation fails.
    pub fn stale_if_error(mut self, stale_if_error: StaleIfError) -> Self {
        self.settings.stale_if_error = Some(stale_if_error);
        self
    }

    /// Only answer from the cache.
    pub fn only_if_cached(mut self, enabled: bool) -> Self {
        self.settings.only_if_cached = enabled;
        self
    }

    /// Bypass the cache.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.settings.disabled = disabled;
        self
    }

    /// Replaces the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.settings.clock = clock;
        self
    }

    /// Finishes the settings.
    pub fn build(self) -> CacheSettings {
        self.settings
    }
}

/// `stale_if_error` as written in configuration: a flag or a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StaleIfErrorConfig {
    /// `true` serves stale responses regardless of age.
    Flag(bool),
    /// Serve stale responses within this window past expiration.
    Window(ExpireAfter),
}

/// Deserializable form of [`CacheSettings`].
///
/// Expiration values accept `never`, `immediately`, `do-not-cache`, integer
/// seconds, durations such as `10m` and HTTP dates.
///
/// ```yaml
/// expire_after: 1h
/// allowable_methods: [GET, HEAD, POST]
/// urls_expire_after:
///   "example.com/static": never
///   "example.com/api/*/live": 30
/// stale_if_error: 10m
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// See [`CacheSettings::expire_after`].
    pub expire_after: Option<ExpireAfter>,
    /// See [`CacheSettings::allowable_methods`].
    pub allowable_methods: Vec<String>,
    /// See [`CacheSettings::allowable_codes`].
    pub allowable_codes: Vec<u16>,
    /// Ordered URL pattern overrides.
    pub urls_expire_after: IndexMap<String, ExpireAfter>,
    /// See [`CacheSettings::cache_control`].
    pub cache_control: bool,
    /// See [`CacheSettings::stale_if_error`].
    pub stale_if_error: Option<StaleIfErrorConfig>,
    /// See [`CacheSettings::only_if_cached`].
    pub only_if_cached: bool,
    /// See [`CacheSettings::disabled`].
    pub disabled: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            expire_after: Some(ExpireAfter::Never),
            allowable_methods: vec!["GET".to_owned(), "HEAD".to_owned()],
            allowable_codes: vec![200],
            urls_expire_after: IndexMap::new(),
            cache_control: false,
            stale_if_error: None,
            only_if_cached: false,
            disabled: false,
        }
    }
}

impl SettingsConfig {
    /// Converts into settings using the system clock and no response filter.
    pub fn into_settings(self) -> Result<CacheSettings, CacheError> {
        let allowable_methods = self
            .allowable_methods
            .iter()
            .map(|method| {
                Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| CacheError::Config(format!("invalid method: {method}")))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        let stale_if_error = match self.stale_if_error {
            None | Some(StaleIfErrorConfig::Flag(false)) => None,
            Some(StaleIfErrorConfig::Flag(true)) => Some(StaleIfError::Always),
            Some(StaleIfErrorConfig::Window(window)) => Some(StaleIfError::Within(window)),
        };

        Ok(CacheSettings {
            expire_after: self.expire_after,
            allowable_methods,
            allowable_codes: self.allowable_codes.into_iter().collect(),
            urls_expire_after: self
                .urls_expire_after
                .into_iter()
                .map(|(pattern, expire_after)| (UrlPattern::new(pattern), expire_after))
                .collect(),
            cache_control: self.cache_control,
            filter_fn: None,
            stale_if_error,
            only_if_cached: self.only_if_cached,
            disabled: self.disabled,
            clock: Arc::new(SystemClock),
        })
    }
}
