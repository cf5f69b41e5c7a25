//! Storage label type for identifying storage namespaces in logs.

use smol_str::SmolStr;
use std::fmt;

/// A label identifying one storage namespace, such as `redis.http_cache.responses`.
///
/// # Example
/// ```
/// use httpstash_core::StorageLabel;
///
/// let label = StorageLabel::new("redis").join("http_cache").join("responses");
/// assert_eq!(label.as_str(), "redis.http_cache.responses");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StorageLabel(SmolStr);

impl StorageLabel {
    /// Creates a new label.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates a label from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Returns the label as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a dot-separated component: "self.part".
    #[inline]
    pub fn join(&self, part: impl AsRef<str>) -> Self {
        Self(SmolStr::from(format!("{}.{}", self.0, part.as_ref())))
    }
}

impl fmt::Display for StorageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StorageLabel {
    #[inline]
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for StorageLabel {
    #[inline]
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl AsRef<str> for StorageLabel {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}
