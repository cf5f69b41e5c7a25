//! Metrics declaration and recording.
//!
//! With the `metrics` feature every helper increments a counter through the
//! [`metrics`](https://docs.rs/metrics) facade; without it the helpers are
//! empty and compiled away.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of requests answered from a fresh stored response.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "httpstash_cache_hit_total",
            "Total number of cache hit events."
        );
        "httpstash_cache_hit_total"
    };
    /// Track number of requests with no stored response.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "httpstash_cache_miss_total",
            "Total number of cache miss events."
        );
        "httpstash_cache_miss_total"
    };
    /// Track number of stale stored responses that triggered a refetch.
    pub static ref CACHE_STALE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "httpstash_cache_stale_total",
            "Total number of cache stale events."
        );
        "httpstash_cache_stale_total"
    };
    /// Track number of stored responses refreshed by a `304 Not Modified`.
    pub static ref CACHE_REVALIDATED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "httpstash_cache_revalidated_total",
            "Total number of stored responses revalidated by the origin."
        );
        "httpstash_cache_revalidated_total"
    };
    /// Track number of fetched responses kept out of the cache.
    pub static ref CACHE_WRITE_SKIPPED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "httpstash_cache_write_skipped_total",
            "Total number of responses not written to the cache."
        );
        "httpstash_cache_write_skipped_total"
    };
    /// Track number of only-if-cached requests answered with 504.
    pub static ref UNSATISFIABLE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "httpstash_unsatisfiable_total",
            "Total number of requests the cache could not satisfy."
        );
        "httpstash_unsatisfiable_total"
    };
}

/// Outcome of one cached request, as counted by [`record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Served from a fresh stored response.
    Hit,
    /// Nothing stored.
    Miss,
    /// Stored response was stale.
    Stale,
    /// Stored response refreshed by `304 Not Modified`.
    Revalidated,
    /// Fetched response not written.
    WriteSkipped,
    /// Answered with 504.
    Unsatisfiable,
}

/// Records one event.
#[cfg(feature = "metrics")]
#[inline]
pub fn record(event: Event) {
    let counter = match event {
        Event::Hit => *CACHE_HIT_COUNTER,
        Event::Miss => *CACHE_MISS_COUNTER,
        Event::Stale => *CACHE_STALE_COUNTER,
        Event::Revalidated => *CACHE_REVALIDATED_COUNTER,
        Event::WriteSkipped => *CACHE_WRITE_SKIPPED_COUNTER,
        Event::Unsatisfiable => *UNSATISFIABLE_COUNTER,
    };
    metrics::counter!(counter).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record(_event: Event) {}
