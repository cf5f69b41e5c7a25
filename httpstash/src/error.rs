//! Error types for cache operations.

use httpstash_backend::StorageError;
use httpstash_backend::format::FormatError;
use thiserror::Error;

/// Error type for cache operations.
///
/// A request the cache cannot satisfy is not an error: it is answered with a
/// synthesized `504 Gateway Timeout` response.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storage failure other than a missing key.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A snapshot could not be serialized.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The transport failed to deliver a response.
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// Settings could not be built from configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
