//! Error types for storage operations.

use std::time::Duration;

use crate::format::FormatError;
use thiserror::Error;

/// Error type for storage operations.
///
/// Lookups and deletes of absent keys report [`StorageError::NotFound`] so
/// callers can tell "missing" apart from a failing service.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key does not exist in the namespace.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The physical resource already exists.
    ///
    /// Bootstrap code treats this as success.
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// The storage service failed its capability check.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The physical resource did not become ready in time.
    #[error("resource {resource} not ready after {waited:?}")]
    NotReady {
        /// Resource name.
        resource: String,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// Internal storage error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// Network interaction error.
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send + Sync>),

    /// Serialization or deserialization error.
    #[error(transparent)]
    Format(#[from] FormatError),
}

impl StorageError {
    /// Returns `true` for [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
