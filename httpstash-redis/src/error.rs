//! Error types for Redis storage operations.
//!
//! All errors convert into [`StorageError`] so callers handle every storage
//! the same way.
//!
//! [`StorageError`]: httpstash_backend::StorageError

use httpstash_backend::StorageError;
use redis::RedisError;

/// Error type for Redis storage operations.
///
/// It appears when [`RedisStorageBuilder::build`] gets an invalid connection
/// URL, or when a command fails. In most cases it is converted into
/// [`StorageError`] and propagated through the cache.
///
/// [`RedisStorageBuilder::build`]: crate::RedisStorageBuilder::build
/// [`StorageError`]: httpstash_backend::StorageError
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client.
    #[error("Redis storage error: {0}")]
    Redis(#[from] RedisError),
}

impl From<Error> for StorageError {
    fn from(error: Error) -> Self {
        Self::Internal(Box::new(error))
    }
}
