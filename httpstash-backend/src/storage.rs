use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use futures::{TryStreamExt, stream::BoxStream};
use httpstash_core::{Raw, StorageLabel};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{StorageError, format::Format};

/// Result type of every storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of keys in one namespace.
pub type KeyStream = BoxStream<'static, StorageResult<String>>;

/// Batch size used when a storage does not report its own limit.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Async key-value storage addressed by `(namespace, key)`.
///
/// Implementations are shared between tasks, so every method takes `&self`.
/// Values are opaque bytes; use [`StorageExt`] to store serde values through a
/// [`Format`].
#[async_trait]
pub trait Storage: Sync + Send {
    /// Returns the value stored under `key`, or [`StorageError::NotFound`].
    async fn get(&self, key: &str) -> StorageResult<Raw>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Raw) -> StorageResult<()>;

    /// Removes `key`, or reports [`StorageError::NotFound`] if it is absent.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Snapshot of the keys in this namespace.
    ///
    /// The stream is unaffected by writes made after the call returns.
    async fn keys(&self) -> StorageResult<KeyStream>;

    /// Number of entries in this namespace.
    async fn count(&self) -> StorageResult<usize>;

    /// Removes up to [`Storage::max_batch_size`] keys with one backend call.
    ///
    /// Missing keys are ignored.
    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()>;

    /// Largest key count a single [`Storage::delete_batch`] call accepts.
    fn max_batch_size(&self) -> usize {
        DEFAULT_BATCH_SIZE
    }

    /// Logical namespace of this storage.
    fn namespace(&self) -> &str;

    /// Label used in logs, e.g. `redis.http_cache.responses`.
    fn label(&self) -> StorageLabel {
        StorageLabel::new_static("storage").join(self.namespace())
    }

    /// Returns `true` if `key` is present.
    async fn contains(&self, key: &str) -> StorageResult<bool> {
        match self.get(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Removes all `keys` using `ceil(len / max_batch_size)` batch calls.
    ///
    /// Missing keys are ignored.
    async fn bulk_delete(&self, keys: Vec<String>) -> StorageResult<()> {
        let batch_size = self.max_batch_size();
        let mut batches = 0usize;
        for chunk in chunked(&keys, batch_size) {
            self.delete_batch(chunk).await?;
            batches += 1;
        }
        debug!(
            storage = %self.label(),
            keys = keys.len(),
            batches,
            "Bulk deleted keys"
        );
        Ok(())
    }

    /// Removes every entry in this namespace.
    async fn clear(&self) -> StorageResult<()> {
        let keys: Vec<String> = self.keys().await?.try_collect().await?;
        self.bulk_delete(keys).await
    }
}

/// Splits `keys` into chunks of at most `size` keys.
///
/// A `size` of zero is treated as one.
pub fn chunked(keys: &[String], size: usize) -> std::slice::Chunks<'_, String> {
    keys.chunks(size.max(1))
}

#[async_trait]
impl Storage for &dyn Storage {
    async fn get(&self, key: &str) -> StorageResult<Raw> {
        (*self).get(key).await
    }

    async fn set(&self, key: &str, value: Raw) -> StorageResult<()> {
        (*self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        (*self).delete(key).await
    }

    async fn keys(&self) -> StorageResult<KeyStream> {
        (*self).keys().await
    }

    async fn count(&self) -> StorageResult<usize> {
        (*self).count().await
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()> {
        (*self).delete_batch(keys).await
    }

    fn max_batch_size(&self) -> usize {
        (*self).max_batch_size()
    }

    fn namespace(&self) -> &str {
        (*self).namespace()
    }

    fn label(&self) -> StorageLabel {
        (*self).label()
    }
}

#[async_trait]
impl Storage for Box<dyn Storage> {
    async fn get(&self, key: &str) -> StorageResult<Raw> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Raw) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }

    async fn keys(&self) -> StorageResult<KeyStream> {
        (**self).keys().await
    }

    async fn count(&self) -> StorageResult<usize> {
        (**self).count().await
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()> {
        (**self).delete_batch(keys).await
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn label(&self) -> StorageLabel {
        (**self).label()
    }
}

#[async_trait]
impl Storage for Arc<dyn Storage + Send + 'static> {
    async fn get(&self, key: &str) -> StorageResult<Raw> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Raw) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }

    async fn keys(&self) -> StorageResult<KeyStream> {
        (**self).keys().await
    }

    async fn count(&self) -> StorageResult<usize> {
        (**self).count().await
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()> {
        (**self).delete_batch(keys).await
    }

    fn max_batch_size(&self) -> usize {
        (**self).max_batch_size()
    }

    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn label(&self) -> StorageLabel {
        (**self).label()
    }
}

/// Typed access to a [`Storage`] through a [`Format`].
pub trait StorageExt: Storage {
    /// Reads and decodes the value under `key`.
    fn get_value<T, F>(
        &self,
        key: &str,
        format: &F,
    ) -> impl Future<Output = StorageResult<T>> + Send
    where
        T: DeserializeOwned + Send,
        F: Format,
    {
        async move {
            let raw = self.get(key).await?;
            Ok(format.deserialize(&raw)?)
        }
    }

    /// Encodes `value` and stores it under `key`.
    fn set_value<T, F>(
        &self,
        key: &str,
        value: &T,
        format: &F,
    ) -> impl Future<Output = StorageResult<()>> + Send
    where
        T: Serialize + ?Sized,
        F: Format,
    {
        let encoded = format.serialize(value);
        async move { self.set(key, encoded?).await }
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
