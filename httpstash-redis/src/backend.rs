//! Redis storage implementation.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use httpstash_backend::{
    DEFAULT_BATCH_SIZE, KeyStream, Provision, ReadinessPolicy, Storage, StorageError,
    StorageResult, ensure_resource,
};
use httpstash_core::{Raw, StorageLabel};
use redis::{Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::Error;

/// One namespace of a table stored in Redis, based on the redis-rs crate.
///
/// Entries of the namespace are the fields of the hash
/// `{table}:ns:{namespace}`. A [`ConnectionManager`] is created on first use
/// and shared by clones.
///
/// [`ConnectionManager`]: redis::aio::ConnectionManager
#[derive(Clone)]
pub struct RedisStorage {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    table: String,
    namespace: String,
    hash: String,
    batch_size: usize,
}

impl RedisStorage {
    /// Creates new RedisStorage builder with default settings.
    #[must_use]
    pub fn builder() -> RedisStorageBuilder {
        RedisStorageBuilder::default()
    }

    /// Create lazy connection to redis via [`ConnectionManager`]
    pub async fn connection(&self) -> StorageResult<&ConnectionManager> {
        trace!("Get connection manager");
        let manager = self
            .connection
            .get_or_try_init(|| {
                trace!("Initialize new redis connection manager");
                self.client.get_connection_manager()
            })
            .await
            .map_err(Error::from)?;
        Ok(manager)
    }

    /// Name of the table this storage belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn ping(&self) -> StorageResult<()> {
        let unavailable = |error: redis::RedisError| {
            StorageError::Unavailable(format!("redis server did not answer PING: {error}"))
        };
        let mut con = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn meta_key(table: &str) -> String {
    format!("{{{table}}}:meta")
}

fn namespace_key(table: &str, namespace: &str) -> String {
    format!("{{{table}}}:ns:{namespace}")
}

/// Part of builder pattern implementation for RedisStorage.
#[derive(Debug, Clone)]
pub struct RedisStorageBuilder {
    connection_info: String,
    table: String,
    namespace: String,
    batch_size: usize,
    readiness: ReadinessPolicy,
}

impl Default for RedisStorageBuilder {
    fn default() -> Self {
        Self {
            connection_info: "redis://127.0.0.1/".to_owned(),
            table: "http_cache".to_owned(),
            namespace: "responses".to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
            readiness: ReadinessPolicy::default(),
        }
    }
}

impl RedisStorageBuilder {
    /// Set connection info (host, port, database, etc.) for RedisStorage.
    pub fn server(mut self, connection_info: impl Into<String>) -> Self {
        self.connection_info = connection_info.into();
        self
    }

    /// Set the table (physical resource) name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the namespace inside the table.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the largest number of fields removed by one `HDEL`.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set how long [`RedisStorageBuilder::connect`] waits for the table.
    pub fn readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Create new instance of Redis storage without touching the server.
    pub fn build(self) -> Result<RedisStorage, Error> {
        Ok(RedisStorage {
            client: Client::open(self.connection_info)?,
            connection: OnceCell::new(),
            hash: namespace_key(&self.table, &self.namespace),
            table: self.table,
            namespace: self.namespace,
            batch_size: self.batch_size,
        })
    }

    /// Builds the storage, checks that the server answers and makes sure the
    /// table exists and is ready.
    ///
    /// Fails with [`StorageError::Unavailable`] when the server does not
    /// answer `PING`.
    pub async fn connect(self) -> StorageResult<RedisStorage> {
        let readiness = self.readiness;
        let storage = self.build()?;
        storage.ping().await?;
        ensure_resource(&storage, &storage.table, readiness).await?;
        debug!(storage = %storage.label(), "Connected to redis storage");
        Ok(storage)
    }
}

#[async_trait]
impl Provision for RedisStorage {
    async fn create_resource(&self, name: &str) -> StorageResult<()> {
        let mut con = self.connection().await?.clone();
        let created: bool = redis::cmd("HSETNX")
            .arg(meta_key(name))
            .arg("created_at")
            .arg(Utc::now().to_rfc3339())
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        if created {
            Ok(())
        } else {
            Err(StorageError::AlreadyExists(name.to_owned()))
        }
    }

    async fn resource_ready(&self, name: &str) -> StorageResult<bool> {
        let mut con = self.connection().await?.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(meta_key(name))
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(exists)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn get(&self, key: &str) -> StorageResult<Raw> {
        let mut con = self.connection().await?.clone();
        let data: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(&self.hash)
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        data.map(Bytes::from)
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    async fn set(&self, key: &str, value: Raw) -> StorageResult<()> {
        let mut con = self.connection().await?.clone();
        redis::cmd("HSET")
            .arg(&self.hash)
            .arg(key)
            .arg(value.as_ref())
            .query_async::<()>(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut con = self.connection().await?.clone();
        let deleted: i64 = redis::cmd("HDEL")
            .arg(&self.hash)
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        if deleted > 0 {
            Ok(())
        } else {
            Err(StorageError::NotFound(key.to_owned()))
        }
    }

    async fn keys(&self) -> StorageResult<KeyStream> {
        let mut con = self.connection().await?.clone();
        let keys: Vec<String> = redis::cmd("HKEYS")
            .arg(&self.hash)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(stream::iter(keys.into_iter().map(Ok)).boxed())
    }

    async fn count(&self) -> StorageResult<usize> {
        let mut con = self.connection().await?.clone();
        let count: usize = redis::cmd("HLEN")
            .arg(&self.hash)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(count)
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut con = self.connection().await?.clone();
        let deleted: i64 = redis::cmd("HDEL")
            .arg(&self.hash)
            .arg(keys)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        trace!(storage = %self.label(), keys = keys.len(), deleted, "Deleted batch");
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn label(&self) -> StorageLabel {
        StorageLabel::new_static("redis")
            .join(&self.table)
            .join(&self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_share_hash_tag() {
        assert_eq!(meta_key("http_cache"), "{http_cache}:meta");
        assert_eq!(
            namespace_key("http_cache", "responses"),
            "{http_cache}:ns:responses"
        );
    }

    #[test]
    fn test_builder() {
        let storage = RedisStorage::builder()
            .table("cache")
            .namespace("redirects")
            .batch_size(0)
            .build()
            .unwrap();
        assert_eq!(storage.table(), "cache");
        assert_eq!(storage.namespace(), "redirects");
        assert_eq!(storage.max_batch_size(), 1);
        assert_eq!(storage.label().as_str(), "redis.cache.redirects");
    }

    #[test]
    fn test_invalid_url() {
        assert!(RedisStorage::builder().server("not a url").build().is_err());
    }
}
