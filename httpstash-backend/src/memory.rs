//! In-process storage following the full [`Storage`] contract.
//!
//! [`MemoryServer`] stands in for a storage service: it holds named tables,
//! and every table keeps entries under the composite `(namespace, key)`
//! address. [`MemoryStorage`] is one namespace of one table and bootstraps
//! its table through [`ensure_resource`] exactly like a networked backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, StreamExt};
use httpstash_core::{Raw, StorageLabel};
use tokio::time::Instant;
use tracing::trace;

use crate::{
    DEFAULT_BATCH_SIZE, KeyStream, Provision, ReadinessPolicy, Storage, StorageError,
    StorageResult, ensure_resource,
};

type Address = (String, String);

#[derive(Debug)]
struct Table {
    created: Instant,
    entries: DashMap<Address, Raw>,
}

/// In-process storage service holding named tables.
///
/// Cloning is cheap and clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    tables: Arc<DashMap<String, Arc<Table>>>,
    provisioning_delay: Duration,
}

impl MemoryServer {
    /// Creates an empty server whose tables are ready as soon as they exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a server whose new tables only report ready after `delay`.
    pub fn with_provisioning_delay(delay: Duration) -> Self {
        Self {
            provisioning_delay: delay,
            ..Self::default()
        }
    }

    /// Number of tables created so far.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    fn table(&self, name: &str) -> StorageResult<Arc<Table>> {
        self.tables
            .get(name)
            .map(|table| Arc::clone(table.value()))
            .ok_or_else(|| StorageError::NotFound(name.to_owned()))
    }
}

#[async_trait]
impl Provision for MemoryServer {
    async fn create_resource(&self, name: &str) -> StorageResult<()> {
        match self.tables.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(name.to_owned())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Table {
                    created: Instant::now(),
                    entries: DashMap::new(),
                }));
                Ok(())
            }
        }
    }

    async fn resource_ready(&self, name: &str) -> StorageResult<bool> {
        Ok(self
            .tables
            .get(name)
            .is_some_and(|table| table.created.elapsed() >= self.provisioning_delay))
    }
}

/// One namespace of a [`MemoryServer`] table.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    table: Arc<Table>,
    table_name: String,
    namespace: String,
    batch_size: usize,
    batch_calls: Arc<AtomicUsize>,
}

impl MemoryStorage {
    /// Creates a storage on a private server with a single table.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            table: Arc::new(Table {
                created: Instant::now(),
                entries: DashMap::new(),
            }),
            table_name: "memory".to_owned(),
            namespace: namespace.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_calls: Arc::default(),
        }
    }

    /// Connects to `table` on `server`, creating the table if needed.
    pub async fn connect(
        server: &MemoryServer,
        table: impl Into<String>,
        namespace: impl Into<String>,
    ) -> StorageResult<Self> {
        Self::connect_with(server, table, namespace, ReadinessPolicy::default()).await
    }

    /// Like [`MemoryStorage::connect`] with an explicit readiness policy.
    pub async fn connect_with(
        server: &MemoryServer,
        table: impl Into<String>,
        namespace: impl Into<String>,
        readiness: ReadinessPolicy,
    ) -> StorageResult<Self> {
        let table_name = table.into();
        ensure_resource(server, &table_name, readiness).await?;
        Ok(Self {
            table: server.table(&table_name)?,
            table_name,
            namespace: namespace.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_calls: Arc::default(),
        })
    }

    /// Sets the largest number of keys deleted per batch call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Number of [`Storage::delete_batch`] calls made through this storage.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn address(&self, key: &str) -> Address {
        (self.namespace.clone(), key.to_owned())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Raw> {
        self.table
            .entries
            .get(&self.address(key))
            .map(|value| value.value().clone())
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    async fn set(&self, key: &str, value: Raw) -> StorageResult<()> {
        self.table.entries.insert(self.address(key), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.table
            .entries
            .remove(&self.address(key))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_owned()))
    }

    async fn keys(&self) -> StorageResult<KeyStream> {
        let keys: Vec<StorageResult<String>> = self
            .table
            .entries
            .iter()
            .filter(|entry| entry.key().0 == self.namespace)
            .map(|entry| Ok(entry.key().1.clone()))
            .collect();
        Ok(stream::iter(keys).boxed())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self
            .table
            .entries
            .iter()
            .filter(|entry| entry.key().0 == self.namespace)
            .count())
    }

    async fn delete_batch(&self, keys: &[String]) -> StorageResult<()> {
        if keys.len() > self.batch_size {
            return Err(StorageError::Internal(
                format!(
                    "batch of {} keys exceeds the limit of {}",
                    keys.len(),
                    self.batch_size
                )
                .into(),
            ));
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        for key in keys {
            self.table.entries.remove(&self.address(key));
        }
        trace!(storage = %self.label(), keys = keys.len(), "Deleted batch");
        Ok(())
    }

    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn label(&self) -> StorageLabel {
        StorageLabel::new_static("memory")
            .join(&self.table_name)
            .join(&self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_namespaces_share_a_table_without_sharing_keys() {
        let server = MemoryServer::new();
        let responses = MemoryStorage::connect(&server, "http_cache", "responses")
            .await
            .unwrap();
        let redirects = MemoryStorage::connect(&server, "http_cache", "redirects")
            .await
            .unwrap();

        responses.set("key", Raw::from_static(b"response")).await.unwrap();
        redirects.set("key", Raw::from_static(b"alias")).await.unwrap();

        assert_eq!(server.table_count(), 1);
        assert_eq!(responses.get("key").await.unwrap(), "response");
        assert_eq!(redirects.get("key").await.unwrap(), "alias");
        assert_eq!(responses.count().await.unwrap(), 1);

        responses.clear().await.unwrap();
        assert_eq!(responses.count().await.unwrap(), 0);
        assert_eq!(redirects.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keys_is_a_snapshot() {
        let storage = MemoryStorage::new("responses");
        storage.set("a", Raw::new()).await.unwrap();
        let keys = storage.keys().await.unwrap();
        storage.set("b", Raw::new()).await.unwrap();

        let keys: Vec<String> = keys.try_collect().await.unwrap();
        assert_eq!(keys, vec!["a".to_owned()]);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let storage = MemoryStorage::new("responses").with_batch_size(2);
        let keys = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        assert!(matches!(
            storage.delete_batch(&keys).await,
            Err(StorageError::Internal(_))
        ));
        assert_eq!(storage.batch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_waits_for_provisioning() {
        let server = MemoryServer::with_provisioning_delay(Duration::from_secs(2));
        let storage = MemoryStorage::connect_with(
            &server,
            "http_cache",
            "responses",
            ReadinessPolicy::new(5, Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_eq!(storage.label().as_str(), "memory.http_cache.responses");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up() {
        let server = MemoryServer::with_provisioning_delay(Duration::from_secs(60));
        let result = MemoryStorage::connect_with(
            &server,
            "http_cache",
            "responses",
            ReadinessPolicy::new(2, Duration::from_secs(1)),
        )
        .await;
        assert!(matches!(result, Err(StorageError::NotReady { .. })));
    }
}
