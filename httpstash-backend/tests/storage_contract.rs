use std::sync::Arc;

use futures::TryStreamExt;
use httpstash_backend::format::{BincodeFormat, JsonFormat};
use httpstash_backend::{MemoryServer, MemoryStorage, Storage, StorageError, StorageExt};
use httpstash_core::Raw;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

#[tokio::test]
async fn test_set_then_get_returns_value() {
    let storage = MemoryStorage::new("responses");
    storage.set("k", Raw::from_static(b"v1")).await.unwrap();
    storage.set("k", Raw::from_static(b"v2")).await.unwrap();
    assert_eq!(storage.get("k").await.unwrap(), Raw::from_static(b"v2"));
    assert!(storage.contains("k").await.unwrap());
}

#[tokio::test]
async fn test_missing_key_is_not_found() {
    let storage = MemoryStorage::new("responses");
    assert!(matches!(
        storage.get("missing").await,
        Err(StorageError::NotFound(key)) if key == "missing"
    ));
    assert!(storage.delete("missing").await.unwrap_err().is_not_found());
    assert!(!storage.contains("missing").await.unwrap());
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let storage = MemoryStorage::new("responses");
    storage.set("k", Raw::from_static(b"v")).await.unwrap();
    storage.delete("k").await.unwrap();
    assert!(storage.get("k").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_bulk_delete_uses_ceil_batches() {
    for (total, batch_size, expected_calls) in [(0, 25, 0), (25, 25, 1), (26, 25, 2), (60, 25, 3), (7, 1, 7)] {
        let storage = MemoryStorage::new("responses").with_batch_size(batch_size);
        let keys: Vec<String> = (0..total).map(|i| format!("key-{i}")).collect();
        for key in &keys {
            storage.set(key, Raw::from_static(b"v")).await.unwrap();
        }

        storage.bulk_delete(keys).await.unwrap();

        assert_eq!(storage.batch_calls(), expected_calls, "{total} keys by {batch_size}");
        assert_eq!(storage.count().await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_bulk_delete_ignores_missing_keys() {
    let storage = MemoryStorage::new("responses");
    storage.set("present", Raw::from_static(b"v")).await.unwrap();
    storage
        .bulk_delete(vec!["present".to_owned(), "absent".to_owned()])
        .await
        .unwrap();
    assert_eq!(storage.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_clear_empties_namespace() {
    let storage = MemoryStorage::new("responses").with_batch_size(4);
    for i in 0..10 {
        storage.set(&format!("key-{i}"), Raw::new()).await.unwrap();
    }
    storage.clear().await.unwrap();
    assert_eq!(storage.count().await.unwrap(), 0);
    assert_eq!(storage.batch_calls(), 3);

    let keys: Vec<String> = storage.keys().await.unwrap().try_collect().await.unwrap();
    assert!(keys.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_construction_on_one_table() {
    let server = MemoryServer::new();
    let (responses, redirects, extra) = tokio::join!(
        MemoryStorage::connect(&server, "http_cache", "responses"),
        MemoryStorage::connect(&server, "http_cache", "redirects"),
        MemoryStorage::connect(&server, "http_cache", "responses"),
    );
    let responses = responses.unwrap();
    let redirects = redirects.unwrap();
    let extra = extra.unwrap();
    assert_eq!(server.table_count(), 1);

    responses.set("k", Raw::from_static(b"v")).await.unwrap();
    assert_eq!(extra.get("k").await.unwrap(), Raw::from_static(b"v"));
    assert!(redirects.get("k").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_trait_objects_forward() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new("responses").with_batch_size(3));
    assert_eq!(storage.namespace(), "responses");
    assert_eq!(storage.max_batch_size(), 3);
    assert_eq!(storage.label().as_str(), "memory.memory.responses");

    storage.set("k", Raw::from_static(b"v")).await.unwrap();
    let boxed: Box<dyn Storage> = Box::new(MemoryStorage::new("other"));
    assert_eq!(boxed.count().await.unwrap(), 0);
    assert_eq!(storage.count().await.unwrap(), 1);
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Alias {
    target: String,
    hops: u8,
}

#[tokio::test]
async fn test_typed_values_through_formats() {
    let storage = MemoryStorage::new("redirects");
    let alias = Alias {
        target: "abc".to_owned(),
        hops: 2,
    };

    storage.set_value("json", &alias, &JsonFormat).await.unwrap();
    storage.set_value("bin", &alias, &BincodeFormat).await.unwrap();

    let json: Alias = storage.get_value("json", &JsonFormat).await.unwrap();
    let bin: Alias = storage.get_value("bin", &BincodeFormat).await.unwrap();
    assert_eq!(json, alias);
    assert_eq!(bin, alias);

    let wrong: Result<Alias, _> = storage.get_value("bin", &JsonFormat).await;
    assert!(matches!(wrong, Err(StorageError::Format(_))));
}
