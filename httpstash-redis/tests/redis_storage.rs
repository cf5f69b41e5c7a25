//! These tests need a Redis server at `REDIS_URL` (default
//! `redis://127.0.0.1/`) and skip themselves when none answers.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::TryStreamExt;
use httpstash::Cache;
use httpstash_backend::{Storage, StorageError};
use httpstash_http::{CachedRequest, FetchedResponse};
use httpstash_redis::RedisStorage;

fn server() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_owned())
}

fn unique_table(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{prefix}_{}_{nanos}", std::process::id())
}

async fn connect(table: &str, namespace: &str, batch_size: usize) -> Option<RedisStorage> {
    match RedisStorage::builder()
        .server(server())
        .table(table)
        .namespace(namespace)
        .batch_size(batch_size)
        .connect()
        .await
    {
        Ok(storage) => Some(storage),
        Err(StorageError::Unavailable(reason)) => {
            eprintln!("skipping redis test: {reason}");
            None
        }
        Err(error) => panic!("unexpected error: {error}"),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_unavailable() {
    let result = RedisStorage::builder()
        .server("redis://127.0.0.1:1/")
        .connect()
        .await;
    assert!(matches!(result, Err(StorageError::Unavailable(_))));
}

#[tokio::test]
async fn test_set_get_delete() {
    let table = unique_table("contract");
    let Some(storage) = connect(&table, "responses", 25).await else {
        return;
    };

    storage.set("key", Bytes::from_static(b"value")).await.unwrap();
    assert_eq!(storage.get("key").await.unwrap(), "value");
    assert!(storage.contains("key").await.unwrap());

    storage.delete("key").await.unwrap();
    assert!(storage.get("key").await.unwrap_err().is_not_found());
    assert!(storage.delete("key").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_bulk_delete_and_clear() {
    let table = unique_table("bulk");
    let Some(storage) = connect(&table, "responses", 4).await else {
        return;
    };

    let keys: Vec<String> = (0..10).map(|index| format!("key-{index}")).collect();
    for key in &keys {
        storage.set(key, Bytes::from_static(b"value")).await.unwrap();
    }
    assert_eq!(storage.count().await.unwrap(), 10);

    let mut to_delete = keys[..6].to_vec();
    to_delete.push("missing".to_owned());
    storage.bulk_delete(to_delete).await.unwrap();
    assert_eq!(storage.count().await.unwrap(), 4);

    let mut remaining: Vec<String> = storage.keys().await.unwrap().try_collect().await.unwrap();
    remaining.sort();
    assert_eq!(remaining, keys[6..].to_vec());

    storage.clear().await.unwrap();
    assert_eq!(storage.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_construction_shares_table() {
    let table = unique_table("concurrent");
    let (first, second) = tokio::join!(
        connect(&table, "responses", 25),
        connect(&table, "responses", 25),
    );
    let (Some(first), Some(second)) = (first, second) else {
        return;
    };

    first.set("key", Bytes::from_static(b"shared")).await.unwrap();
    assert_eq!(second.get("key").await.unwrap(), "shared");
    first.clear().await.unwrap();
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let table = unique_table("namespaces");
    let Some(responses) = connect(&table, "responses", 25).await else {
        return;
    };
    let Some(redirects) = connect(&table, "redirects", 25).await else {
        return;
    };

    responses.set("key", Bytes::from_static(b"response")).await.unwrap();
    assert!(redirects.get("key").await.unwrap_err().is_not_found());
    assert_eq!(redirects.count().await.unwrap(), 0);
    responses.clear().await.unwrap();
}

#[tokio::test]
async fn test_cache_over_redis() {
    let table = unique_table("cache");
    let Some(responses) = connect(&table, "responses", 25).await else {
        return;
    };
    let Some(redirects) = connect(&table, "redirects", 25).await else {
        return;
    };
    let cache = Cache::new(responses, redirects);

    let request = CachedRequest {
        method: "GET".to_owned(),
        url: "https://example.com/".to_owned(),
        ..Default::default()
    };
    let response = FetchedResponse::new(
        request.clone(),
        http::Response::new(Bytes::from_static(b"hello")),
    );
    let key = cache.create_key(&request);
    cache.save_response(&response, &key, None).await.unwrap();

    let cached = cache.get_response(&key).await.unwrap().unwrap();
    assert_eq!(cached.body, "hello");
    cache.clear().await.unwrap();
}
