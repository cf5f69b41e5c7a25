//! Two-namespace response cache on top of a [`Storage`].
//!
//! Responses are stored under their cache key in the `responses` namespace.
//! Every request of a redirect chain gets an alias in the `redirects`
//! namespace pointing at the key of the final response, so a later request
//! for any URL of the chain finds the same entry.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use httpstash_backend::format::{Format, JsonFormat};
use httpstash_backend::{MemoryServer, MemoryStorage, Storage, StorageError, StorageExt};
use httpstash_core::{Clock, ExpireAfter, KeyGenerator, SystemClock};
use httpstash_http::{
    CachedRequest, CachedResponse, ResponseSource, Sha256KeyGenerator, SnapshotOverrides,
};
use tracing::{debug, error, info};

use crate::CacheError;

/// Namespace holding serialized responses.
pub const RESPONSES_NAMESPACE: &str = "responses";
/// Namespace holding redirect aliases.
pub const REDIRECTS_NAMESPACE: &str = "redirects";

/// Response cache over two storages of the same kind.
pub struct Cache<S, F = JsonFormat> {
    responses: S,
    redirects: S,
    format: F,
    clock: Arc<dyn Clock>,
    key_generator: Arc<dyn KeyGenerator<CachedRequest>>,
}

impl<S> Cache<S>
where
    S: Storage,
{
    /// Creates a cache storing JSON encoded responses.
    pub fn new(responses: S, redirects: S) -> Self {
        Self {
            responses,
            redirects,
            format: JsonFormat,
            clock: Arc::new(SystemClock),
            key_generator: Arc::new(Sha256KeyGenerator::new()),
        }
    }
}

impl Cache<MemoryStorage> {
    /// Creates a cache on private in-process storage.
    pub fn in_memory() -> Self {
        Self::new(
            MemoryStorage::new(RESPONSES_NAMESPACE),
            MemoryStorage::new(REDIRECTS_NAMESPACE),
        )
    }

    /// Creates a cache on `table` of a shared in-process server.
    pub async fn connect_memory(server: &MemoryServer, table: &str) -> Result<Self, CacheError> {
        let responses = MemoryStorage::connect(server, table, RESPONSES_NAMESPACE).await?;
        let redirects = MemoryStorage::connect(server, table, REDIRECTS_NAMESPACE).await?;
        Ok(Self::new(responses, redirects))
    }
}

impl<S, F> Cache<S, F>
where
    S: Storage,
    F: Format,
{
    /// Replaces the value format.
    pub fn with_format<G: Format>(self, format: G) -> Cache<S, G> {
        Cache {
            responses: self.responses,
            redirects: self.redirects,
            format,
            clock: self.clock,
            key_generator: self.key_generator,
        }
    }

    /// Replaces the time source used for creation times and expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the key generator.
    pub fn with_key_generator<K>(mut self, key_generator: K) -> Self
    where
        K: KeyGenerator<CachedRequest> + 'static,
    {
        self.key_generator = Arc::new(key_generator);
        self
    }

    /// Storage of the `responses` namespace.
    pub fn response_storage(&self) -> &S {
        &self.responses
    }

    /// Storage of the `redirects` namespace.
    pub fn redirect_storage(&self) -> &S {
        &self.redirects
    }

    /// Creates the cache key of a request.
    pub fn create_key(&self, request: &CachedRequest) -> String {
        self.key_generator.create_key(request)
    }

    /// Reads the response stored under `key`, following a redirect alias if
    /// needed.
    ///
    /// A missing entry is `None`. An entry that cannot be decoded is logged
    /// and also treated as missing.
    pub async fn get_response(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let data = match self.responses.get(key).await {
            Ok(data) => data,
            Err(error) if error.is_not_found() => {
                let Some(target) = self.redirect_target(key).await? else {
                    return Ok(None);
                };
                match self.responses.get(&target).await {
                    Ok(data) => data,
                    Err(error) if error.is_not_found() => return Ok(None),
                    Err(error) => return Err(error.into()),
                }
            }
            Err(error) => return Err(error.into()),
        };

        match CachedResponse::deserialize(&data, &self.format) {
            Ok(mut response) => {
                response.cache_key = Some(key.to_owned());
                Ok(Some(response))
            }
            Err(error) => {
                error!(key, %error, "Unable to deserialize response");
                Ok(None)
            }
        }
    }

    /// Snapshots and stores a response, plus an alias for every redirect
    /// that led to it.
    pub async fn save_response<R>(
        &self,
        response: &R,
        cache_key: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<CachedResponse, CacheError>
    where
        R: ResponseSource + ?Sized,
    {
        let snapshot = CachedResponse::from_response(
            response,
            SnapshotOverrides::new()
                .received_at(self.clock.now())
                .expires(expires)
                .cache_key(cache_key),
        );
        self.responses
            .set(cache_key, snapshot.serialize(&self.format)?)
            .await?;
        for entry in &snapshot.history {
            let alias = self.create_key(&entry.request);
            self.redirects
                .set_value(&alias, cache_key, &self.format)
                .await?;
        }
        debug!(key = cache_key, redirects = snapshot.history.len(), "Saved response");
        Ok(snapshot)
    }

    /// Deletes a response and its redirect aliases, or a single alias.
    ///
    /// Missing keys are ignored.
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        if let Ok(data) = self.responses.get(key).await
            && let Ok(response) = CachedResponse::deserialize(&data, &self.format)
        {
            for entry in &response.history {
                ignore_missing(self.redirects.delete(&self.create_key(&entry.request)).await)?;
            }
        }
        ignore_missing(self.responses.delete(key).await)?;
        ignore_missing(self.redirects.delete(key).await)?;
        Ok(())
    }

    /// Deletes several responses, then every alias left dangling.
    pub async fn bulk_delete(&self, keys: Vec<String>) -> Result<(), CacheError> {
        self.responses.bulk_delete(keys).await?;
        self.remove_invalid_redirects().await
    }

    /// Deletes aliases that no longer point at a stored response.
    pub async fn remove_invalid_redirects(&self) -> Result<(), CacheError> {
        let aliases: Vec<String> = self.redirects.keys().await?.try_collect().await?;
        let mut invalid = Vec::new();
        for alias in aliases {
            let valid = match self.redirect_target(&alias).await? {
                Some(target) => self.responses.contains(&target).await?,
                None => false,
            };
            if !valid {
                invalid.push(alias);
            }
        }
        debug!(count = invalid.len(), "Removing invalid redirects");
        self.redirects.bulk_delete(invalid).await?;
        Ok(())
    }

    /// Deletes every response and alias.
    pub async fn clear(&self) -> Result<(), CacheError> {
        info!("Clearing all items from the cache");
        self.responses.clear().await?;
        self.redirects.clear().await?;
        Ok(())
    }

    /// Alias keys and the keys of decodable responses.
    ///
    /// With `check_expiry`, expired responses are left out.
    pub async fn keys(&self, check_expiry: bool) -> Result<Vec<String>, CacheError> {
        let mut keys: Vec<String> = self.redirects.keys().await?.try_collect().await?;
        keys.extend(
            self.valid_responses(check_expiry, false)
                .await?
                .into_iter()
                .map(|(key, _)| key),
        );
        Ok(keys)
    }

    /// Every decodable response.
    ///
    /// With `check_expiry`, expired responses are left out.
    pub async fn responses(&self, check_expiry: bool) -> Result<Vec<CachedResponse>, CacheError> {
        Ok(self
            .valid_responses(check_expiry, false)
            .await?
            .into_iter()
            .map(|(_, response)| response)
            .collect())
    }

    /// Number of decodable responses, optionally excluding expired ones.
    pub async fn response_count(&self, check_expiry: bool) -> Result<usize, CacheError> {
        Ok(self.valid_responses(check_expiry, false).await?.len())
    }

    /// Returns `true` if `key` is a response key or an alias.
    pub async fn has_key(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.responses.contains(key).await? || self.redirects.contains(key).await?)
    }

    /// Final URLs of all stored responses.
    pub async fn urls(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .responses(false)
            .await?
            .into_iter()
            .map(|response| response.url)
            .collect())
    }

    /// Deletes expired and undecodable responses.
    ///
    /// With `expire_after`, the expiration of every remaining response is
    /// reset first; responses that are expired after the reset are deleted
    /// too.
    pub async fn remove_expired_responses(
        &self,
        expire_after: Option<&ExpireAfter>,
    ) -> Result<(), CacheError> {
        info!(?expire_after, "Removing expired responses");
        let now = self.clock.now();
        let mut to_update = Vec::new();
        let mut to_delete = Vec::new();

        for (key, mut response) in self.valid_responses(false, true).await? {
            if let Some(expire_after) = expire_after
                && !response.reset_expiration(Some(expire_after), now)
            {
                to_update.push((key, response));
                continue;
            }
            if response.is_expired_at(now) {
                to_delete.push(key);
            }
        }

        debug!(count = to_delete.len(), "Deleting expired responses");
        self.bulk_delete(to_delete).await?;
        debug!(count = to_update.len(), "Updating response expirations");
        for (key, response) in to_update {
            self.responses
                .set(&key, response.serialize(&self.format)?)
                .await?;
        }
        Ok(())
    }

    async fn redirect_target(&self, alias: &str) -> Result<Option<String>, CacheError> {
        match self.redirects.get_value::<String, _>(alias, &self.format).await {
            Ok(target) => Ok(Some(target)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(StorageError::Format(error)) => {
                error!(key = alias, %error, "Unable to deserialize redirect");
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Decodable responses with their keys.
    ///
    /// Undecodable responses (and expired ones, with `check_expiry`) are
    /// skipped, and deleted when `delete` is set.
    async fn valid_responses(
        &self,
        check_expiry: bool,
        delete: bool,
    ) -> Result<Vec<(String, CachedResponse)>, CacheError> {
        let now = self.clock.now();
        let keys: Vec<String> = self.responses.keys().await?.try_collect().await?;
        let mut valid = Vec::with_capacity(keys.len());
        let mut invalid = Vec::new();

        for key in keys {
            let data = match self.responses.get(&key).await {
                Ok(data) => data,
                // Deleted since the keys were listed.
                Err(error) if error.is_not_found() => continue,
                Err(error) => return Err(error.into()),
            };
            match CachedResponse::deserialize(&data, &self.format) {
                Ok(response) if check_expiry && response.is_expired_at(now) => invalid.push(key),
                Ok(mut response) => {
                    response.cache_key = Some(key.clone());
                    valid.push((key, response));
                }
                Err(error) => {
                    debug!(key, %error, "Skipping undecodable response");
                    invalid.push(key);
                }
            }
        }

        if delete {
            debug!(count = invalid.len(), "Deleting invalid responses");
            self.bulk_delete(invalid).await?;
        }
        Ok(valid)
    }
}

impl<S, F> fmt::Debug for Cache<S, F>
where
    S: Storage,
    F: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("responses", &self.responses.label())
            .field("redirects", &self.redirects.label())
            .field("format", &self.format)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn ignore_missing(result: Result<(), StorageError>) -> Result<(), CacheError> {
    match result {
        Err(error) if !error.is_not_found() => Err(error.into()),
        _ => Ok(()),
    }
}
