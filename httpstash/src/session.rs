//! Request orchestration over a transport and a cache.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use httpstash_backend::Storage;
use httpstash_backend::format::{Format, JsonFormat};
use httpstash_core::Transport;
use httpstash_http::{CachedRequest, CachedResponse, FetchedResponse, OriginalResponse, Response};
use tracing::{debug, warn};

use crate::metrics::{self, Event};
use crate::{Cache, CacheActions, CacheError, CacheSettings};

/// Sends requests through a transport, answering from the cache when it can.
///
/// Every request goes through the same steps: build the read decision, read
/// the stored response, then serve it, revalidate it, refetch it, or answer
/// `504 Gateway Timeout` when `only-if-cached` cannot be satisfied.
pub struct CachedSession<T, S, F = JsonFormat> {
    transport: T,
    cache: Arc<Cache<S, F>>,
    settings: Arc<CacheSettings>,
}

impl<T, S, F> CachedSession<T, S, F>
where
    T: Transport<CachedRequest> + Clone,
    S: Storage,
    F: Format,
{
    /// Creates a session. The cache adopts the clock of `settings`.
    pub fn new(transport: T, cache: Cache<S, F>, settings: CacheSettings) -> Self {
        let cache = cache.with_clock(Arc::clone(&settings.clock));
        Self {
            transport,
            cache: Arc::new(cache),
            settings: Arc::new(settings),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Cache<S, F> {
        &self.cache
    }

    /// Current settings.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }
}

impl<T, S, F, E> CachedSession<T, S, F>
where
    T: Transport<CachedRequest, Response = Result<FetchedResponse, E>> + Clone,
    E: Into<Box<dyn StdError + Send + Sync>>,
    S: Storage,
    F: Format,
{
    /// Sends a request, or answers it from the cache.
    ///
    /// Transport errors are returned as [`CacheError::Transport`] unless a
    /// stale response may be served instead.
    pub async fn send(&self, request: CachedRequest) -> Result<Response, CacheError> {
        let cache_key = self.cache.create_key(&request);
        let mut actions = CacheActions::from_request(cache_key, &request, Arc::clone(&self.settings));

        let cached = if actions.skip_read {
            None
        } else {
            self.cache.get_response(&actions.cache_key).await?
        };
        actions.update_from_cached_response(cached.as_ref());

        if actions.error_504 {
            debug!(url = %request.url, "Request cannot be satisfied from the cache");
            metrics::record(Event::Unsatisfiable);
            return Ok(self.gateway_timeout(request));
        }
        if actions.resend_request {
            debug!(url = %request.url, "Stale response; attempting to re-send request");
            metrics::record(Event::Stale);
            return self.resend(request, &mut actions, cached).await;
        }
        if actions.send_request {
            if cached.is_none() {
                metrics::record(Event::Miss);
            }
            return self.send_and_cache(request, &mut actions, cached.as_ref()).await;
        }

        match cached {
            Some(cached) => {
                debug!(url = %request.url, key = %actions.cache_key, "Serving response from cache");
                metrics::record(Event::Hit);
                Ok(Response::Cached(cached))
            }
            // Without a stored response the read decision always sends the request.
            None => self.send_and_cache(request, &mut actions, None).await,
        }
    }

    async fn send_and_cache(
        &self,
        mut request: CachedRequest,
        actions: &mut CacheActions,
        cached: Option<&CachedResponse>,
    ) -> Result<Response, CacheError> {
        actions.update_request(&mut request);
        let mut transport = self.transport.clone();
        let response = transport
            .send(request)
            .await
            .map_err(|error| CacheError::Transport(error.into()))?;
        actions.update_from_response(&response);

        let now = self.settings.clock.now();
        if !actions.skip_write {
            let expires = actions.expires();
            self.cache
                .save_response(&response, &actions.cache_key, expires)
                .await?;
            return Ok(Response::Original(OriginalResponse::wrap(
                response,
                Some(actions.cache_key.clone()),
                now,
                expires,
            )));
        }

        if let Some(cached) = cached
            && response.status() == StatusCode::NOT_MODIFIED
        {
            metrics::record(Event::Revalidated);
            let revalidated = actions.update_revalidated_response(&response, cached.clone());
            let saved = self
                .cache
                .save_response(&revalidated, &actions.cache_key, revalidated.expires)
                .await?;
            return Ok(Response::Cached(saved));
        }

        debug!(url = %response.request.url, "Skipping cache write");
        metrics::record(Event::WriteSkipped);
        Ok(Response::Original(OriginalResponse::wrap(response, None, now, None)))
    }

    async fn resend(
        &self,
        request: CachedRequest,
        actions: &mut CacheActions,
        cached: Option<CachedResponse>,
    ) -> Result<Response, CacheError> {
        let result = self.send_and_cache(request, actions, cached.as_ref()).await;
        let failed = match &result {
            Ok(response) => {
                actions.stale_if_error().is_some()
                    && (response.status().is_client_error() || response.status().is_server_error())
            }
            Err(_) => true,
        };
        if !failed {
            return result;
        }

        match cached {
            Some(cached) if actions.is_usable(Some(&cached), true) => {
                warn!(
                    url = %cached.url,
                    "Request failed; returning stale cached response"
                );
                Ok(Response::Cached(cached))
            }
            _ => result,
        }
    }

    fn gateway_timeout(&self, request: CachedRequest) -> Response {
        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = StatusCode::GATEWAY_TIMEOUT;
        let now = self.settings.clock.now();
        Response::Original(OriginalResponse::wrap(
            FetchedResponse::new(request, response),
            None,
            now,
            None,
        ))
    }
}

impl<T, S, F> fmt::Debug for CachedSession<T, S, F>
where
    S: Storage,
    F: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedSession")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
