use std::time::Duration;

use bytes::Bytes;
use http::{Response, StatusCode};

use crate::CachedRequest;

/// A response as returned by the transport, with its redirect chain.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// The request that produced this response.
    pub request: CachedRequest,
    /// Status, headers and fully read body.
    pub response: Response<Bytes>,
    /// Final URL after redirects.
    pub url: String,
    /// Time between sending the request and receiving the headers.
    pub elapsed: Duration,
    /// Redirect responses that led here, oldest first.
    pub history: Vec<FetchedResponse>,
    /// Next request of the redirect chain, if this response is a redirect.
    pub next: Option<CachedRequest>,
}

impl FetchedResponse {
    /// Wraps a response to `request` with no redirect history.
    pub fn new(request: CachedRequest, response: Response<Bytes>) -> Self {
        let url = request.url.clone();
        Self {
            request,
            response,
            url,
            elapsed: Duration::ZERO,
            history: Vec::new(),
            next: None,
        }
    }

    /// Sets the redirect history.
    pub fn with_history(mut self, history: Vec<FetchedResponse>) -> Self {
        self.history = history;
        self
    }

    /// Sets the final URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the elapsed time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Sets the next request of the redirect chain.
    pub fn with_next(mut self, next: CachedRequest) -> Self {
        self.next = Some(next);
        self
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Response headers.
    pub fn headers(&self) -> &http::HeaderMap {
        self.response.headers()
    }

    /// Response body.
    pub fn body(&self) -> &Bytes {
        self.response.body()
    }
}
