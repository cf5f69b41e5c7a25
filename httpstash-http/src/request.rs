use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, Method, Request};
use serde::{Deserialize, Serialize};

/// Stored form of the request that produced a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedRequest {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    #[serde(with = "crate::headers::pairs")]
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

impl CachedRequest {
    /// Snapshots a request.
    pub fn from_request(request: &Request<Bytes>) -> Self {
        Self {
            method: request.method().as_str().to_owned(),
            url: request.uri().to_string(),
            headers: request.headers().clone(),
            body: request.body().clone(),
        }
    }

    /// Parsed request method.
    pub fn method(&self) -> Result<Method, http::method::InvalidMethod> {
        Method::from_bytes(self.method.as_bytes())
    }

    /// Rebuilds a request that can be sent again.
    pub fn to_request(&self) -> Result<Request<Bytes>, http::Error> {
        let mut builder = Request::builder()
            .method(self.method.as_str())
            .uri(self.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
        }
        builder.body(self.body.clone())
    }
}

impl From<&Request<Bytes>> for CachedRequest {
    fn from(request: &Request<Bytes>) -> Self {
        Self::from_request(request)
    }
}

impl fmt::Display for CachedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = Request::post("https://example.com/items?page=2")
            .header("accept", "application/json")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        let cached = CachedRequest::from_request(&request);
        assert_eq!(cached.to_string(), "POST https://example.com/items?page=2");
        assert_eq!(cached.method().unwrap(), Method::POST);

        let rebuilt = cached.to_request().unwrap();
        assert_eq!(rebuilt.method(), Method::POST);
        assert_eq!(rebuilt.uri(), request.uri());
        assert_eq!(rebuilt.headers(), request.headers());
        assert_eq!(rebuilt.body(), request.body());
    }
}
