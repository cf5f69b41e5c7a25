//! Default cache key derivation.

use bytes::Bytes;
use http::{HeaderName, Request};
use httpstash_core::KeyGenerator;
use sha2::{Digest, Sha256};

use crate::CachedRequest;

/// Hashes method, URL and body (plus selected headers) with SHA-256.
///
/// Keys are the first 16 bytes of the digest, hex encoded.
///
/// ```
/// use httpstash_core::KeyGenerator;
/// use httpstash_http::{CachedRequest, Sha256KeyGenerator};
///
/// let request = CachedRequest {
///     method: "GET".to_owned(),
///     url: "https://example.com/".to_owned(),
///     ..Default::default()
/// };
/// assert_eq!(Sha256KeyGenerator::default().create_key(&request).len(), 32);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Sha256KeyGenerator {
    match_headers: Vec<HeaderName>,
}

impl Sha256KeyGenerator {
    /// Creates a generator that ignores headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also distinguishes requests by the values of these headers.
    pub fn match_headers(mut self, headers: impl IntoIterator<Item = HeaderName>) -> Self {
        self.match_headers = headers.into_iter().collect();
        self
    }

    fn digest(&self, method: &str, url: &str, headers: &http::HeaderMap, body: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        for name in &self.match_headers {
            hasher.update(name.as_str().as_bytes());
            hasher.update(b"=");
            for value in headers.get_all(name) {
                hasher.update(value.as_bytes());
                hasher.update(b",");
            }
            hasher.update(b"\n");
        }
        hasher.update(body);
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl KeyGenerator<CachedRequest> for Sha256KeyGenerator {
    fn create_key(&self, request: &CachedRequest) -> String {
        self.digest(&request.method, &request.url, &request.headers, &request.body)
    }
}

impl KeyGenerator<Request<Bytes>> for Sha256KeyGenerator {
    fn create_key(&self, request: &Request<Bytes>) -> String {
        self.digest(
            request.method().as_str(),
            &request.uri().to_string(),
            request.headers(),
            request.body(),
        )
    }
}
