use std::io::{self, Cursor, Read};

use bytes::Bytes;
use http::{HeaderMap, Response, Version};
use serde::{Deserialize, Serialize};

/// Transport-level metadata of a stored response.
///
/// The body cursor is not stored; [`CachedHttpResponse::reset`] rebuilds it
/// from the snapshot body after deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedHttpResponse {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response headers as received.
    #[serde(with = "crate::headers::pairs")]
    pub headers: HeaderMap,
    #[serde(skip)]
    body: Cursor<Bytes>,
}

impl CachedHttpResponse {
    /// Snapshots the metadata of a live response.
    pub fn from_response(response: &Response<Bytes>) -> Self {
        let status = response.status();
        Self {
            version: version_str(response.version()).to_owned(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: response.headers().clone(),
            body: Cursor::new(response.body().clone()),
        }
    }

    /// Replaces the readable body and rewinds it.
    pub fn reset(&mut self, body: Bytes) {
        self.body = Cursor::new(body);
    }

    /// Returns `true` if no body has been attached.
    pub fn body_is_empty(&self) -> bool {
        self.body.get_ref().is_empty()
    }

    /// Reads the remaining body without consuming it from the snapshot.
    pub fn remaining(&self) -> Bytes {
        let position = usize::try_from(self.body.position()).unwrap_or(usize::MAX);
        let body = self.body.get_ref();
        body.slice(position.min(body.len())..)
    }
}

impl Read for CachedHttpResponse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_cursor() {
        let response = Response::builder()
            .status(404)
            .header("x-test", "1")
            .body(Bytes::from_static(b"hello world"))
            .unwrap();
        let mut raw = CachedHttpResponse::from_response(&response);
        assert_eq!(raw.status, 404);
        assert_eq!(raw.reason, "Not Found");
        assert_eq!(raw.version, "HTTP/1.1");

        let mut head = [0u8; 5];
        raw.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"hello");
        assert_eq!(raw.remaining(), " world");

        raw.reset(Bytes::from_static(b"again"));
        let mut all = String::new();
        raw.read_to_string(&mut all).unwrap();
        assert_eq!(all, "again");
    }
}
