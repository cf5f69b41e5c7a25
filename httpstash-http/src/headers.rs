//! Header map helpers.

use http::header::{CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue};

/// Serde adapter storing a [`HeaderMap`] as an ordered list of `(name, value)` pairs.
///
/// Repeated headers keep their order, and the list form round-trips through
/// formats that are not self-describing.
///
/// ```
/// use http::HeaderMap;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Stored {
///     #[serde(with = "httpstash_http::headers::pairs")]
///     headers: HeaderMap,
/// }
/// ```
pub mod pairs {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serializes `headers` as `[(name, value), ..]`.
    pub fn serialize<S>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        to_pairs(headers).serialize(serializer)
    }

    /// Rebuilds a header map, dropping pairs that are not valid header fields.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<HeaderMap, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
        Ok(from_pairs(pairs))
    }
}

/// Flattens a header map into `(name, value)` pairs in iteration order.
///
/// Values that are not visible ASCII are decoded lossily.
pub fn to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Builds a header map from `(name, value)` pairs, appending repeated names.
pub fn from_pairs<I, N, V>(pairs: I) -> HeaderMap
where
    I: IntoIterator<Item = (N, V)>,
    N: AsRef<str>,
    V: AsRef<str>,
{
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_ref().as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            map.append(name, value);
        }
    }
    map
}

/// `Set-Cookie` values in header order.
pub fn cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_owned)
        .collect()
}

/// Text encoding announced by `Content-Type`.
///
/// An explicit `charset` parameter wins; otherwise `text/*` defaults to
/// ISO-8859-1 and JSON to UTF-8.
pub fn encoding(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mut parts = content_type.split(';');
    let mime = parts.next()?.trim().to_ascii_lowercase();

    for parameter in parts {
        if let Some((key, value)) = parameter.split_once('=')
            && key.trim().eq_ignore_ascii_case("charset")
        {
            return Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_owned());
        }
    }

    if mime.starts_with("text/") {
        Some("ISO-8859-1".to_owned())
    } else if mime == "application/json" {
        Some("utf-8".to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_keep_repeated_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let rebuilt = from_pairs(to_pairs(&headers));
        assert_eq!(rebuilt, headers);
        assert_eq!(cookies(&rebuilt), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_invalid_pairs_are_dropped() {
        let headers = from_pairs([("bad name", "x"), ("x-ok", "1")]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-ok"], "1");
    }

    #[test]
    fn test_encoding() {
        let with = |value: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
            encoding(&headers)
        };
        assert_eq!(with("text/html; charset=\"UTF-8\"").as_deref(), Some("UTF-8"));
        assert_eq!(with("text/plain").as_deref(), Some("ISO-8859-1"));
        assert_eq!(with("application/json").as_deref(), Some("utf-8"));
        assert_eq!(with("image/png"), None);
        assert_eq!(encoding(&HeaderMap::new()), None);
    }
}
