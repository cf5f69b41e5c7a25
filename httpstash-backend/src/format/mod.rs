//! Value serialization formats.
//!
//! A [`Format`] turns a serde value into the raw bytes a [`Storage`](crate::Storage)
//! keeps, and back. Formats are plain values, so a cache can be generic over
//! its format without boxing.

use httpstash_core::Raw;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

mod bincode;
mod json;

pub use bincode::BincodeFormat;
pub use json::JsonFormat;

/// Serialization or deserialization failure of a stored value.
#[derive(Error, Debug)]
pub enum FormatError {
    /// Encoding a value failed.
    #[error(transparent)]
    Serialize(Box<dyn std::error::Error + Send + Sync>),

    /// Decoding stored bytes failed.
    #[error(transparent)]
    Deserialize(Box<dyn std::error::Error + Send + Sync>),
}

/// Serialization format for stored values.
pub trait Format: std::fmt::Debug + Send + Sync {
    /// Encodes a value.
    fn serialize<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized;

    /// Decodes a value previously produced by [`Format::serialize`].
    fn deserialize<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned;
}

impl<F: Format + ?Sized> Format for &F {
    fn serialize<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized,
    {
        (**self).serialize(value)
    }

    fn deserialize<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        (**self).deserialize(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        status: u16,
        headers: Vec<(String, String)>,
        expires: Option<i64>,
        body: Vec<u8>,
    }

    fn entry() -> Entry {
        Entry {
            status: 200,
            headers: vec![
                ("content-type".to_owned(), "text/plain".to_owned()),
                ("set-cookie".to_owned(), "a=1".to_owned()),
                ("set-cookie".to_owned(), "b=2".to_owned()),
            ],
            expires: None,
            body: b"hello".to_vec(),
        }
    }

    fn roundtrip<F: Format>(format: F) {
        let raw = format.serialize(&entry()).unwrap();
        let decoded: Entry = format.deserialize(&raw).unwrap();
        assert_eq!(decoded, entry());
    }

    #[test]
    fn test_json_roundtrip() {
        roundtrip(JsonFormat);
    }

    #[test]
    fn test_bincode_roundtrip() {
        roundtrip(BincodeFormat);
    }

    #[test]
    fn test_garbage_is_a_deserialize_error() {
        let result: Result<Entry, _> = JsonFormat.deserialize(b"not json");
        assert!(matches!(result, Err(FormatError::Deserialize(_))));

        let result: Result<Entry, _> = BincodeFormat.deserialize(&[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(FormatError::Deserialize(_))));
    }

    #[test]
    fn test_borrowed_format() {
        roundtrip(&JsonFormat);
        roundtrip(&BincodeFormat);
    }
}
