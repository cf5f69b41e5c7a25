use bytes::Bytes;
use httpstash_core::Raw;
use serde::{Serialize, de::DeserializeOwned};

use super::{Format, FormatError};

/// Bincode format
///
/// Compact binary encoding through bincode's serde bridge. Bincode is not
/// self-describing, so values must not rely on `skip_serializing_if` or
/// untagged enums.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeFormat;

impl Format for BincodeFormat {
    fn serialize<T>(&self, value: &T) -> Result<Raw, FormatError>
    where
        T: Serialize + ?Sized,
    {
        ::bincode::serde::encode_to_vec(value, ::bincode::config::standard())
            .map(Bytes::from)
            .map_err(|e| FormatError::Serialize(Box::new(e)))
    }

    fn deserialize<T>(&self, data: &[u8]) -> Result<T, FormatError>
    where
        T: DeserializeOwned,
    {
        let (value, _read) =
            ::bincode::serde::decode_from_slice(data, ::bincode::config::standard())
                .map_err(|e| FormatError::Deserialize(Box::new(e)))?;
        Ok(value)
    }
}
