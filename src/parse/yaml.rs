//! YAML decoding.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;

/// Decodes a YAML document into `T`.
pub fn yaml<T>(data: &[u8]) -> Result<T, DecodeError>
where
    T: DeserializeOwned + Default,
{
    if data.is_empty() {
        return Ok(T::default());
    }

    Ok(serde_yaml::from_slice(data)?)
}
