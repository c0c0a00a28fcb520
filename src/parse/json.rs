//! JSON decoding.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;

/// Decodes a JSON document into `T`.
pub fn json<T>(data: &[u8]) -> Result<T, DecodeError>
where
    T: DeserializeOwned + Default,
{
    if data.is_empty() {
        return Ok(T::default());
    }

    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct LogConfig {
        level: String,
    }

    #[test]
    fn decodes_document() {
        let config: LogConfig = json(br#"{"level":"debug"}"#).unwrap();
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn empty_payload_is_default() {
        let config: LogConfig = json(b"").unwrap();
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let err = json::<LogConfig>(b"{\"level\":").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
