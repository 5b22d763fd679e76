//! The [`Event`] trait and the strict JSON decoder behind it.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{EncodeError, ValidationError};

/// A business fact exchanged over the broker.
///
/// Implementors are plain serde structs; the provided `encode`/`decode`
/// methods give every event the same wire behaviour.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable event name, used in logs and for name-directed decoding.
    const NAME: &'static str;

    /// Semantic checks that JSON typing alone cannot express.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Serializes the event to its canonical JSON body.
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        serde_json::to_vec(self).map_err(|source| EncodeError {
            event_type: Self::NAME,
            source,
        })
    }

    /// Decodes and validates an event from a JSON body.
    fn decode(bytes: &[u8]) -> Result<Self, ValidationError> {
        let event: Self = decode_json(bytes)?;
        event.validate()?;
        Ok(event)
    }
}

/// Strictly decodes a UTF-8 JSON document, reporting the offending field on
/// failure. Trailing data after the document is rejected.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ValidationError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ValidationError::body(format!("body is not valid UTF-8: {e}")))?;

    let mut deserializer = serde_json::Deserializer::from_str(text);
    let value = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(ValidationError::from_path_error)?;
    deserializer
        .end()
        .map_err(|e| ValidationError::body(e.to_string()))?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BODY_FIELD;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        id: i64,
        name: String,
    }

    #[test]
    fn decodes_valid_json() {
        let probe: Probe = decode_json(br#"{"id": 1, "name": "a"}"#).unwrap();
        assert_eq!(
            probe,
            Probe {
                id: 1,
                name: "a".into()
            }
        );
    }

    #[test]
    fn names_missing_field() {
        let err = decode_json::<Probe>(br#"{"id": 1}"#).unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn names_mistyped_field() {
        let err = decode_json::<Probe>(br#"{"id": "1", "name": "a"}"#).unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn non_json_is_a_body_error() {
        let err = decode_json::<Probe>(b"not json").unwrap_err();
        assert_eq!(err.field, BODY_FIELD);
    }

    #[test]
    fn non_utf8_is_a_body_error() {
        let err = decode_json::<Probe>(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.field, BODY_FIELD);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err = decode_json::<Probe>(br#"{"id": 1, "name": "a"} x"#).unwrap_err();
        assert_eq!(err.field, BODY_FIELD);
    }
}
