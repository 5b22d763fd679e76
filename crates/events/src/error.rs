//! Codec error types.

use thiserror::Error;

/// Field name reported when the body as a whole is unusable
/// (not UTF-8, not JSON, not an object).
pub const BODY_FIELD: &str = "<body>";

/// A message body could not be decoded into the expected event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid field `{field}`: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field, or `<body>`.
    pub field: String,
    /// Human readable reason.
    pub message: String,
}

impl ValidationError {
    /// Creates an error for a specific field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an error concerning the whole body.
    pub fn body(message: impl Into<String>) -> Self {
        Self::field(BODY_FIELD, message)
    }

    pub(crate) fn from_path_error(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let message = inner.to_string();

        if inner.is_syntax() || inner.is_eof() || inner.is_io() {
            return Self::body(message);
        }

        // serde reports a missing field against its parent, so the field
        // name has to be recovered from the message.
        if let Some(missing) = missing_field_name(&message) {
            let field = if path == "." {
                missing.to_string()
            } else {
                format!("{path}.{missing}")
            };
            return Self::field(field, message);
        }

        if path == "." {
            Self::body(message)
        } else {
            Self::field(path, message)
        }
    }
}

fn missing_field_name(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

/// An event could not be serialized.
#[derive(Debug, Error)]
#[error("failed to encode {event_type}: {source}")]
pub struct EncodeError {
    pub event_type: &'static str,
    #[source]
    pub source: serde_json::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_missing_field_name() {
        assert_eq!(
            missing_field_name("missing field `order_id` at line 1 column 2"),
            Some("order_id")
        );
        assert_eq!(missing_field_name("invalid type: string"), None);
    }

    #[test]
    fn display_names_field() {
        let err = ValidationError::field("quantity", "must be at least 1");
        assert_eq!(err.to_string(), "invalid field `quantity`: must be at least 1");
    }
}
