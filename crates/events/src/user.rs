//! User registration events.

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::Event;
use crate::timestamp::{self, Timestamp};

/// Published by the user service when a new user registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub email: String,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl UserRegistered {
    pub fn new(user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            timestamp: timestamp::now(),
        }
    }
}

impl Event for UserRegistered {
    const NAME: &'static str = "UserRegistered";

    fn validate(&self) -> Result<(), ValidationError> {
        if is_valid_email(&self.email) {
            Ok(())
        } else {
            Err(ValidationError::field(
                "email",
                format!("{:?} is not a valid email address", self.email),
            ))
        }
    }
}

/// Structural email check: one `@`, a non-empty local part and a dotted
/// domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_roundtrip() {
        let event = UserRegistered::new(UserId::new(123), "user@example.com");
        let bytes = event.encode().unwrap();
        assert_eq!(UserRegistered::decode(&bytes).unwrap(), event);
    }

    #[test]
    fn test_decodes_producer_payload_without_offset() {
        let body = br#"{"user_id": 123, "email": "user@example.com", "timestamp": "2025-01-01T12:00:00"}"#;
        let event = UserRegistered::decode(body).unwrap();
        assert_eq!(event.user_id, UserId::new(123));
        assert_eq!(
            timestamp::format(&event.timestamp),
            "2025-01-01T12:00:00.000000Z"
        );
    }

    #[test]
    fn test_rejects_invalid_email() {
        let body = br#"{"user_id": 1, "email": "not-an-email"}"#;
        let err = UserRegistered::decode(body).unwrap_err();
        assert_eq!(err.field, "email");
    }

    #[test]
    fn test_email_check() {
        assert!(is_valid_email("a@b.io"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.io"));
        assert!(!is_valid_email("a b@c.io"));
        assert!(!is_valid_email("a@@c.io"));
        assert!(!is_valid_email("a@.io"));
    }
}
