//! Click tracking and analytics events.

use common::UserId;
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::timestamp::{self, Timestamp};

/// One tracked click, buffered through the click queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTracked {
    pub user_id: UserId,
    pub page: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub timestamp: Timestamp,
}

impl ClickTracked {
    pub fn new(user_id: UserId, page: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            user_id,
            page: page.into(),
            session_id,
            timestamp: timestamp::now(),
        }
    }
}

impl Event for ClickTracked {
    const NAME: &'static str = "ClickTracked";
}

/// Summary of a processed analytics batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsProcessed {
    pub batch_id: String,
    pub events_count: u64,
    #[serde(with = "timestamp", default = "timestamp::now")]
    pub processed_at: Timestamp,
}

impl AnalyticsProcessed {
    pub fn new(batch_id: impl Into<String>, events_count: u64) -> Self {
        Self {
            batch_id: batch_id.into(),
            events_count,
            processed_at: timestamp::now(),
        }
    }
}

impl Event for AnalyticsProcessed {
    const NAME: &'static str = "AnalyticsProcessed";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_optional() {
        let body = br#"{"user_id": 7, "page": "/home"}"#;
        let click = ClickTracked::decode(body).unwrap();
        assert!(click.session_id.is_none());
    }

    #[test]
    fn test_session_id_null_is_accepted() {
        let body = br#"{"user_id": 7, "page": "/home", "session_id": null}"#;
        assert!(ClickTracked::decode(body).unwrap().session_id.is_none());
    }

    #[test]
    fn test_events_count_rejects_negative() {
        let body = br#"{"batch_id": "b1", "events_count": -1}"#;
        let err = AnalyticsProcessed::decode(body).unwrap_err();
        assert_eq!(err.field, "events_count");
    }
}
