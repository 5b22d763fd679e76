use chrono::{DateTime, Utc};

/// Header carrying the number of times a message has been retried.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Content type of every event body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message as it travels through the broker: the serialized event plus its
/// delivery metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEnvelope {
    /// Unique identifier assigned at publish time.
    pub message_id: String,

    /// The serialized event.
    pub body: Vec<u8>,

    /// MIME type of the body.
    pub content_type: String,

    /// Whether the message survives a broker restart.
    pub persistent: bool,

    /// Value of the `x-retry-count` header; 0 when absent.
    pub retry_count: u32,

    /// Exchange the message was published to (empty for the default exchange).
    pub exchange: String,

    /// Routing key the message was published with.
    pub routing_key: String,

    /// When the message was published.
    pub published_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Creates a new envelope builder.
    pub fn builder() -> MessageEnvelopeBuilder {
        MessageEnvelopeBuilder::default()
    }

    /// Wraps a JSON body in a persistent envelope.
    pub fn json(body: Vec<u8>) -> Self {
        Self::builder().body(body).build()
    }

    /// Returns a copy of this envelope carrying a different retry count.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Returns the body as text, truncated to `max_chars` characters, for
    /// diagnostics. Invalid UTF-8 is replaced.
    pub fn body_preview(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.into_owned(),
        }
    }
}

/// Builder for constructing message envelopes.
#[derive(Debug)]
pub struct MessageEnvelopeBuilder {
    message_id: Option<String>,
    body: Vec<u8>,
    content_type: String,
    persistent: bool,
    retry_count: u32,
    published_at: Option<DateTime<Utc>>,
}

impl Default for MessageEnvelopeBuilder {
    fn default() -> Self {
        Self {
            message_id: None,
            body: Vec::new(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            persistent: true,
            retry_count: 0,
            published_at: None,
        }
    }
}

impl MessageEnvelopeBuilder {
    /// Sets the message ID. If not set, a new ID will be generated.
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the content type (defaults to `application/json`).
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the persistence flag (defaults to persistent).
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Sets the retry count.
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the publish time. If not set, the current time will be used.
    pub fn published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Builds the envelope.
    pub fn build(self) -> MessageEnvelope {
        MessageEnvelope {
            message_id: self
                .message_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            body: self.body,
            content_type: self.content_type,
            persistent: self.persistent,
            retry_count: self.retry_count,
            exchange: String::new(),
            routing_key: String::new(),
            published_at: self.published_at.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelopes_are_persistent() {
        let envelope = MessageEnvelope::json(b"{}".to_vec());
        assert!(envelope.persistent);
        assert_eq!(envelope.content_type, JSON_CONTENT_TYPE);
        assert_eq!(envelope.retry_count, 0);
        assert!(!envelope.message_id.is_empty());
    }

    #[test]
    fn builder_sets_fields() {
        let envelope = MessageEnvelope::builder()
            .message_id("m-1")
            .body("hello")
            .persistent(false)
            .retry_count(2)
            .build();
        assert_eq!(envelope.message_id, "m-1");
        assert_eq!(envelope.body, b"hello");
        assert!(!envelope.persistent);
        assert_eq!(envelope.retry_count, 2);
    }

    #[test]
    fn body_preview_truncates_on_char_boundary() {
        let envelope = MessageEnvelope::json("héllo wörld".as_bytes().to_vec());
        assert_eq!(envelope.body_preview(5), "héllo...");
        assert_eq!(envelope.body_preview(100), "héllo wörld");
    }

    #[test]
    fn body_preview_tolerates_invalid_utf8() {
        let envelope = MessageEnvelope::json(vec![0xff, b'a']);
        assert_eq!(envelope.body_preview(10), "\u{fffd}a");
    }

    #[test]
    fn with_retry_count_keeps_body() {
        let envelope = MessageEnvelope::json(b"x".to_vec()).with_retry_count(3);
        assert_eq!(envelope.retry_count, 3);
        assert_eq!(envelope.body, b"x");
    }
}
