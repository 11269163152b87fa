//! Message definitions for the broker
//!
//! `Message` is what a publisher hands to the broker and what a consumer
//! receives back inside a `Delivery`.
//!
//! Notes on fields:
//! - `body`: raw bytes; the relay only ever sends UTF-8 text
//! - `content_type`: always `text/plain` for relay traffic
//! - `correlation_id`: links a response to the request that caused it
//! - `headers`: free-form string properties (the auth outcome tag lives here)
//! - `timestamp`: milliseconds since UNIX epoch; set by the broker on enqueue

use std::collections::BTreeMap;

pub const TEXT_PLAIN: &str = "text/plain";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: String,
    pub correlation_id: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timestamp: i64,
}

impl Message {
    /// A `text/plain` message with no properties set.
    pub fn text(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            content_type: TEXT_PLAIN.to_string(),
            correlation_id: None,
            headers: BTreeMap::new(),
            timestamp: 0,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Body as text, lossy for invalid UTF-8. Used for logging.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
