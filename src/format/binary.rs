//! CloudEvents binary content mode.

use super::{FormatError, MessageConverter};
use crate::event::CloudEvent;
use crate::message::{Headers, Message, Value};

/// Prefix of attribute and extension headers.
pub const DEFAULT_HEADER_PREFIX: &str = "ce-";

/// Header carrying the data content type.
pub const CONTENT_TYPE_HEADER: &str = "contentType";

/// Writes attributes and extensions as prefixed headers and the data as the
/// payload.
///
/// Pass-through headers are copied first. A pass-through header whose key
/// equals a generated one (`ce-id`, `contentType`, `ce-<extension>`, ...) is
/// overwritten by the event's value.
#[derive(Debug, Clone)]
pub struct BinaryModeConverter {
    prefix: String,
}

impl BinaryModeConverter {
    /// Create a converter with the given header prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The header prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl Default for BinaryModeConverter {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER_PREFIX)
    }
}

impl MessageConverter for BinaryModeConverter {
    fn convert(&self, event: &CloudEvent, mut headers: Headers) -> Result<Message, FormatError> {
        headers.insert(self.key("specversion"), Value::from(event.spec_version()));
        headers.insert(self.key("id"), Value::from(event.id.as_str()));
        headers.insert(self.key("source"), Value::Uri(event.source.clone()));
        headers.insert(self.key("type"), Value::from(event.event_type.as_str()));

        if let Some(time) = event.time {
            headers.insert(self.key("time"), Value::Timestamp(time));
        }
        if let Some(content_type) = &event.data_content_type {
            headers.insert(CONTENT_TYPE_HEADER.to_string(), Value::from(content_type.as_str()));
        }
        if let Some(schema) = &event.data_schema {
            headers.insert(self.key("dataschema"), Value::Uri(schema.clone()));
        }
        if let Some(subject) = &event.subject {
            headers.insert(self.key("subject"), Value::from(subject.as_str()));
        }

        for (name, value) in &event.extensions {
            headers.insert(self.key(name), value.clone());
        }

        Ok(Message {
            headers,
            payload: Value::Bytes(event.data.clone()),
        })
    }

    fn name(&self) -> &'static str {
        "binary"
    }
}
