//! CloudEvents JSON format.

use super::{EventFormat, FormatError, JSON_MEDIA_TYPE};
use crate::event::CloudEvent;
use crate::message::Value;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::SecondsFormat;
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Structured JSON event format.
#[derive(Debug, Clone, Default)]
pub struct JsonFormat;

impl JsonFormat {
    /// Create a new JSON format.
    pub fn new() -> Self {
        Self
    }
}

impl EventFormat for JsonFormat {
    fn media_type(&self) -> &str {
        JSON_MEDIA_TYPE
    }

    fn serialize(&self, event: &CloudEvent) -> Result<Vec<u8>, FormatError> {
        serde_json::to_vec(&JsonEvent(event))
            .map_err(|e| FormatError::encoding(self.name(), e.to_string()))
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Serializes an event with its members in a fixed order.
struct JsonEvent<'a>(&'a CloudEvent);

impl Serialize for JsonEvent<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let event = self.0;
        let mut map = serializer.serialize_map(None)?;

        map.serialize_entry("specversion", event.spec_version())?;
        map.serialize_entry("id", &event.id)?;
        map.serialize_entry("source", event.source.as_str())?;
        map.serialize_entry("type", &event.event_type)?;

        if let Some(time) = &event.time {
            map.serialize_entry("time", &time.to_rfc3339_opts(SecondsFormat::AutoSi, true))?;
        }
        if let Some(content_type) = &event.data_content_type {
            map.serialize_entry("datacontenttype", content_type)?;
        }
        if let Some(schema) = &event.data_schema {
            map.serialize_entry("dataschema", schema.as_str())?;
        }
        if let Some(subject) = &event.subject {
            map.serialize_entry("subject", subject)?;
        }

        for (name, value) in &event.extensions {
            let value = extension_value(value).map_err(|reason| {
                S::Error::custom(format!("extension '{}': {}", name, reason))
            })?;
            map.serialize_entry(name, &value)?;
        }

        match data_member(event) {
            Some(DataMember::Json(json)) => map.serialize_entry("data", &json)?,
            Some(DataMember::Text(text)) => map.serialize_entry("data", text)?,
            Some(DataMember::Base64(encoded)) => map.serialize_entry("data_base64", &encoded)?,
            None => {}
        }

        map.end()
    }
}

enum DataMember<'a> {
    Json(JsonValue),
    Text(&'a str),
    Base64(String),
}

fn data_member(event: &CloudEvent) -> Option<DataMember<'_>> {
    if event.data.is_empty() {
        return None;
    }

    if event.is_json_data() {
        if let Ok(json) = serde_json::from_slice::<JsonValue>(&event.data) {
            return Some(DataMember::Json(json));
        }
    }

    Some(match std::str::from_utf8(&event.data) {
        Ok(text) => DataMember::Text(text),
        Err(_) => DataMember::Base64(STANDARD.encode(&event.data)),
    })
}

/// JSON rendering of an extension value.
fn extension_value(value: &Value) -> Result<JsonValue, &'static str> {
    Ok(match value {
        Value::Integer(n) => JsonValue::from(*n),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .ok_or("non-finite number")?,
        other => JsonValue::String(other.to_string()),
    })
}
