//! The CloudEvent envelope and its builder.

use crate::message::{Uri, Value};
use crate::resolver::ResolvedAttributes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// CloudEvents specification version produced by this crate.
pub const SPEC_VERSION: &str = "1.0";

/// Names that may never be used as extension names.
///
/// The seven context attributes, plus the members every structured format
/// writes at the top level.
pub const RESERVED_NAMES: [&str; 10] = [
    "id",
    "source",
    "type",
    "time",
    "datacontenttype",
    "dataschema",
    "subject",
    "specversion",
    "data",
    "data_base64",
];

/// A CloudEvents 1.0 event.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudEvent {
    /// Event identifier
    pub id: String,
    /// Event source
    pub source: Uri,
    /// Event type
    pub event_type: String,
    /// Time of the occurrence
    pub time: Option<DateTime<Utc>>,
    /// Content type of `data`
    pub data_content_type: Option<String>,
    /// Schema `data` adheres to
    pub data_schema: Option<Uri>,
    /// Subject of the event in the context of the source
    pub subject: Option<String>,
    /// Event payload
    pub data: Vec<u8>,
    /// Extension attributes, with the header values they came from
    pub extensions: BTreeMap<String, Value>,
}

impl CloudEvent {
    /// The specification version.
    pub fn spec_version(&self) -> &'static str {
        SPEC_VERSION
    }

    /// Get an extension value.
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions.get(name)
    }

    /// Whether the data content type describes JSON.
    pub fn is_json_data(&self) -> bool {
        self.data_content_type.as_deref().is_some_and(is_json_media_type)
    }

    /// Whether the data content type describes text.
    pub fn is_text_data(&self) -> bool {
        self.data_content_type.as_deref().is_some_and(|ct| {
            let essence = media_essence(ct);
            essence.starts_with("text/") || is_json_media_type(&essence) || essence.ends_with("xml")
        })
    }
}

/// Media type without parameters, lowercased.
pub(crate) fn media_essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json_media_type(content_type: &str) -> bool {
    let essence = media_essence(content_type);
    essence == "application/json" || essence == "text/json" || essence.ends_with("+json")
}

/// Assembles a [`CloudEvent`] from resolved attributes, a payload and extensions.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    attributes: ResolvedAttributes,
    data: Vec<u8>,
    extensions: BTreeMap<String, Value>,
}

impl EventBuilder {
    /// Start from resolved attributes, with empty data and no extensions.
    pub fn new(attributes: ResolvedAttributes) -> Self {
        Self {
            attributes,
            data: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// Set the data from a payload.
    ///
    /// Byte payloads pass through and text is UTF-8 encoded. Any other payload
    /// is rendered in its canonical text form and UTF-8 encoded; the original
    /// value cannot be recovered from the event.
    pub fn data(mut self, payload: &Value) -> Self {
        self.data = payload.clone().into_data();
        self
    }

    /// Attach extensions verbatim.
    pub fn extensions(mut self, extensions: BTreeMap<String, Value>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Build the event.
    pub fn build(self) -> CloudEvent {
        let ResolvedAttributes {
            id,
            source,
            event_type,
            time,
            data_content_type,
            data_schema,
            subject,
        } = self.attributes;

        CloudEvent {
            id,
            source,
            event_type,
            time,
            data_content_type,
            data_schema,
            subject,
            data: self.data,
            extensions: self.extensions,
        }
    }
}
