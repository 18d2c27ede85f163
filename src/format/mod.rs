//! Event formats and message converters.
//!
//! A transformer encodes events in one of two ways:
//!
//! - through an [`EventFormat`] picked from a [`FormatRegistry`] by media type;
//!   the format produces the output payload bytes
//! - through a [`MessageConverter`], which owns the whole output message
//!   (headers and payload)

pub mod avro;
pub mod binary;
pub mod json;
pub mod xml;

pub use avro::AvroCompactFormat;
pub use binary::BinaryModeConverter;
pub use json::JsonFormat;
pub use xml::XmlFormat;

use crate::config::ConfigError;
use crate::event::{media_essence, CloudEvent};
use crate::message::{Headers, Message};

/// Media type of the structured JSON format.
pub const JSON_MEDIA_TYPE: &str = "application/cloudevents+json";
/// Media type of the structured XML format.
pub const XML_MEDIA_TYPE: &str = "application/cloudevents+xml";
/// Media type of the Avro compact format.
pub const AVRO_COMPACT_MEDIA_TYPE: &str = "application/cloudevents+avrocompact";

/// Serializes events into payload bytes.
pub trait EventFormat: Send + Sync {
    /// Media type of the serialized form.
    fn media_type(&self) -> &str;

    /// Serialize an event.
    fn serialize(&self, event: &CloudEvent) -> Result<Vec<u8>, FormatError>;

    /// Get the format name for debugging.
    fn name(&self) -> &'static str;
}

/// Converts an event and the pass-through headers into an output message.
pub trait MessageConverter: Send + Sync {
    /// Build the output message.
    fn convert(&self, event: &CloudEvent, headers: Headers) -> Result<Message, FormatError>;

    /// Get the converter name for debugging.
    fn name(&self) -> &'static str;
}

/// Look up a built-in format by media type.
pub fn builtin(media_type: &str) -> Option<Box<dyn EventFormat>> {
    let candidates: [Box<dyn EventFormat>; 3] = [
        Box::new(JsonFormat::new()),
        Box::new(XmlFormat::new()),
        Box::new(AvroCompactFormat::new()),
    ];

    candidates
        .into_iter()
        .find(|format| media_type_matches(format.media_type(), media_type))
}

/// Whether a requested media type selects a declared one.
///
/// Both are compared without parameters and case-insensitively. A plain
/// structured suffix type also selects its CloudEvents type, so
/// `application/json` selects `application/cloudevents+json`.
pub fn media_type_matches(declared: &str, requested: &str) -> bool {
    let declared = media_essence(declared);
    let requested = media_essence(requested);

    if declared == requested {
        return true;
    }

    match (declared.split_once('/'), requested.split_once('/')) {
        (Some((d_type, d_subtype)), Some((r_type, r_subtype))) => {
            d_type == r_type
                && d_subtype
                    .split_once('+')
                    .is_some_and(|(_, suffix)| suffix == r_subtype)
        }
        _ => false,
    }
}

/// Registry of event formats, keyed by media type.
///
/// Formats are kept in registration order; the first one registered is the
/// default unless another is chosen.
#[derive(Default)]
pub struct FormatRegistry {
    formats: Vec<Box<dyn EventFormat>>,
    default_index: usize,
}

impl FormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a format. Media types must be unique.
    pub fn register(&mut self, format: Box<dyn EventFormat>) -> Result<(), ConfigError> {
        let media_type = media_essence(format.media_type());
        if self
            .formats
            .iter()
            .any(|f| media_essence(f.media_type()) == media_type)
        {
            return Err(ConfigError::DuplicateFormat(format.media_type().to_string()));
        }

        self.formats.push(format);
        Ok(())
    }

    /// Choose the format used when no media type is requested.
    pub fn set_default(&mut self, media_type: &str) -> Result<(), ConfigError> {
        self.default_index = self
            .position(media_type)
            .ok_or_else(|| ConfigError::UnknownDefaultFormat(media_type.to_string()))?;
        Ok(())
    }

    /// Select the format for a requested media type.
    ///
    /// An exact media type match wins over a suffix alias match.
    pub fn select(&self, media_type: &str) -> Result<&dyn EventFormat, FormatError> {
        self.position(media_type)
            .map(|i| self.formats[i].as_ref())
            .ok_or_else(|| FormatError::Unsupported {
                media_type: media_type.to_string(),
                available: self.media_types().iter().map(|m| m.to_string()).collect(),
            })
    }

    /// The default format.
    pub fn default_format(&self) -> Result<&dyn EventFormat, FormatError> {
        self.formats
            .get(self.default_index)
            .map(|f| f.as_ref())
            .ok_or_else(|| FormatError::Unsupported {
                media_type: "(default)".to_string(),
                available: Vec::new(),
            })
    }

    /// Registered media types in registration order.
    pub fn media_types(&self) -> Vec<&str> {
        self.formats.iter().map(|f| f.media_type()).collect()
    }

    /// Number of registered formats.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Whether no format is registered.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    fn position(&self, media_type: &str) -> Option<usize> {
        let requested = media_essence(media_type);
        self.formats
            .iter()
            .position(|f| media_essence(f.media_type()) == requested)
            .or_else(|| {
                self.formats
                    .iter()
                    .position(|f| media_type_matches(f.media_type(), media_type))
            })
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("media_types", &self.media_types())
            .field("default_index", &self.default_index)
            .finish()
    }
}

/// How a transformer produces its output.
pub enum EncodingStrategy {
    /// Serialize with a registered format
    Formats(FormatRegistry),
    /// Hand the event to a converter
    Converter(Box<dyn MessageConverter>),
}

impl std::fmt::Debug for EncodingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Formats(registry) => f.debug_tuple("Formats").field(registry).finish(),
            Self::Converter(converter) => f.debug_tuple("Converter").field(&converter.name()).finish(),
        }
    }
}

/// Per-message encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("No event format registered for media type '{media_type}' (available: {available:?})")]
    Unsupported {
        media_type: String,
        available: Vec<String>,
    },

    #[error("{format} encoding failed: {message}")]
    Encoding {
        format: &'static str,
        message: String,
    },
}

impl FormatError {
    pub(crate) fn encoding(format: &'static str, message: impl Into<String>) -> Self {
        Self::Encoding {
            format,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_matches() {
        assert!(media_type_matches(JSON_MEDIA_TYPE, JSON_MEDIA_TYPE));
        assert!(media_type_matches(
            JSON_MEDIA_TYPE,
            "Application/CloudEvents+JSON; charset=UTF-8"
        ));
        assert!(media_type_matches(JSON_MEDIA_TYPE, "application/json"));
        assert!(media_type_matches(XML_MEDIA_TYPE, "application/xml"));
        assert!(!media_type_matches(JSON_MEDIA_TYPE, "application/xml"));
        assert!(!media_type_matches(JSON_MEDIA_TYPE, "text/json"));
        assert!(!media_type_matches(JSON_MEDIA_TYPE, "json"));
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("application/json").unwrap().name(), "json");
        assert_eq!(builtin(XML_MEDIA_TYPE).unwrap().name(), "xml");
        assert_eq!(builtin(AVRO_COMPACT_MEDIA_TYPE).unwrap().name(), "avro_compact");
        assert!(builtin("application/protobuf").is_none());
    }

    #[test]
    fn test_registry_select() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(JsonFormat::new())).unwrap();
        registry.register(Box::new(XmlFormat::new())).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.select("application/json").unwrap().name(), "json");
        assert_eq!(registry.select("application/xml").unwrap().name(), "xml");
        assert_eq!(registry.default_format().unwrap().name(), "json");

        let err = registry.select("application/cloudevents+avrocompact").err().unwrap();
        assert!(matches!(err, FormatError::Unsupported { .. }));
    }

    #[test]
    fn test_registry_default() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(JsonFormat::new())).unwrap();
        registry.register(Box::new(XmlFormat::new())).unwrap();

        registry.set_default("application/xml").unwrap();
        assert_eq!(registry.default_format().unwrap().name(), "xml");

        assert!(matches!(
            registry.set_default("text/plain"),
            Err(ConfigError::UnknownDefaultFormat(_))
        ));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = FormatRegistry::new();
        registry.register(Box::new(JsonFormat::new())).unwrap();

        assert!(matches!(
            registry.register(Box::new(JsonFormat::new())),
            Err(ConfigError::DuplicateFormat(_))
        ));
    }

    #[test]
    fn test_empty_registry() {
        let registry = FormatRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.default_format().is_err());
    }
}
