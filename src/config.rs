//! Configuration types for the CloudEvent transformer.

use crate::matcher::MatcherError;
use crate::resolver::{Attribute, ResolveError};
use serde::{Deserialize, Serialize};

/// Main configuration for the transformer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Configuration version
    pub version: String,
    /// Attribute resolution rules
    pub attributes: AttributesConfig,
    /// Ordered extension tokens (`name`, `prefix*`, `!excluded-*`, ...).
    /// Absent or empty disables extension mapping.
    pub extensions: Option<Vec<String>>,
    /// Encoding strategy
    pub encoding: EncodingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            attributes: AttributesConfig::default(),
            extensions: None,
            encoding: EncodingConfig {
                formats: vec![crate::format::JSON_MEDIA_TYPE.to_string()],
                default_format: None,
                converter: None,
            },
        }
    }
}

/// Resolution rules for the seven event attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesConfig {
    /// Event id (mandatory)
    pub id: AttributeConfig,
    /// Event source (mandatory)
    pub source: AttributeConfig,
    /// Event type (mandatory)
    #[serde(rename = "type")]
    pub event_type: AttributeConfig,
    /// Event time
    pub time: AttributeConfig,
    /// Content type of the data
    pub datacontenttype: AttributeConfig,
    /// Schema the data adheres to
    pub dataschema: AttributeConfig,
    /// Subject of the event
    pub subject: AttributeConfig,
}

impl Default for AttributesConfig {
    fn default() -> Self {
        Self {
            id: AttributeConfig::pattern("id"),
            source: AttributeConfig::pattern("source"),
            event_type: AttributeConfig::pattern("type").with_default("spring.message"),
            time: AttributeConfig::default(),
            datacontenttype: AttributeConfig::pattern("contentType"),
            dataschema: AttributeConfig::default(),
            subject: AttributeConfig::default(),
        }
    }
}

impl AttributesConfig {
    /// Get the rule for an attribute mutably.
    pub fn get_mut(&mut self, attribute: Attribute) -> &mut AttributeConfig {
        match attribute {
            Attribute::Id => &mut self.id,
            Attribute::Source => &mut self.source,
            Attribute::Type => &mut self.event_type,
            Attribute::Time => &mut self.time,
            Attribute::DataContentType => &mut self.datacontenttype,
            Attribute::DataSchema => &mut self.dataschema,
            Attribute::Subject => &mut self.subject,
        }
    }
}

/// Resolution rule for one attribute.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AttributeConfig {
    /// Header key pattern (not negatable)
    pub pattern: Option<String>,
    /// Value used when no header matches
    pub default: Option<String>,
}

impl AttributeConfig {
    /// Rule with a pattern and no default.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            default: None,
        }
    }

    /// Rule with a default and no pattern.
    pub fn fixed(default: impl Into<String>) -> Self {
        Self {
            pattern: None,
            default: Some(default.into()),
        }
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Encoding strategy configuration.
///
/// Exactly one of `formats` and `converter` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncodingConfig {
    /// Media types of the built-in formats to register
    pub formats: Vec<String>,
    /// Media type used when the caller does not request one
    pub default_format: Option<String>,
    /// Generic message converter
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub converter: Option<ConverterConfig>,
}

/// Built-in message converters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConverterConfig {
    /// CloudEvents binary content mode: attributes become prefixed headers
    Binary {
        #[serde(default = "default_binary_prefix")]
        prefix: String,
    },
}

fn default_binary_prefix() -> String {
    crate::format::binary::DEFAULT_HEADER_PREFIX.to_string()
}

/// Errors raised while building a transformer.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {context} pattern: {source}")]
    InvalidPattern {
        context: String,
        #[source]
        source: MatcherError,
    },

    #[error("Pattern '{pattern}' for attribute '{attribute}' cannot be negated")]
    NegatedAttributePattern {
        attribute: Attribute,
        pattern: String,
    },

    #[error("Mandatory attribute '{0}' needs a pattern or a default")]
    UnresolvableAttribute(Attribute),

    #[error("Invalid default for attribute '{attribute}': {source}")]
    InvalidDefault {
        attribute: Attribute,
        #[source]
        source: ResolveError,
    },

    #[error("Extension token '{token}' would promote reserved attribute name '{name}'")]
    ReservedExtension { name: &'static str, token: String },

    #[error(
        "Pattern '{pattern}' for attribute '{attribute}' overlaps extension token '{token}'"
    )]
    OverlappingPatterns {
        attribute: Attribute,
        pattern: String,
        token: String,
    },

    #[error("Exactly one encoding strategy must be configured: {0}")]
    EncodingStrategy(&'static str),

    #[error("Unknown event format '{0}'")]
    UnknownFormat(String),

    #[error("Event format '{0}' is registered more than once")]
    DuplicateFormat(String),

    #[error("Default format '{0}' is not registered")]
    UnknownDefaultFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.version, "1");
        assert!(config.extensions.is_none());
        assert_eq!(config.attributes.id, AttributeConfig::pattern("id"));
        assert_eq!(
            config.attributes.datacontenttype,
            AttributeConfig::pattern("contentType")
        );
        assert_eq!(
            config.attributes.event_type.default.as_deref(),
            Some("spring.message")
        );
        assert_eq!(
            config.encoding.formats,
            vec!["application/cloudevents+json".to_string()]
        );
        assert!(config.encoding.converter.is_none());
    }

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
version: "1"
attributes:
  id:
    pattern: "test_i*"
  source:
    pattern: "test_s*"
    default: "urn:default"
  type:
    pattern: "test_t*"
  subject:
    default: "orders"
extensions: ["trace-id", "!secret-*"]
encoding:
  formats:
    - "application/cloudevents+json"
    - "application/cloudevents+xml"
  default_format: "application/cloudevents+xml"
"#;
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.attributes.id, AttributeConfig::pattern("test_i*"));
        assert_eq!(
            config.attributes.source,
            AttributeConfig::pattern("test_s*").with_default("urn:default")
        );
        assert_eq!(config.attributes.subject, AttributeConfig::fixed("orders"));
        assert_eq!(config.attributes.time, AttributeConfig::default());
        assert_eq!(config.extensions.as_ref().unwrap().len(), 2);
        assert_eq!(config.encoding.formats.len(), 2);
        assert_eq!(
            config.encoding.default_format.as_deref(),
            Some("application/cloudevents+xml")
        );
    }

    #[test]
    fn test_converter_parsing() {
        let json = r#"{
            "encoding": {"converter": {"binary": {}}}
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert!(config.encoding.formats.is_empty());
        assert_eq!(
            config.encoding.converter,
            Some(ConverterConfig::Binary {
                prefix: "ce-".to_string()
            })
        );
    }

    #[test]
    fn test_attributes_get_mut() {
        let mut attributes = AttributesConfig::default();
        attributes.get_mut(Attribute::Subject).default = Some("s".to_string());
        *attributes.get_mut(Attribute::Time) = AttributeConfig::pattern("ce_time");
        assert_eq!(attributes.subject, AttributeConfig::fixed("s"));
        assert_eq!(attributes.time, AttributeConfig::pattern("ce_time"));
        assert_eq!(attributes.event_type.pattern.as_deref(), Some("type"));
    }
}
