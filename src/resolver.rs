//! Single-valued event attribute resolution from message headers.
//!
//! Each attribute has an optional key pattern and an optional default. At most
//! one header may match the pattern; its value goes through the attribute's
//! converter. Without a match the default applies, and a mandatory attribute
//! with neither fails.

use crate::config::{AttributeConfig, AttributesConfig, ConfigError};
use crate::matcher::{KeyPattern, NEGATION_PREFIX};
use crate::message::{Headers, Uri, Value};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::trace;

/// The seven resolvable event attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Id,
    Source,
    Type,
    Time,
    DataContentType,
    DataSchema,
    Subject,
}

impl Attribute {
    /// CloudEvents attribute name.
    pub fn name(self) -> &'static str {
        match self {
            Attribute::Id => "id",
            Attribute::Source => "source",
            Attribute::Type => "type",
            Attribute::Time => "time",
            Attribute::DataContentType => "datacontenttype",
            Attribute::DataSchema => "dataschema",
            Attribute::Subject => "subject",
        }
    }

    /// Whether a transform fails when the attribute cannot be resolved.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Attribute::Id | Attribute::Source | Attribute::Type)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Converts a matched header value into an attribute value.
pub type Converter<T> = fn(Attribute, &Value) -> Result<T, ResolveError>;

/// Pattern and default for one attribute, with the default already converted.
#[derive(Debug, Clone)]
pub struct AttributeRule<T> {
    attribute: Attribute,
    pattern: Option<KeyPattern>,
    default: Option<T>,
}

impl<T: Clone> AttributeRule<T> {
    /// Compile a rule, converting the configured default with `converter`.
    pub fn compile(
        attribute: Attribute,
        config: &AttributeConfig,
        converter: Converter<T>,
    ) -> Result<Self, ConfigError> {
        let pattern = match config.pattern.as_deref() {
            Some(p) if p.starts_with(NEGATION_PREFIX) => {
                return Err(ConfigError::NegatedAttributePattern {
                    attribute,
                    pattern: p.to_string(),
                });
            }
            Some(p) => Some(KeyPattern::compile(p).map_err(|source| {
                ConfigError::InvalidPattern {
                    context: format!("'{}' attribute", attribute),
                    source,
                }
            })?),
            None => None,
        };

        let default = config
            .default
            .as_deref()
            .map(|d| converter(attribute, &Value::from(d)))
            .transpose()
            .map_err(|source| ConfigError::InvalidDefault { attribute, source })?;

        if attribute.is_mandatory() && pattern.is_none() && default.is_none() {
            return Err(ConfigError::UnresolvableAttribute(attribute));
        }

        Ok(Self {
            attribute,
            pattern,
            default,
        })
    }

    /// The attribute this rule resolves.
    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    /// The key pattern, if any.
    pub fn pattern(&self) -> Option<&KeyPattern> {
        self.pattern.as_ref()
    }
}

/// Resolve one attribute from the headers.
///
/// Returns `Ok(None)` only for an optional attribute with no match and no
/// default.
pub fn resolve<T: Clone>(
    headers: &Headers,
    rule: &AttributeRule<T>,
    converter: Converter<T>,
) -> Result<Option<T>, ResolveError> {
    let mut matched: Vec<(&String, &Value)> = match &rule.pattern {
        Some(pattern) => headers.iter().filter(|(k, _)| pattern.matches(k)).collect(),
        None => Vec::new(),
    };

    if matched.len() > 1 {
        return Err(ResolveError::Ambiguous {
            attribute: rule.attribute,
            pattern: rule.pattern.as_ref().map(ToString::to_string).unwrap_or_default(),
            keys: matched.into_iter().map(|(k, _)| k.clone()).collect(),
        });
    }

    if let Some((key, value)) = matched.pop() {
        trace!(attribute = %rule.attribute, header = %key, "Resolved attribute from header");
        return converter(rule.attribute, value).map(Some);
    }

    match &rule.default {
        Some(default) => Ok(Some(default.clone())),
        None if rule.attribute.is_mandatory() => Err(ResolveError::Missing {
            attribute: rule.attribute,
            pattern: rule.pattern.as_ref().map(ToString::to_string).unwrap_or_default(),
        }),
        None => Ok(None),
    }
}

/// Accepts text only.
pub fn to_text(attribute: Attribute, value: &Value) -> Result<String, ResolveError> {
    match value {
        Value::Text(s) => Ok(s.clone()),
        other => Err(ResolveError::type_mismatch(attribute, "a String", other.type_name())),
    }
}

/// Accepts a URI, or text that parses as a URI-reference.
pub fn to_uri(attribute: Attribute, value: &Value) -> Result<Uri, ResolveError> {
    match value {
        Value::Uri(uri) => Ok(uri.clone()),
        Value::Text(s) => Uri::parse(s).map_err(|e| {
            ResolveError::type_mismatch(attribute, "a String or URI", format!("string ({})", e))
        }),
        other => Err(ResolveError::type_mismatch(
            attribute,
            "a String or URI",
            other.type_name(),
        )),
    }
}

/// Accepts a timestamp, or RFC 3339 text.
pub fn to_timestamp(attribute: Attribute, value: &Value) -> Result<DateTime<Utc>, ResolveError> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                ResolveError::type_mismatch(
                    attribute,
                    "a timestamp or RFC 3339 String",
                    format!("string ({})", e),
                )
            }),
        other => Err(ResolveError::type_mismatch(
            attribute,
            "a timestamp or RFC 3339 String",
            other.type_name(),
        )),
    }
}

/// Attribute values resolved for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttributes {
    pub id: String,
    pub source: Uri,
    pub event_type: String,
    pub time: Option<DateTime<Utc>>,
    pub data_content_type: Option<String>,
    pub data_schema: Option<Uri>,
    pub subject: Option<String>,
}

/// Resolves all seven attributes from a header snapshot.
#[derive(Debug, Clone)]
pub struct AttributeResolver {
    id: AttributeRule<String>,
    source: AttributeRule<Uri>,
    event_type: AttributeRule<String>,
    time: AttributeRule<DateTime<Utc>>,
    data_content_type: AttributeRule<String>,
    data_schema: AttributeRule<Uri>,
    subject: AttributeRule<String>,
}

impl AttributeResolver {
    /// Compile every attribute rule from configuration.
    pub fn compile(config: &AttributesConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            id: AttributeRule::compile(Attribute::Id, &config.id, to_text)?,
            source: AttributeRule::compile(Attribute::Source, &config.source, to_uri)?,
            event_type: AttributeRule::compile(Attribute::Type, &config.event_type, to_text)?,
            time: AttributeRule::compile(Attribute::Time, &config.time, to_timestamp)?,
            data_content_type: AttributeRule::compile(
                Attribute::DataContentType,
                &config.datacontenttype,
                to_text,
            )?,
            data_schema: AttributeRule::compile(
                Attribute::DataSchema,
                &config.dataschema,
                to_uri,
            )?,
            subject: AttributeRule::compile(Attribute::Subject, &config.subject, to_text)?,
        })
    }

    /// Configured patterns, in attribute order.
    pub fn patterns(&self) -> Vec<(Attribute, &KeyPattern)> {
        [
            (Attribute::Id, self.id.pattern()),
            (Attribute::Source, self.source.pattern()),
            (Attribute::Type, self.event_type.pattern()),
            (Attribute::Time, self.time.pattern()),
            (Attribute::DataContentType, self.data_content_type.pattern()),
            (Attribute::DataSchema, self.data_schema.pattern()),
            (Attribute::Subject, self.subject.pattern()),
        ]
        .into_iter()
        .filter_map(|(attribute, pattern)| pattern.map(|p| (attribute, p)))
        .collect()
    }

    /// Resolve every attribute.
    pub fn resolve(&self, headers: &Headers) -> Result<ResolvedAttributes, ResolveError> {
        Ok(ResolvedAttributes {
            id: require(resolve(headers, &self.id, to_text)?, &self.id)?,
            source: require(resolve(headers, &self.source, to_uri)?, &self.source)?,
            event_type: require(resolve(headers, &self.event_type, to_text)?, &self.event_type)?,
            time: resolve(headers, &self.time, to_timestamp)?,
            data_content_type: resolve(headers, &self.data_content_type, to_text)?,
            data_schema: resolve(headers, &self.data_schema, to_uri)?,
            subject: resolve(headers, &self.subject, to_text)?,
        })
    }
}

fn require<T>(value: Option<T>, rule: &AttributeRule<T>) -> Result<T, ResolveError> {
    value.ok_or_else(|| ResolveError::Missing {
        attribute: rule.attribute,
        pattern: rule.pattern.as_ref().map(ToString::to_string).unwrap_or_default(),
    })
}

/// Per-message attribute resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("No header matches the '{pattern}' pattern for attribute '{attribute}' and no default is configured")]
    Missing { attribute: Attribute, pattern: String },

    #[error("Multiple headers match the '{pattern}' pattern for attribute '{attribute}': {keys:?}")]
    Ambiguous {
        attribute: Attribute,
        pattern: String,
        keys: Vec<String>,
    },

    #[error("CloudEvent attribute '{attribute}' must be {expected} but header contains: {found}")]
    TypeMismatch {
        attribute: Attribute,
        expected: &'static str,
        found: String,
    },
}

impl ResolveError {
    fn type_mismatch(attribute: Attribute, expected: &'static str, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            attribute,
            expected,
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn headers(entries: Vec<(&str, Value)>) -> Headers {
        entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn text_rule(attribute: Attribute, config: AttributeConfig) -> AttributeRule<String> {
        AttributeRule::compile(attribute, &config, to_text).unwrap()
    }

    #[test]
    fn test_single_match() {
        let rule = text_rule(Attribute::Id, AttributeConfig::pattern("test_i*"));
        let hs = headers(vec![("test_id", "abc".into()), ("other", "x".into())]);

        assert_eq!(resolve(&hs, &rule, to_text), Ok(Some("abc".to_string())));
    }

    #[test]
    fn test_ambiguous_match() {
        let rule = text_rule(Attribute::Id, AttributeConfig::pattern("id*"));
        let hs = headers(vec![("id1", "a".into()), ("id2", "b".into())]);

        let err = resolve(&hs, &rule, to_text).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Ambiguous {
                attribute: Attribute::Id,
                pattern: "id*".to_string(),
                keys: vec!["id1".to_string(), "id2".to_string()],
            }
        );
        assert!(err.to_string().contains("Multiple headers"));
    }

    #[test]
    fn test_default_fallback() {
        let rule = text_rule(
            Attribute::Type,
            AttributeConfig::pattern("test_t*").with_default("spring.message"),
        );
        let hs = headers(vec![("unrelated", "x".into())]);

        assert_eq!(
            resolve(&hs, &rule, to_text),
            Ok(Some("spring.message".to_string()))
        );
    }

    #[test]
    fn test_header_wins_over_default() {
        let rule = text_rule(
            Attribute::Type,
            AttributeConfig::pattern("test_t*").with_default("spring.message"),
        );
        let hs = headers(vec![("test_type", "demo".into())]);

        assert_eq!(resolve(&hs, &rule, to_text), Ok(Some("demo".to_string())));
    }

    #[test]
    fn test_missing_mandatory() {
        let rule = text_rule(Attribute::Id, AttributeConfig::pattern("missing_id*"));
        let err = resolve(&Headers::new(), &rule, to_text).unwrap_err();

        assert!(matches!(err, ResolveError::Missing { attribute: Attribute::Id, .. }));
        assert!(err.to_string().contains("missing_id"));
    }

    #[test]
    fn test_missing_optional() {
        let rule = text_rule(Attribute::Subject, AttributeConfig::pattern("subject"));
        assert_eq!(resolve(&Headers::new(), &rule, to_text), Ok(None));

        let rule = text_rule(Attribute::Subject, AttributeConfig::default());
        assert_eq!(resolve(&Headers::new(), &rule, to_text), Ok(None));
    }

    #[test]
    fn test_text_type_mismatch() {
        let rule = text_rule(Attribute::Id, AttributeConfig::pattern("id_*"));
        let hs = headers(vec![("id_test", Value::Integer(1234))]);

        let err = resolve(&hs, &rule, to_text).unwrap_err();
        assert_eq!(
            err,
            ResolveError::TypeMismatch {
                attribute: Attribute::Id,
                expected: "a String",
                found: "integer".to_string(),
            }
        );
        assert!(err.to_string().contains("must be a String but header contains: integer"));
    }

    #[test]
    fn test_uri_conversion() {
        let uri = Uri::parse("urn:test").unwrap();
        assert_eq!(to_uri(Attribute::Source, &Value::from("urn:test")), Ok(uri.clone()));
        assert_eq!(to_uri(Attribute::Source, &Value::Uri(uri.clone())), Ok(uri));

        let err = to_uri(Attribute::Source, &Value::Boolean(true)).unwrap_err();
        assert!(err.to_string().contains("must be a String or URI"));
        assert!(err.to_string().contains("boolean"));

        assert!(to_uri(Attribute::Source, &Value::from("not a uri")).is_err());
    }

    #[test]
    fn test_timestamp_conversion() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            to_timestamp(Attribute::Time, &Value::from("2024-01-02T05:04:05+02:00")),
            Ok(expected)
        );
        assert_eq!(to_timestamp(Attribute::Time, &Value::Timestamp(expected)), Ok(expected));
        assert!(to_timestamp(Attribute::Time, &Value::from("yesterday")).is_err());
        assert!(to_timestamp(Attribute::Time, &Value::Integer(0)).is_err());
    }

    #[test]
    fn test_compile_rejects_negated_pattern() {
        let err = AttributeRule::compile(
            Attribute::Id,
            &AttributeConfig::pattern("!id"),
            to_text,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NegatedAttributePattern { .. }));
    }

    #[test]
    fn test_compile_rejects_unresolvable_mandatory() {
        let err = AttributeRule::compile(Attribute::Source, &AttributeConfig::default(), to_uri)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvableAttribute(Attribute::Source)));
    }

    #[test]
    fn test_compile_rejects_invalid_default() {
        let err = AttributeRule::compile(
            Attribute::Source,
            &AttributeConfig::fixed("not a uri"),
            to_uri,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDefault { .. }));
    }

    #[test]
    fn test_resolver_all_attributes() {
        let config = AttributesConfig {
            id: AttributeConfig::pattern("test_i*"),
            source: AttributeConfig::pattern("test_s*"),
            event_type: AttributeConfig::pattern("test_t*"),
            time: AttributeConfig::pattern("ce_time"),
            datacontenttype: AttributeConfig::pattern("contentType"),
            dataschema: AttributeConfig::fixed("https://example.com/schema"),
            subject: AttributeConfig::pattern("subject"),
        };
        let resolver = AttributeResolver::compile(&config).unwrap();
        assert_eq!(resolver.patterns().len(), 6);

        let hs = headers(vec![
            ("test_id", "abc".into()),
            ("test_source", "urn:test".into()),
            ("test_type", "demo".into()),
            ("ce_time", "2024-01-02T03:04:05Z".into()),
            ("contentType", "text/plain".into()),
        ]);
        let resolved = resolver.resolve(&hs).unwrap();

        assert_eq!(resolved.id, "abc");
        assert_eq!(resolved.source.as_str(), "urn:test");
        assert_eq!(resolved.event_type, "demo");
        assert_eq!(
            resolved.time,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(resolved.data_content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            resolved.data_schema.as_ref().map(Uri::as_str),
            Some("https://example.com/schema")
        );
        assert_eq!(resolved.subject, None);
    }
}
