//! Message to CloudEvent transformer.

use crate::config::{AttributeConfig, AttributesConfig, ConfigError, ConverterConfig, PipelineConfig};
use crate::event::{CloudEvent, EventBuilder, RESERVED_NAMES};
use crate::format::{
    self, BinaryModeConverter, EncodingStrategy, EventFormat, FormatError, FormatRegistry,
    MessageConverter,
};
use crate::matcher::{Classification, HeaderClassifier};
use crate::message::{Message, Value};
use crate::resolver::{Attribute, AttributeResolver, ResolveError};
use std::fmt;
use tracing::{debug, info, warn};

/// Turns messages into CloudEvents.
///
/// Holds only compiled, immutable configuration: one instance can be shared
/// across threads and every call to [`transform`](Self::transform) is
/// independent of the others.
#[derive(Debug)]
pub struct ToCloudEventTransformer {
    resolver: AttributeResolver,
    classifier: HeaderClassifier,
    strategy: EncodingStrategy,
}

impl ToCloudEventTransformer {
    /// Create a transformer from configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let mut builder = Self::builder()
            .attributes(config.attributes)
            .extensions(config.extensions.unwrap_or_default());

        for media_type in &config.encoding.formats {
            let format = format::builtin(media_type)
                .ok_or_else(|| ConfigError::UnknownFormat(media_type.clone()))?;
            builder = builder.format(format);
        }

        if let Some(default_format) = config.encoding.default_format {
            builder = builder.default_format(default_format);
        }

        if let Some(converter) = config.encoding.converter {
            builder = match converter {
                ConverterConfig::Binary { prefix } => {
                    builder.converter(Box::new(BinaryModeConverter::new(prefix)))
                }
            };
        }

        builder.build()
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        Self::new(config)
    }

    /// Create from a JSON configuration string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        Self::new(config)
    }

    /// Start building a transformer programmatically.
    pub fn builder() -> TransformerBuilder {
        TransformerBuilder::default()
    }

    /// Transform a message using the default format (or the converter).
    pub fn transform(&self, message: &Message) -> Result<Message, TransformError> {
        self.run(message, None)
    }

    /// Transform a message into the format registered for `media_type`.
    pub fn transform_as(&self, message: &Message, media_type: &str) -> Result<Message, TransformError> {
        self.run(message, Some(media_type))
    }

    /// Build the event for a message without encoding it.
    pub fn to_event(&self, message: &Message) -> Result<CloudEvent, TransformError> {
        let classified = self.classifier.classify_headers(&message.headers);
        let attributes = self.resolver.resolve(&message.headers)?;

        Ok(EventBuilder::new(attributes)
            .data(&message.payload)
            .extensions(classified.extensions)
            .build())
    }

    /// The attribute resolver.
    pub fn resolver(&self) -> &AttributeResolver {
        &self.resolver
    }

    /// The header classifier.
    pub fn classifier(&self) -> &HeaderClassifier {
        &self.classifier
    }

    /// The encoding strategy.
    pub fn strategy(&self) -> &EncodingStrategy {
        &self.strategy
    }

    fn run(&self, message: &Message, media_type: Option<&str>) -> Result<Message, TransformError> {
        self.encode(message, media_type).map_err(|failure| {
            warn!(error = %failure, kind = ?failure.kind(), "Transform failed");
            TransformError::from(failure)
        })
    }

    fn encode(&self, message: &Message, media_type: Option<&str>) -> Result<Message, TransformFailure> {
        let headers = &message.headers;
        let classified = self.classifier.classify_headers(headers);
        let attributes = self.resolver.resolve(headers)?;
        let passthrough = classified.filter(headers);

        let extension_count = classified.extensions.len();
        let excluded_count = classified.excluded.len();

        let event = EventBuilder::new(attributes)
            .data(&message.payload)
            .extensions(classified.extensions)
            .build();

        match &self.strategy {
            EncodingStrategy::Formats(registry) => {
                let format = match media_type {
                    Some(media_type) => registry.select(media_type)?,
                    None => registry.default_format()?,
                };
                let payload = format.serialize(&event)?;

                debug!(
                    id = %event.id,
                    media_type = format.media_type(),
                    extensions = extension_count,
                    excluded = excluded_count,
                    bytes = payload.len(),
                    "Transformed message"
                );

                Ok(Message {
                    headers: passthrough,
                    payload: Value::Bytes(payload),
                })
            }
            EncodingStrategy::Converter(converter) => {
                if let Some(media_type) = media_type {
                    return Err(FormatError::Unsupported {
                        media_type: media_type.to_string(),
                        available: Vec::new(),
                    }
                    .into());
                }

                let output = converter.convert(&event, passthrough)?;

                debug!(
                    id = %event.id,
                    converter = converter.name(),
                    extensions = extension_count,
                    excluded = excluded_count,
                    "Transformed message"
                );

                Ok(output)
            }
        }
    }
}

/// Programmatic construction of a [`ToCloudEventTransformer`].
///
/// All validation happens in [`build`](Self::build).
#[derive(Default)]
pub struct TransformerBuilder {
    attributes: AttributesConfig,
    extensions: Vec<String>,
    formats: Vec<Box<dyn EventFormat>>,
    default_format: Option<String>,
    converter: Option<Box<dyn MessageConverter>>,
}

impl TransformerBuilder {
    /// Set every attribute rule.
    pub fn attributes(mut self, attributes: AttributesConfig) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the rule for one attribute.
    pub fn attribute(mut self, attribute: Attribute, rule: AttributeConfig) -> Self {
        *self.attributes.get_mut(attribute) = rule;
        self
    }

    /// Set the ordered extension tokens.
    pub fn extensions<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Register an event format.
    pub fn format(mut self, format: Box<dyn EventFormat>) -> Self {
        self.formats.push(format);
        self
    }

    /// Choose the format used by [`ToCloudEventTransformer::transform`].
    pub fn default_format(mut self, media_type: impl Into<String>) -> Self {
        self.default_format = Some(media_type.into());
        self
    }

    /// Use a message converter instead of formats.
    pub fn converter(mut self, converter: Box<dyn MessageConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Validate the configuration and build the transformer.
    pub fn build(self) -> Result<ToCloudEventTransformer, ConfigError> {
        let strategy = match (self.formats.is_empty(), self.converter) {
            (false, Some(_)) => {
                return Err(ConfigError::EncodingStrategy(
                    "both formats and a converter are configured",
                ))
            }
            (true, None) => {
                return Err(ConfigError::EncodingStrategy(
                    "neither formats nor a converter are configured",
                ))
            }
            (true, Some(converter)) => {
                if let Some(default_format) = self.default_format {
                    return Err(ConfigError::UnknownDefaultFormat(default_format));
                }
                EncodingStrategy::Converter(converter)
            }
            (false, None) => {
                let mut registry = FormatRegistry::new();
                for format in self.formats {
                    registry.register(format)?;
                }
                if let Some(default_format) = &self.default_format {
                    registry.set_default(default_format)?;
                }
                EncodingStrategy::Formats(registry)
            }
        };

        let classifier =
            HeaderClassifier::compile(self.extensions.as_slice()).map_err(|source| ConfigError::InvalidPattern {
                context: "extension".to_string(),
                source,
            })?;
        let resolver = AttributeResolver::compile(&self.attributes)?;

        check_reserved_names(&classifier)?;
        check_overlaps(&resolver, &classifier)?;

        match &strategy {
            EncodingStrategy::Formats(registry) => info!(
                attribute_patterns = resolver.patterns().len(),
                extension_tokens = classifier.tokens().len(),
                formats = registry.len(),
                "CloudEvent transformer initialized"
            ),
            EncodingStrategy::Converter(converter) => info!(
                attribute_patterns = resolver.patterns().len(),
                extension_tokens = classifier.tokens().len(),
                converter = converter.name(),
                "CloudEvent transformer initialized"
            ),
        }

        Ok(ToCloudEventTransformer {
            resolver,
            classifier,
            strategy,
        })
    }
}

/// Reject tokens that would promote a reserved name to an extension.
fn check_reserved_names(classifier: &HeaderClassifier) -> Result<(), ConfigError> {
    for name in RESERVED_NAMES {
        if classifier.classify(name) != Classification::Extension {
            continue;
        }

        let token = classifier
            .tokens()
            .iter()
            .find(|t| t.pattern().matches(name))
            .map(ToString::to_string)
            .unwrap_or_default();

        return Err(ConfigError::ReservedExtension { name, token });
    }

    Ok(())
}

/// Reject attribute patterns that can match a key some token also matches.
fn check_overlaps(resolver: &AttributeResolver, classifier: &HeaderClassifier) -> Result<(), ConfigError> {
    for (attribute, pattern) in resolver.patterns() {
        if let Some(token) = classifier
            .tokens()
            .iter()
            .find(|t| pattern.overlaps(t.pattern()))
        {
            return Err(ConfigError::OverlappingPatterns {
                attribute,
                pattern: pattern.to_string(),
                token: token.to_string(),
            });
        }
    }

    Ok(())
}

/// Coarse category of a transform failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A mandatory attribute has no header and no default
    MissingAttribute,
    /// Several headers match one attribute pattern
    AmbiguousAttribute,
    /// A header value cannot become the attribute
    TypeMismatch,
    /// No format for the requested media type
    UnsupportedFormat,
    /// The format or converter failed
    Encoding,
}

/// Error returned by a failed transform. No output is produced.
///
/// [`source`](std::error::Error::source) is the originating [`ResolveError`]
/// or [`FormatError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformError {
    cause: TransformFailure,
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to transform message")
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            TransformFailure::Resolve(error) => Some(error),
            TransformFailure::Format(error) => Some(error),
        }
    }
}

impl TransformError {
    /// The category of the failure.
    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    /// The underlying failure.
    pub fn cause(&self) -> &TransformFailure {
        &self.cause
    }

    /// Consume the error, returning the underlying failure.
    pub fn into_cause(self) -> TransformFailure {
        self.cause
    }
}

/// Underlying cause of a [`TransformError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformFailure {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

impl TransformFailure {
    /// The category of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolve(ResolveError::Missing { .. }) => ErrorKind::MissingAttribute,
            Self::Resolve(ResolveError::Ambiguous { .. }) => ErrorKind::AmbiguousAttribute,
            Self::Resolve(ResolveError::TypeMismatch { .. }) => ErrorKind::TypeMismatch,
            Self::Format(FormatError::Unsupported { .. }) => ErrorKind::UnsupportedFormat,
            Self::Format(FormatError::Encoding { .. }) => ErrorKind::Encoding,
        }
    }
}

impl From<TransformFailure> for TransformError {
    fn from(cause: TransformFailure) -> Self {
        Self { cause }
    }
}

impl From<ResolveError> for TransformError {
    fn from(error: ResolveError) -> Self {
        TransformFailure::from(error).into()
    }
}

impl From<FormatError> for TransformError {
    fn from(error: FormatError) -> Self {
        TransformFailure::from(error).into()
    }
}
