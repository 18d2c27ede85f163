//! Message to CloudEvent transformation.
//!
//! Turns a message (a header map plus a payload) into a CloudEvents 1.0 event
//! and encodes it:
//!
//! - Attribute resolution from headers by wildcard key patterns, with defaults
//! - Ordered header classification into extensions, exclusions and pass-through
//! - Structured JSON, XML and Avro compact formats selected by media type
//! - Binary content mode through a message converter
//!
//! ## Configuration Example
//!
//! ```yaml
//! attributes:
//!   id:     { pattern: "test_i*" }
//!   source: { pattern: "test_s*", default: "urn:app" }
//!   type:   { pattern: "test_t*" }
//! extensions: ["trace-id", "!secret-*"]
//! encoding:
//!   formats: ["application/cloudevents+json"]
//! ```

pub mod config;
pub mod event;
pub mod format;
pub mod matcher;
pub mod message;
pub mod resolver;
pub mod transformer;

pub use config::{ConfigError, PipelineConfig};
pub use event::{CloudEvent, EventBuilder};
pub use format::{EncodingStrategy, EventFormat, FormatError, FormatRegistry, MessageConverter};
pub use matcher::{Classification, HeaderClassifier, KeyPattern};
pub use message::{Headers, Message, Uri, Value};
pub use resolver::{Attribute, AttributeResolver, ResolveError};
pub use transformer::{
    ErrorKind, ToCloudEventTransformer, TransformError, TransformFailure, TransformerBuilder,
};
