//! Message, header and value types consumed and produced by the transformer.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Regex for a URI scheme (RFC 3986, section 3.1).
static SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*$").unwrap());

/// Message headers, keyed by unique header name.
///
/// Ordered so that every consumer (classification, encoders, output) sees the
/// same iteration order for the same input.
pub type Headers = BTreeMap<String, Value>;

/// An inbound or outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Message headers
    pub headers: Headers,
    /// Message payload
    pub payload: Value,
}

impl Message {
    /// Create a message with the given payload and no headers.
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    /// Add a header, replacing any previous value for the key.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get a header value.
    pub fn header(&self, key: &str) -> Option<&Value> {
        self.headers.get(key)
    }

    /// Build a message from its JSON form: `{"headers": {...}, "payload": ...}`.
    ///
    /// Header values map by JSON type (string, integer, float, boolean, anything
    /// else stays JSON). A payload string becomes text, `{"base64": "..."}`
    /// becomes bytes, anything else stays JSON.
    pub fn from_json(json: JsonValue) -> Result<Self, MessageError> {
        let JsonValue::Object(mut map) = json else {
            return Err(MessageError::NotAnObject);
        };

        let headers = match map.remove("headers") {
            Some(JsonValue::Object(headers)) => headers
                .into_iter()
                .map(|(k, v)| (k, Value::from_json_header(v)))
                .collect(),
            Some(JsonValue::Null) | None => Headers::new(),
            Some(_) => return Err(MessageError::InvalidHeaders),
        };

        let payload = match map.remove("payload") {
            Some(payload) => Value::from_json_payload(payload)?,
            None => Value::Bytes(Vec::new()),
        };

        Ok(Self { headers, payload })
    }

    /// Render the message in the JSON form accepted by [`Message::from_json`].
    ///
    /// Header values are rendered in their canonical text form; a byte payload
    /// is rendered as a string when it is valid UTF-8.
    pub fn to_json(&self) -> JsonValue {
        let headers: serde_json::Map<String, JsonValue> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();

        let payload = match &self.payload {
            Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => JsonValue::String(text.to_string()),
                Err(_) => serde_json::json!({ "base64": STANDARD.encode(bytes) }),
            },
            other => other.to_json(),
        };

        serde_json::json!({ "headers": headers, "payload": payload })
    }
}

/// A runtime-typed header value or payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Text
    Text(String),
    /// Validated URI-reference
    Uri(Uri),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Signed integer
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Boolean
    Boolean(bool),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Arbitrary structured value
    Json(JsonValue),
}

impl Value {
    /// Stable name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "string",
            Value::Uri(_) => "uri",
            Value::Bytes(_) => "bytes",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
        }
    }

    /// Convert into event data bytes.
    ///
    /// Bytes pass through and text is UTF-8 encoded. Every other variant is
    /// rendered in its canonical text form first; this is best effort and the
    /// original value cannot be recovered from the result.
    pub fn into_data(self) -> Vec<u8> {
        match self {
            Value::Bytes(bytes) => bytes,
            Value::Text(text) => text.into_bytes(),
            other => other.to_string().into_bytes(),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Value::Integer(n) => JsonValue::from(*n),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Json(json) => json.clone(),
            other => JsonValue::String(other.to_string()),
        }
    }

    fn from_json_header(json: JsonValue) -> Self {
        match json {
            JsonValue::String(s) => Value::Text(s),
            JsonValue::Bool(b) => Value::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .unwrap_or(Value::Json(JsonValue::Number(n))),
            },
            other => Value::Json(other),
        }
    }

    fn from_json_payload(json: JsonValue) -> Result<Self, MessageError> {
        match json {
            JsonValue::String(s) => Ok(Value::Text(s)),
            JsonValue::Object(map) if map.len() == 1 && map.contains_key("base64") => {
                let encoded = map
                    .get("base64")
                    .and_then(JsonValue::as_str)
                    .ok_or(MessageError::InvalidBase64Payload)?;
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|_| MessageError::InvalidBase64Payload)?;
                Ok(Value::Bytes(bytes))
            }
            other => Ok(Value::Json(other)),
        }
    }
}

/// Canonical text form of a value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Uri(uri) => f.write_str(uri.as_str()),
            Value::Bytes(bytes) => f.write_str(&STANDARD.encode(bytes)),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(json) => write!(f, "{}", json),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Uri> for Value {
    fn from(value: Uri) -> Self {
        Value::Uri(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Json(value)
    }
}

/// A URI-reference: either an absolute URI or a relative reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(String);

impl Uri {
    /// Parse and validate a URI-reference.
    pub fn parse(input: &str) -> Result<Self, UriError> {
        if input.is_empty() {
            return Err(UriError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || "<>\"{}|\\^`".contains(*c))
        {
            return Err(UriError::InvalidCharacter(c));
        }

        // A colon before the first '/', '?' or '#' delimits the scheme
        let head_end = input.find(['/', '?', '#']).unwrap_or(input.len());
        if let Some(colon) = input[..head_end].find(':') {
            let scheme = &input[..colon];
            if !SCHEME_REGEX.is_match(scheme) {
                return Err(UriError::InvalidScheme(scheme.to_string()));
            }
        }

        Ok(Self(input.to_string()))
    }

    /// The URI as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme, if this is an absolute URI.
    pub fn scheme(&self) -> Option<&str> {
        let head_end = self.0.find(['/', '?', '#']).unwrap_or(self.0.len());
        self.0[..head_end].find(':').map(|colon| &self.0[..colon])
    }

    /// Whether the URI carries a scheme.
    pub fn is_absolute(&self) -> bool {
        self.scheme().is_some()
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URI validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("URI is empty")]
    Empty,

    #[error("URI contains invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("URI has invalid scheme '{0}'")]
    InvalidScheme(String),
}

/// Errors reading a message from its JSON form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("Message must be a JSON object")]
    NotAnObject,

    #[error("Message headers must be a JSON object")]
    InvalidHeaders,

    #[error("Payload 'base64' member must be a valid base64 string")]
    InvalidBase64Payload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_uri_parse() {
        assert!(Uri::parse("urn:test").unwrap().is_absolute());
        assert!(Uri::parse("https://example.com/events?x=1").unwrap().is_absolute());
        assert!(!Uri::parse("test-source").unwrap().is_absolute());
        assert!(!Uri::parse("/spring/app.transformer").unwrap().is_absolute());
        assert_eq!(Uri::parse("urn:test").unwrap().scheme(), Some("urn"));
    }

    #[test]
    fn test_uri_rejects_invalid() {
        assert_eq!(Uri::parse(""), Err(UriError::Empty));
        assert_eq!(
            Uri::parse("has space"),
            Err(UriError::InvalidCharacter(' '))
        );
        assert_eq!(
            Uri::parse("1http:foo"),
            Err(UriError::InvalidScheme("1http".to_string()))
        );
    }

    #[test]
    fn test_into_data() {
        assert_eq!(Value::from(&b"hello"[..]).into_data(), b"hello".to_vec());
        assert_eq!(Value::from("héllo").into_data(), "héllo".as_bytes().to_vec());
        assert_eq!(Value::from(42i64).into_data(), b"42".to_vec());
        assert_eq!(
            Value::from(serde_json::json!({"a": 1})).into_data(),
            br#"{"a":1}"#.to_vec()
        );
    }

    #[test]
    fn test_canonical_text() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(Value::from(ts).to_string(), "2024-05-01T12:30:00Z");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(vec![0xffu8, 0x00]).to_string(), "/wA=");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::from(1i32).type_name(), "integer");
        assert_eq!(Value::from(Uri::parse("urn:x").unwrap()).type_name(), "uri");
    }

    #[test]
    fn test_message_from_json() {
        let json = serde_json::json!({
            "headers": {
                "test_id": "abc",
                "count": 3,
                "ratio": 0.5,
                "flag": true,
                "nested": {"a": 1}
            },
            "payload": {"base64": "aGVsbG8="}
        });
        let message = Message::from_json(json).unwrap();

        assert_eq!(message.header("test_id"), Some(&Value::from("abc")));
        assert_eq!(message.header("count"), Some(&Value::Integer(3)));
        assert_eq!(message.header("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(message.header("flag"), Some(&Value::Boolean(true)));
        assert_eq!(message.header("nested").unwrap().type_name(), "json");
        assert_eq!(message.payload, Value::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn test_message_from_json_errors() {
        assert_eq!(
            Message::from_json(serde_json::json!([])),
            Err(MessageError::NotAnObject)
        );
        assert_eq!(
            Message::from_json(serde_json::json!({"headers": []})),
            Err(MessageError::InvalidHeaders)
        );
        assert_eq!(
            Message::from_json(serde_json::json!({"payload": {"base64": "%%%"}})),
            Err(MessageError::InvalidBase64Payload)
        );
    }

    #[test]
    fn test_message_to_json() {
        let message = Message::new(b"hi".to_vec())
            .with_header("a", "x")
            .with_header("b", 7i64);
        let json = message.to_json();

        assert_eq!(json["headers"]["a"], "x");
        assert_eq!(json["headers"]["b"], 7);
        assert_eq!(json["payload"], "hi");

        let binary = Message::new(vec![0xffu8]).to_json();
        assert_eq!(binary["payload"]["base64"], "/w==");
    }
}
