//! CloudEvents XML format using quick-xml.

use super::{EventFormat, FormatError, XML_MEDIA_TYPE};
use crate::event::CloudEvent;
use crate::message::Value;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::SecondsFormat;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use regex::Regex;
use std::sync::LazyLock;

/// Namespace of the CloudEvents XML format.
pub const XML_NAMESPACE: &str = "http://cloudevents.io/xmlformat/V1";

const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Extension names usable as unqualified element names.
static ELEMENT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap());

/// Structured XML event format.
#[derive(Debug, Clone, Default)]
pub struct XmlFormat;

impl XmlFormat {
    /// Create a new XML format.
    pub fn new() -> Self {
        Self
    }
}

impl EventFormat for XmlFormat {
    fn media_type(&self) -> &str {
        XML_MEDIA_TYPE
    }

    fn serialize(&self, event: &CloudEvent) -> Result<Vec<u8>, FormatError> {
        let mut writer = XmlEventWriter {
            writer: Writer::new(Vec::new()),
        };
        writer.write_event(event)?;
        Ok(writer.writer.into_inner())
    }

    fn name(&self) -> &'static str {
        "xml"
    }
}

struct XmlEventWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlEventWriter {
    fn write_event(&mut self, event: &CloudEvent) -> Result<(), FormatError> {
        self.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("event");
        root.push_attribute(("xmlns", XML_NAMESPACE));
        root.push_attribute(("xmlns:xs", XS_NAMESPACE));
        root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
        root.push_attribute(("specversion", event.spec_version()));
        self.write(Event::Start(root))?;

        self.element("id", None, &event.id)?;
        self.element("source", None, event.source.as_str())?;
        self.element("type", None, &event.event_type)?;

        if let Some(time) = &event.time {
            let time = time.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            self.element("time", None, &time)?;
        }
        if let Some(content_type) = &event.data_content_type {
            self.element("datacontenttype", None, content_type)?;
        }
        if let Some(schema) = &event.data_schema {
            self.element("dataschema", None, schema.as_str())?;
        }
        if let Some(subject) = &event.subject {
            self.element("subject", None, subject)?;
        }

        for (name, value) in &event.extensions {
            if !ELEMENT_NAME_REGEX.is_match(name) {
                return Err(FormatError::encoding(
                    "xml",
                    format!("extension name '{}' is not a valid element name", name),
                ));
            }
            let (xsi_type, text) = extension_content(value);
            self.element(name, Some(xsi_type), &text)?;
        }

        if !event.data.is_empty() {
            match std::str::from_utf8(&event.data) {
                Ok(text) if event.is_text_data() && is_xml_text(text) => {
                    self.element("data", Some("xs:string"), text)?;
                }
                _ => {
                    let encoded = STANDARD.encode(&event.data);
                    self.element("data", Some("xs:base64Binary"), &encoded)?;
                }
            }
        }

        self.write(Event::End(BytesEnd::new("event")))
    }

    fn element(&mut self, name: &str, xsi_type: Option<&str>, text: &str) -> Result<(), FormatError> {
        if !is_xml_text(text) {
            return Err(FormatError::encoding(
                "xml",
                format!("'{}' contains a character not allowed in XML 1.0", name),
            ));
        }

        let mut start = BytesStart::new(name);
        if let Some(xsi_type) = xsi_type {
            start.push_attribute(("xsi:type", xsi_type));
        }

        self.write(Event::Start(start))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn write(&mut self, event: Event<'_>) -> Result<(), FormatError> {
        self.writer
            .write_event(event)
            .map_err(|e| FormatError::encoding("xml", e.to_string()))
    }
}

/// Whether every character is allowed in XML 1.0 character data.
fn is_xml_text(text: &str) -> bool {
    text.chars().all(|c| {
        matches!(c, '\t' | '\n' | '\r')
            || (c >= '\u{20}' && c != '\u{FFFE}' && c != '\u{FFFF}')
    })
}

/// Schema type and text of an extension value.
fn extension_content(value: &Value) -> (&'static str, String) {
    match value {
        Value::Text(text) => ("xs:string", text.clone()),
        Value::Uri(uri) => ("xs:anyURI", uri.to_string()),
        Value::Bytes(bytes) => ("xs:base64Binary", STANDARD.encode(bytes)),
        Value::Integer(n) if i32::try_from(*n).is_ok() => ("xs:int", n.to_string()),
        Value::Boolean(b) => ("xs:boolean", b.to_string()),
        Value::Timestamp(_) => ("xs:dateTime", value.to_string()),
        other => ("xs:string", other.to_string()),
    }
}
