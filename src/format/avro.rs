//! CloudEvents Avro compact format.
//!
//! Events are written with Avro single-object encoding: the two byte marker
//! `C3 01`, the little-endian CRC-64-AVRO fingerprint of the schema's parsing
//! canonical form, then the binary-encoded record.

use super::{EventFormat, FormatError, AVRO_COMPACT_MEDIA_TYPE};
use crate::event::CloudEvent;
use crate::message::Value;

/// Writer schema of the record.
pub const SCHEMA: &str = r#"{
  "type": "record",
  "name": "AvroCompactEvent",
  "namespace": "io.cloudevents",
  "fields": [
    {"name": "id", "type": "string"},
    {"name": "source", "type": "string"},
    {"name": "type", "type": "string"},
    {"name": "time", "type": ["null", {"type": "long", "logicalType": "timestamp-micros"}]},
    {"name": "datacontenttype", "type": ["null", "string"]},
    {"name": "dataschema", "type": ["null", "string"]},
    {"name": "subject", "type": ["null", "string"]},
    {"name": "extensions", "type": {"type": "map", "values": ["boolean", "long", "string", "bytes"]}},
    {"name": "data", "type": ["bytes", "null"]}
  ]
}"#;

/// Parsing canonical form of [`SCHEMA`].
const CANONICAL_SCHEMA: &str = concat!(
    r#"{"name":"io.cloudevents.AvroCompactEvent","type":"record","fields":["#,
    r#"{"name":"id","type":"string"},"#,
    r#"{"name":"source","type":"string"},"#,
    r#"{"name":"type","type":"string"},"#,
    r#"{"name":"time","type":["null","long"]},"#,
    r#"{"name":"datacontenttype","type":["null","string"]},"#,
    r#"{"name":"dataschema","type":["null","string"]},"#,
    r#"{"name":"subject","type":["null","string"]},"#,
    r#"{"name":"extensions","type":{"type":"map","values":["boolean","long","string","bytes"]}},"#,
    r#"{"name":"data","type":["bytes","null"]}]}"#
);

/// Single-object encoding marker.
const MARKER: [u8; 2] = [0xc3, 0x01];

const EMPTY_FINGERPRINT: u64 = 0xc15d213aa4d7a795;

const FINGERPRINT_TABLE: [u64; 256] = fingerprint_table();

/// CRC-64-AVRO fingerprint of the canonical schema.
pub const SCHEMA_FINGERPRINT: u64 = fingerprint(CANONICAL_SCHEMA.as_bytes());

const fn fingerprint_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut fp = i as u64;
        let mut j = 0;
        while j < 8 {
            fp = (fp >> 1) ^ (EMPTY_FINGERPRINT & (fp & 1).wrapping_neg());
            j += 1;
        }
        table[i] = fp;
        i += 1;
    }
    table
}

/// Rabin fingerprint as defined for Avro schemas.
pub const fn fingerprint(bytes: &[u8]) -> u64 {
    let mut fp = EMPTY_FINGERPRINT;
    let mut i = 0;
    while i < bytes.len() {
        fp = (fp >> 8) ^ FINGERPRINT_TABLE[((fp ^ bytes[i] as u64) & 0xff) as usize];
        i += 1;
    }
    fp
}

/// Avro compact event format.
#[derive(Debug, Clone, Default)]
pub struct AvroCompactFormat;

impl AvroCompactFormat {
    /// Create a new Avro compact format.
    pub fn new() -> Self {
        Self
    }
}

impl EventFormat for AvroCompactFormat {
    fn media_type(&self) -> &str {
        AVRO_COMPACT_MEDIA_TYPE
    }

    fn serialize(&self, event: &CloudEvent) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::with_capacity(64 + event.data.len());
        out.extend_from_slice(&MARKER);
        out.extend_from_slice(&SCHEMA_FINGERPRINT.to_le_bytes());

        write_string(&mut out, &event.id);
        write_string(&mut out, event.source.as_str());
        write_string(&mut out, &event.event_type);

        match &event.time {
            Some(time) => {
                write_long(&mut out, 1);
                write_long(&mut out, time.timestamp_micros());
            }
            None => write_long(&mut out, 0),
        }
        write_optional_string(&mut out, event.data_content_type.as_deref());
        write_optional_string(&mut out, event.data_schema.as_ref().map(|u| u.as_str()));
        write_optional_string(&mut out, event.subject.as_deref());

        if !event.extensions.is_empty() {
            let count = i64::try_from(event.extensions.len())
                .map_err(|_| FormatError::encoding(self.name(), "too many extensions"))?;
            write_long(&mut out, count);
            for (name, value) in &event.extensions {
                write_string(&mut out, name);
                write_extension(&mut out, value);
            }
        }
        write_long(&mut out, 0);

        if event.data.is_empty() {
            write_long(&mut out, 1);
        } else {
            write_long(&mut out, 0);
            write_bytes(&mut out, &event.data);
        }

        Ok(out)
    }

    fn name(&self) -> &'static str {
        "avro_compact"
    }
}

/// Write an extension as a `[boolean, long, string, bytes]` union.
fn write_extension(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Boolean(b) => {
            write_long(out, 0);
            out.push(u8::from(*b));
        }
        Value::Integer(n) => {
            write_long(out, 1);
            write_long(out, *n);
        }
        Value::Bytes(bytes) => {
            write_long(out, 3);
            write_bytes(out, bytes);
        }
        other => {
            write_long(out, 2);
            write_string(out, &other.to_string());
        }
    }
}

/// Zigzag varint.
fn write_long(out: &mut Vec<u8>, n: i64) {
    let mut z = ((n << 1) ^ (n >> 63)) as u64;
    while z >= 0x80 {
        out.push((z as u8 & 0x7f) | 0x80);
        z >>= 7;
    }
    out.push(z as u8);
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    // Slice lengths never exceed isize::MAX
    write_long(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

fn write_optional_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            write_long(out, 1);
            write_string(out, s);
        }
        None => write_long(out, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Uri;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn event() -> CloudEvent {
        CloudEvent {
            id: "abc".to_string(),
            source: Uri::parse("urn:test").unwrap(),
            event_type: "demo".to_string(),
            time: None,
            data_content_type: None,
            data_schema: None,
            subject: None,
            data: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    #[test]
    fn test_fingerprint() {
        assert_eq!(fingerprint(b""), EMPTY_FINGERPRINT);
        assert_eq!(fingerprint(br#""int""#), 0x7275d51a3f395c8f);
        assert_eq!(SCHEMA_FINGERPRINT, 0xc5fc88986daaa3e3);
    }

    #[test]
    fn test_canonical_form_matches_schema() {
        let schema: serde_json::Value = serde_json::from_str(SCHEMA).unwrap();
        let canonical: serde_json::Value = serde_json::from_str(CANONICAL_SCHEMA).unwrap();
        assert_eq!(schema["fields"].as_array().unwrap().len(), 9);
        assert_eq!(canonical["fields"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn test_zigzag() {
        let mut out = Vec::new();
        write_long(&mut out, 0);
        write_long(&mut out, -1);
        write_long(&mut out, 64);
        write_long(&mut out, -65);
        assert_eq!(hex(&out), "0001800181 01".replace(' ', ""));
    }

    #[test]
    fn test_minimal_event() {
        let mut e = event();
        e.data = b"hi".to_vec();

        let bytes = AvroCompactFormat::new().serialize(&e).unwrap();
        assert_eq!(
            hex(&bytes),
            "c301e3a3aa6d9888fcc5066162631075726e3a746573740864656d6f000000000000046869"
        );
    }

    #[test]
    fn test_full_event() {
        let mut e = event();
        e.time = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        e.subject = Some("orders".to_string());
        e.extensions.insert("count".to_string(), Value::Integer(3));
        e.extensions.insert("flag".to_string(), Value::Boolean(true));

        let bytes = AvroCompactFormat::new().serialize(&e).unwrap();
        assert_eq!(&bytes[..2], &MARKER);
        assert_eq!(
            hex(&bytes[10..]),
            concat!(
                "066162631075726e3a746573740864656d6f",
                "0280cdee84b8fb8606",
                "000002",
                "0c6f7264657273",
                "040a636f756e7402060866",
                "6c61670001",
                "00",
                "02"
            )
        );
    }
}
