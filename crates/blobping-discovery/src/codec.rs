//! Membership record codecs
//!
//! A blob holds the full record list of its owner. The text format is one
//! record per line:
//!
//! ```text
//! node-a A 10.0.0.1:7800 T
//! node-b B 10.0.0.2:7800 F
//! ```
//!
//! Fields are logical name, address, physical address and coordinator flag;
//! `-` marks an absent optional field.

use blobping_common::{CodecKind, Error, MemberAddress, MembershipRecord, Result};
use bytes::Bytes;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

const ABSENT: &str = "-";

/// Encodes record lists into blob content and back
pub trait RecordCodec: Send + Sync {
    /// `Content-Type` stored with encoded blobs
    fn content_type(&self) -> &'static str;

    /// Encode a record list
    fn encode(&self, records: &[MembershipRecord]) -> Result<Bytes>;

    /// Decode blob content; empty input decodes to an empty list
    fn decode(&self, data: &[u8]) -> Result<Vec<MembershipRecord>>;
}

/// Codec implementation for a configured kind
#[must_use]
pub fn codec_for(kind: CodecKind) -> Arc<dyn RecordCodec> {
    match kind {
        CodecKind::Text => Arc::new(TextCodec),
        CodecKind::Json => Arc::new(JsonCodec),
    }
}

/// Line-oriented text codec
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    fn check_field(field: &'static str, value: &str) -> Result<()> {
        if value.is_empty() || value == ABSENT || value.chars().any(char::is_whitespace) {
            return Err(Error::Serialization(format!(
                "{field} '{value}' cannot be encoded as a text field"
            )));
        }
        Ok(())
    }

    fn decode_line(line_no: usize, line: &str) -> Result<MembershipRecord> {
        let invalid = |what: String| Error::Deserialization(format!("line {line_no}: {what}"));

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, address, physical, flag] = fields.as_slice() else {
            return Err(invalid(format!("expected 4 fields, found {}", fields.len())));
        };

        if *address == ABSENT {
            return Err(invalid("missing address".to_string()));
        }
        let logical_name = (*name != ABSENT).then(|| (*name).to_string());
        let physical_addr = if *physical == ABSENT {
            None
        } else {
            Some(
                physical
                    .parse::<SocketAddr>()
                    .map_err(|e| invalid(format!("invalid physical address '{physical}': {e}")))?,
            )
        };
        let coordinator = match *flag {
            "T" => true,
            "F" => false,
            other => return Err(invalid(format!("invalid coordinator flag '{other}'"))),
        };

        Ok(MembershipRecord {
            address: MemberAddress::new(*address),
            logical_name,
            physical_addr,
            coordinator,
        })
    }
}

impl RecordCodec for TextCodec {
    fn content_type(&self) -> &'static str {
        "text/plain"
    }

    fn encode(&self, records: &[MembershipRecord]) -> Result<Bytes> {
        let mut out = String::new();
        for record in records {
            Self::check_field("address", record.address.as_str())?;
            if let Some(name) = &record.logical_name {
                Self::check_field("logical name", name)?;
            }
            let physical = record
                .physical_addr
                .map_or_else(|| ABSENT.to_string(), |addr| addr.to_string());
            // Writing to a String cannot fail
            let _ = writeln!(
                out,
                "{} {} {} {}",
                record.logical_name.as_deref().unwrap_or(ABSENT),
                record.address,
                physical,
                if record.coordinator { "T" } else { "F" }
            );
        }
        Ok(Bytes::from(out))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<MembershipRecord>> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Deserialization(format!("blob is not UTF-8: {e}")))?;

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| Self::decode_line(idx + 1, line))
            .collect()
    }
}

/// JSON array codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RecordCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, records: &[MembershipRecord]) -> Result<Bytes> {
        serde_json::to_vec(records)
            .map(Bytes::from)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<MembershipRecord>> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(data).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
