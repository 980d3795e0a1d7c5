//! A single protocol frame: a type tag plus ordered `KEY:VALUE` fields.
//!
//! ```text
//! TYPE:CMD;TOKEN:abc123;ACTION:SPEED_UP
//! └──┬───┘ └────┬─────┘ └─────┬──────┘
//!    tag      field          field
//! ```
//!
//! The wire format has no escaping, so constructors refuse values that
//! would corrupt the line (`;` or line breaks) instead of emitting them.

use std::fmt;

use crate::error::MetroError;
use crate::message::MessageType;

/// Separator between segments of a frame.
pub const FIELD_SEPARATOR: char = ';';

/// Separator between a key and its value.
pub const KEY_VALUE_DELIMITER: char = ':';

/// Key of the leading segment.
pub const TYPE_KEY: &str = "TYPE";

pub mod field {
    pub const USER: &str = "USER";
    pub const PASS: &str = "PASS";
    pub const TOKEN: &str = "TOKEN";
    pub const ACTION: &str = "ACTION";
    pub const REASON: &str = "REASON";
    pub const SPEED: &str = "SPEED";
    pub const BATTERY: &str = "BATTERY";
    pub const DIRECTION: &str = "DIRECTION";
    pub const STATION: &str = "STATION";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: MessageType,
    fields: Vec<(String, String)>,
}

impl Frame {
    /// Build a frame, validating every key and value.
    pub fn new<K, V>(
        kind: MessageType,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, MetroError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut frame = Self {
            kind,
            fields: Vec::new(),
        };
        for (k, v) in fields {
            frame.push(k.into(), v.into())?;
        }
        Ok(frame)
    }

    pub fn auth(user: &str, pass: &str) -> Result<Self, MetroError> {
        Self::new(MessageType::Auth, [(field::USER, user), (field::PASS, pass)])
    }

    pub fn command(token: &str, action: &str) -> Result<Self, MetroError> {
        Self::new(
            MessageType::Cmd,
            [(field::TOKEN, token), (field::ACTION, action)],
        )
    }

    pub fn logout(token: &str) -> Result<Self, MetroError> {
        Self::new(MessageType::Logout, [(field::TOKEN, token)])
    }

    fn push(&mut self, key: String, value: String) -> Result<(), MetroError> {
        validate_key(&key)?;
        if let Some(bad) = value.chars().find(|c| matches!(c, ';' | '\n' | '\r')) {
            return Err(MetroError::invalid_field(
                key,
                format!("value contains reserved character {bad:?}"),
            ));
        }
        if self.field(&key).is_some() {
            return Err(MetroError::invalid_field(key, "duplicate key"));
        }
        self.fields.push((key, value));
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn is(&self, kind: MessageType) -> bool {
        self.kind == kind
    }

    /// Fields in wire order, excluding the `TYPE` segment.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`Frame::field`], but a missing key is a protocol error.
    pub fn require(&self, key: &'static str) -> Result<&str, MetroError> {
        self.field(key).ok_or(MetroError::MissingField {
            kind: self.kind.as_str(),
            field: key,
        })
    }

    // ── Wire format ──────────────────────────────────────────────

    /// Render the frame as one line, without the trailing newline.
    pub fn encode(&self) -> String {
        let mut out = format!("{TYPE_KEY}{KEY_VALUE_DELIMITER}{}", self.kind);
        for (k, v) in &self.fields {
            out.push(FIELD_SEPARATOR);
            out.push_str(k);
            out.push(KEY_VALUE_DELIMITER);
            out.push_str(v);
        }
        out
    }

    /// Parse one line. A trailing `\r`/`\n` is ignored.
    ///
    /// Empty segments are skipped and a repeated key keeps its first
    /// value, so a sloppy server line still decodes.
    pub fn decode(line: &str) -> Result<Self, MetroError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut segments = line.split(FIELD_SEPARATOR);

        let head = segments.next().unwrap_or_default();
        let tag = match head.split_once(KEY_VALUE_DELIMITER) {
            Some((TYPE_KEY, tag)) => tag,
            _ => {
                return Err(MetroError::MalformedFrame(format!(
                    "expected {TYPE_KEY} segment, got {head:?}"
                )));
            }
        };
        let kind: MessageType = tag.parse()?;

        let mut fields: Vec<(String, String)> = Vec::new();
        for segment in segments.filter(|s| !s.is_empty()) {
            let Some((key, value)) = segment.split_once(KEY_VALUE_DELIMITER) else {
                return Err(MetroError::MalformedFrame(format!(
                    "segment {segment:?} has no key/value delimiter"
                )));
            };
            if key.is_empty() {
                return Err(MetroError::MalformedFrame(format!(
                    "segment {segment:?} has an empty key"
                )));
            }
            if key == TYPE_KEY || fields.iter().any(|(k, _)| k == key) {
                tracing::debug!(key, "dropping repeated field in {kind} frame");
                continue;
            }
            fields.push((key.to_string(), value.to_string()));
        }

        Ok(Self { kind, fields })
    }

    /// The error an `ERR` reply stands for, carrying its `REASON`.
    pub fn rejection(&self) -> MetroError {
        MetroError::Rejected {
            reason: self
                .field(field::REASON)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        }
    }

    /// Encoded form with secrets masked, for logging.
    pub fn redacted(&self) -> String {
        if self.field(field::PASS).is_none() {
            return self.encode();
        }
        let mut copy = self.clone();
        for (k, v) in copy.fields.iter_mut() {
            if k == field::PASS {
                *v = "***".to_string();
            }
        }
        copy.encode()
    }
}

fn validate_key(key: &str) -> Result<(), MetroError> {
    if key.is_empty() {
        return Err(MetroError::invalid_field(key, "empty key"));
    }
    if key == TYPE_KEY {
        return Err(MetroError::invalid_field(key, "TYPE is reserved for the tag"));
    }
    if key.contains([';', ':', '\n', '\r']) {
        return Err(MetroError::invalid_field(key, "key contains a reserved character"));
    }
    Ok(())
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_command() {
        let frame = Frame::command("abc123", "SPEED_UP").unwrap();
        assert_eq!(frame.encode(), "TYPE:CMD;TOKEN:abc123;ACTION:SPEED_UP");
    }

    #[test]
    fn encode_without_fields() {
        let frame = Frame::new(MessageType::Ack, Vec::<(String, String)>::new()).unwrap();
        assert_eq!(frame.encode(), "TYPE:ACK");
    }

    #[test]
    fn round_trip_preserves_order() {
        let fields = [("Z", "1"), ("A", "two words"), ("M", "x:y"), ("E", "")];
        for kind in MessageType::ALL {
            let frame = Frame::new(kind, fields).unwrap();
            let decoded = Frame::decode(&frame.encode()).unwrap();
            assert_eq!(decoded, frame);
            let keys: Vec<_> = decoded.fields().map(|(k, _)| k).collect();
            assert_eq!(keys, ["Z", "A", "M", "E"]);
        }
    }

    #[test]
    fn decode_splits_on_first_delimiter() {
        let frame = Frame::decode("TYPE:ERR;REASON:bad: very bad\r\n").unwrap();
        assert_eq!(frame.kind(), MessageType::Err);
        assert_eq!(frame.field(field::REASON), Some("bad: very bad"));
    }

    #[test]
    fn decode_telemetry_line() {
        let frame =
            Frame::decode("TYPE:TELEMETRY;SPEED:45.5;BATTERY:72;DIRECTION:FORWARD;STATION:5")
                .unwrap();
        assert!(frame.is(MessageType::Telemetry));
        assert_eq!(frame.field(field::SPEED), Some("45.5"));
        assert_eq!(frame.field(field::STATION), Some("5"));
    }

    #[test]
    fn decode_rejects_missing_type_prefix() {
        for line in ["", "USER:x;TYPE:AUTH", "TYPE", "garbage"] {
            let err = Frame::decode(line).unwrap_err();
            assert!(matches!(err, MetroError::MalformedFrame(_)), "{line:?}");
        }
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let err = Frame::decode("TYPE:PING;X:1").unwrap_err();
        assert!(matches!(err, MetroError::UnknownMessageType(_)));
        assert!(err.is_protocol());
    }

    #[test]
    fn decode_rejects_segment_without_delimiter() {
        let err = Frame::decode("TYPE:ACK;oops").unwrap_err();
        assert!(matches!(err, MetroError::MalformedFrame(_)));
    }

    #[test]
    fn decode_is_lenient_on_empty_and_repeated_segments() {
        let frame = Frame::decode("TYPE:AUTH_OK;;TOKEN:first;TOKEN:second;").unwrap();
        assert_eq!(frame.field(field::TOKEN), Some("first"));
        assert_eq!(frame.fields().count(), 1);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let frame = Frame::decode("TYPE:ACK;SERVER_TIME:12:00").unwrap();
        assert_eq!(frame.field("SERVER_TIME"), Some("12:00"));
    }

    #[test]
    fn require_reports_missing_field() {
        let frame = Frame::decode("TYPE:AUTH_OK").unwrap();
        let err = frame.require(field::TOKEN).unwrap_err();
        assert!(matches!(
            err,
            MetroError::MissingField {
                kind: "AUTH_OK",
                field: "TOKEN"
            }
        ));
    }

    #[test]
    fn constructor_rejects_separator_in_value() {
        let err = Frame::auth("admin", "pa;ss").unwrap_err();
        assert!(matches!(err, MetroError::InvalidField { ref field, .. } if field == "PASS"));
        assert!(Frame::logout("tok\nen").is_err());
    }

    #[test]
    fn constructor_rejects_bad_keys() {
        assert!(Frame::new(MessageType::Ack, [("", "v")]).is_err());
        assert!(Frame::new(MessageType::Ack, [("A:B", "v")]).is_err());
        assert!(Frame::new(MessageType::Ack, [("TYPE", "v")]).is_err());
        assert!(Frame::new(MessageType::Ack, [("A", "1"), ("A", "2")]).is_err());
    }

    #[test]
    fn rejection_reason() {
        let frame = Frame::decode("TYPE:ERR;REASON:Invalid token").unwrap();
        assert!(matches!(frame.rejection(), MetroError::Rejected { reason: Some(r) } if r == "Invalid token"));

        let frame = Frame::decode("TYPE:ERR;REASON:").unwrap();
        assert!(matches!(frame.rejection(), MetroError::Rejected { reason: None }));
    }

    #[test]
    fn redacted_masks_password() {
        let frame = Frame::auth("admin", "metro123").unwrap();
        assert_eq!(frame.redacted(), "TYPE:AUTH;USER:admin;PASS:***");
        assert_eq!(frame.encode(), "TYPE:AUTH;USER:admin;PASS:metro123");
        assert!(!frame.to_string().contains("metro123"));
    }
}
