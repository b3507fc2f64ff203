//! Typed payload values and their wire encoding.
//!
//! Every frame carries a one-byte payload-type tag followed by the payload
//! bytes. The tag tells the receiver how to turn the bytes back into a value:
//!
//! ```text
//! 0x00 none        (empty)
//! 0x01 raw bytes   (as-is)
//! 0x02 boolean     (0x00 / 0x01)
//! 0x03 integer     (big-endian i32, or decimal ASCII)
//! 0x04 float       (big-endian IEEE-754 f32, or decimal ASCII)
//! 0x05 string      (UTF-8)
//! 0x06 structured  (UTF-8 JSON text)
//! 0x07 long        (fragmented, produced only by the fragmentation engine)
//! ```
//!
//! # Example
//!
//! ```
//! use espnow_link::payload::{NumberEncoding, Payload, PayloadTag};
//!
//! let (tag, bytes) = Payload::Int(-2).encode(NumberEncoding::Binary);
//! assert_eq!(tag, PayloadTag::Int);
//! assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 0xFE]);
//!
//! let decoded = Payload::decode(tag, &bytes, NumberEncoding::Binary).unwrap();
//! assert_eq!(decoded, Payload::Int(-2));
//! ```

use crate::frame::DecodeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload-type tag as carried at offset 7 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadTag {
    None = 0x00,
    Raw = 0x01,
    Bool = 0x02,
    Int = 0x03,
    Float = 0x04,
    Str = 0x05,
    Structured = 0x06,
    /// Fragmented payload; the real tag travels inside the chunk header.
    Long = 0x07,
}

impl PayloadTag {
    /// The tag byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PayloadTag {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Raw),
            0x02 => Ok(Self::Bool),
            0x03 => Ok(Self::Int),
            0x04 => Ok(Self::Float),
            0x05 => Ok(Self::Str),
            0x06 => Ok(Self::Structured),
            0x07 => Ok(Self::Long),
            other => Err(DecodeError::UnknownPayloadTag(other)),
        }
    }
}

/// How integers and floats are written on the wire.
///
/// Nodes running the simplified firmware variant send numbers as decimal
/// text; everything else uses fixed-width big-endian binary. Both ends of a
/// link must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberEncoding {
    #[default]
    Binary,
    Ascii,
}

/// A typed value carried by a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Raw(Vec<u8>),
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
    /// A JSON list or map.
    Structured(Value),
}

impl Payload {
    /// The tag this value is sent with.
    pub fn tag(&self) -> PayloadTag {
        match self {
            Self::None => PayloadTag::None,
            Self::Raw(_) => PayloadTag::Raw,
            Self::Bool(_) => PayloadTag::Bool,
            Self::Int(_) => PayloadTag::Int,
            Self::Float(_) => PayloadTag::Float,
            Self::Str(_) => PayloadTag::Str,
            Self::Structured(_) => PayloadTag::Structured,
        }
    }

    /// Encode to a (tag, bytes) pair.
    pub fn encode(&self, encoding: NumberEncoding) -> (PayloadTag, Vec<u8>) {
        let bytes = match (self, encoding) {
            (Self::None, _) => Vec::new(),
            (Self::Raw(data), _) => data.clone(),
            (Self::Bool(b), _) => vec![u8::from(*b)],
            (Self::Int(i), NumberEncoding::Binary) => i.to_be_bytes().to_vec(),
            (Self::Int(i), NumberEncoding::Ascii) => i.to_string().into_bytes(),
            (Self::Float(f), NumberEncoding::Binary) => f.to_be_bytes().to_vec(),
            (Self::Float(f), NumberEncoding::Ascii) => f.to_string().into_bytes(),
            (Self::Str(s), _) => s.as_bytes().to_vec(),
            (Self::Structured(v), _) => v.to_string().into_bytes(),
        };
        (self.tag(), bytes)
    }

    /// Decode bytes received with the given tag.
    ///
    /// `PayloadTag::Long` is rejected: chunk payloads must be reassembled
    /// before they are decoded.
    pub fn decode(
        tag: PayloadTag,
        bytes: &[u8],
        encoding: NumberEncoding,
    ) -> Result<Self, DecodeError> {
        match tag {
            PayloadTag::None => Ok(Self::None),
            PayloadTag::Raw => Ok(Self::Raw(bytes.to_vec())),
            PayloadTag::Bool => match bytes {
                [b] => Ok(Self::Bool(*b != 0)),
                _ => Err(DecodeError::InvalidPayload("boolean must be one byte")),
            },
            PayloadTag::Int => match encoding {
                NumberEncoding::Binary => {
                    let raw: [u8; 4] = bytes
                        .try_into()
                        .map_err(|_| DecodeError::InvalidPayload("integer must be 4 bytes"))?;
                    Ok(Self::Int(i32::from_be_bytes(raw)))
                }
                NumberEncoding::Ascii => parse_ascii(bytes)
                    .map(Self::Int)
                    .ok_or(DecodeError::InvalidPayload("integer is not decimal text")),
            },
            PayloadTag::Float => match encoding {
                NumberEncoding::Binary => {
                    let raw: [u8; 4] = bytes
                        .try_into()
                        .map_err(|_| DecodeError::InvalidPayload("float must be 4 bytes"))?;
                    Ok(Self::Float(f32::from_be_bytes(raw)))
                }
                NumberEncoding::Ascii => parse_ascii(bytes)
                    .map(Self::Float)
                    .ok_or(DecodeError::InvalidPayload("float is not decimal text")),
            },
            PayloadTag::Str => std::str::from_utf8(bytes)
                .map(|s| Self::Str(s.to_string()))
                .map_err(|_| DecodeError::InvalidPayload("string is not UTF-8")),
            PayloadTag::Structured => serde_json::from_slice(bytes)
                .map(Self::Structured)
                .map_err(|_| DecodeError::InvalidPayload("structured payload is not JSON")),
            PayloadTag::Long => Err(DecodeError::InvalidPayload(
                "fragmented payload reached the value decoder",
            )),
        }
    }

    /// Number of payload bytes this value occupies on the wire.
    pub fn encoded_len(&self, encoding: NumberEncoding) -> usize {
        match (self, encoding) {
            (Self::None, _) => 0,
            (Self::Raw(data), _) => data.len(),
            (Self::Bool(_), _) => 1,
            (Self::Int(_) | Self::Float(_), NumberEncoding::Binary) => 4,
            (Self::Str(s), _) => s.len(),
            _ => self.encode(encoding).1.len(),
        }
    }

    /// Convert a JSON value into the closest typed payload.
    ///
    /// Scalars map to their own variants; lists and maps stay structured.
    /// Integers outside the `i32` range and non-integral numbers become floats.
    pub fn from_json_value(value: Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default() as f32),
            },
            Value::String(s) => Self::Str(s),
            other => Self::Structured(other),
        }
    }

    /// Borrow the string value, if this is a string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the JSON value, if this is a structured payload.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Check if this is the empty payload.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i32> for Payload {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<f32> for Payload {
    fn from(f: f32) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Raw(data)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}
