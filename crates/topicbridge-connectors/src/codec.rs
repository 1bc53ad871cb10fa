//! Payload codecs.
//!
//! The read-side client decodes record keys and values with a [`Codec`]
//! chosen from configuration when the client is constructed. Decoded
//! values are carried as [`Payload`].

use std::fmt;

use crate::error::CodecError;

/// Declared kind of a record key or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Codec {
    /// UTF-8 text.
    #[default]
    String,

    /// Raw bytes, passed through unchanged.
    Bytes,

    /// 32-bit big-endian signed integer.
    Int,

    /// 64-bit big-endian signed integer.
    Long,

    /// JSON document.
    Json,
}

impl Codec {
    /// Returns the codec name as used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::String => "string",
            Codec::Bytes => "bytes",
            Codec::Int => "int",
            Codec::Long => "long",
            Codec::Json => "json",
        }
    }

    /// Decodes a raw payload. A missing payload (tombstone) decodes to
    /// [`Payload::Null`] regardless of codec.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the bytes are not valid for this codec.
    pub fn decode(&self, data: Option<&[u8]>) -> Result<Payload, CodecError> {
        let Some(data) = data else {
            return Ok(Payload::Null);
        };

        match self {
            Codec::String => Ok(Payload::Text(String::from_utf8(data.to_vec())?)),
            Codec::Bytes => Ok(Payload::Bytes(data.to_vec())),
            Codec::Int => {
                let bytes: [u8; 4] = data.try_into().map_err(|_| CodecError::InvalidLength {
                    codec: "int",
                    expected: 4,
                    got: data.len(),
                })?;
                Ok(Payload::Int(i32::from_be_bytes(bytes)))
            }
            Codec::Long => {
                let bytes: [u8; 8] = data.try_into().map_err(|_| CodecError::InvalidLength {
                    codec: "long",
                    expected: 8,
                    got: data.len(),
                })?;
                Ok(Payload::Long(i64::from_be_bytes(bytes)))
            }
            Codec::Json => Ok(Payload::Json(serde_json::from_slice(data)?)),
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" | "utf8" => Ok(Codec::String),
            "bytes" | "bytearray" | "raw" => Ok(Codec::Bytes),
            "int" | "integer" | "i32" => Ok(Codec::Int),
            "long" | "i64" => Ok(Codec::Long),
            "json" => Ok(Codec::Json),
            other => Err(CodecError::UnsupportedCodec(other.to_string())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded record key or value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// JSON document.
    Json(serde_json::Value),
    /// Absent payload.
    Null,
}

impl Payload {
    /// Returns the text if this is a [`Payload::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` for [`Payload::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }
}
