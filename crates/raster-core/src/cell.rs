//! Cell value types and their fixed-width binary encoding.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Numeric encoding of one cell value in stored payloads.
///
/// Declared in the raster header. Both storage backends encode layer
/// values with the same little-endian fixed-width scheme, so a payload
/// written by one backend is byte-identical when written by the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl Default for CellType {
    fn default() -> Self {
        Self::Float64
    }
}

impl CellType {
    /// Width of one encoded value in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Whether stored values are integers (exact round-trip, exact equality).
    pub fn is_integer(&self) -> bool {
        !matches!(self, Self::Float32 | Self::Float64)
    }

    /// Parse from string (case-insensitive). Returns `None` for unknown
    /// names: a mistyped cell type must never silently decode a payload
    /// at the wrong width.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "uint8" => Some(Self::UInt8),
            "int8" => Some(Self::Int8),
            "uint16" => Some(Self::UInt16),
            "int16" => Some(Self::Int16),
            "uint32" => Some(Self::UInt32),
            "int32" => Some(Self::Int32),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            _ => None,
        }
    }

    /// Get the type name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::UInt32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Encode one value. Integer targets round and saturate to the type's
    /// range (the saturating semantics of `as` on float sources).
    pub fn encode_value(&self, value: f64, buf: &mut impl BufMut) {
        match self {
            Self::UInt8 => buf.put_u8(value.round() as u8),
            Self::Int8 => buf.put_i8(value.round() as i8),
            Self::UInt16 => buf.put_u16_le(value.round() as u16),
            Self::Int16 => buf.put_i16_le(value.round() as i16),
            Self::UInt32 => buf.put_u32_le(value.round() as u32),
            Self::Int32 => buf.put_i32_le(value.round() as i32),
            Self::Float32 => buf.put_f32_le(value as f32),
            Self::Float64 => buf.put_f64_le(value),
        }
    }

    /// Decode one value. The caller guarantees at least `byte_width()`
    /// bytes remain.
    pub fn decode_value(&self, buf: &mut impl Buf) -> f64 {
        match self {
            Self::UInt8 => buf.get_u8() as f64,
            Self::Int8 => buf.get_i8() as f64,
            Self::UInt16 => buf.get_u16_le() as f64,
            Self::Int16 => buf.get_i16_le() as f64,
            Self::UInt32 => buf.get_u32_le() as f64,
            Self::Int32 => buf.get_i32_le() as f64,
            Self::Float32 => buf.get_f32_le() as f64,
            Self::Float64 => buf.get_f64_le(),
        }
    }
}

impl std::fmt::Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CellType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown cell type '{}'", s))
    }
}
