//! Data section decoding
//!
//! Decodes the MaxMind DB data format: every value starts
//! with a control byte whose high 3 bits select the type and whose low 5
//! bits carry the size (or a size-extension flag). Type 0 means "extended":
//! the real type is `7 + next byte`.
//!
//! # Supported Types
//!
//! - **Pointer** (1): Reference to another value in the same section
//! - **String** (2): UTF-8 text data
//! - **Double** (3): 64-bit floating point (IEEE 754)
//! - **Bytes** (4): Raw byte arrays
//! - **Uint16** (5) / **Uint32** (6): Unsigned integers, variable width
//! - **Map** (7): Key-value pairs (string keys)
//! - **Int32** (8): Signed 32-bit integers
//! - **Uint64** (9) / **Uint128** (10): Unsigned integers, variable width
//! - **Array** (11): Ordered lists of values
//! - **Bool** (14): Boolean values, stored in the size field
//! - **Float** (15): 32-bit floating point (IEEE 754)
//!
//! Types 12 (data cache container) and 13 (end marker) never appear in a
//! data section and are rejected.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::FormatError;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Maximum combined container nesting and pointer-follow depth
pub const MAX_DECODE_DEPTH: usize = 256;

/// Encoded bytes one resolving call may decode, per byte of section
///
/// Shared pointer targets are decoded once per reference, so without a
/// total budget a few hundred bytes of doubling pointers expand without bound.
pub const RESOLVE_BUDGET_FACTOR: usize = 4;

/// Floor for the resolve budget, so small sections can still share values
const MIN_RESOLVE_BUDGET: usize = 4096;

/// Base added to the raw value of a pointer, by pointer size selector
const POINTER_BASE: [u32; 4] = [0, 2048, 526_336, 0];

/// Data value decoded from a data section
///
/// Transient: built per lookup and owned by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Pointer to another data item (offset within the same section)
    Pointer(u32),
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only)
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Human-readable name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            DataValue::Pointer(_) => DataType::Pointer.name(),
            DataValue::String(_) => DataType::String.name(),
            DataValue::Double(_) => DataType::Double.name(),
            DataValue::Bytes(_) => DataType::Bytes.name(),
            DataValue::Uint16(_) => DataType::Uint16.name(),
            DataValue::Uint32(_) => DataType::Uint32.name(),
            DataValue::Map(_) => DataType::Map.name(),
            DataValue::Int32(_) => DataType::Int32.name(),
            DataValue::Uint64(_) => DataType::Uint64.name(),
            DataValue::Uint128(_) => DataType::Uint128.name(),
            DataValue::Array(_) => DataType::Array.name(),
            DataValue::Bool(_) => DataType::Bool.name(),
            DataValue::Float(_) => DataType::Float.name(),
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned integer up to 64 bits, widened
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(u64::from(*n)),
            DataValue::Uint32(n) => Some(u64::from(*n)),
            DataValue::Uint64(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean contents, if this is a bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Map contents, if this is a map
    pub fn as_map(&self) -> Option<&HashMap<String, DataValue>> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Array contents, if this is an array
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Look up a key when this value is a map
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DataValue::Pointer(offset) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$pointer", offset)?;
                map.end()
            }
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(d) => serializer.serialize_f64(*d),
            DataValue::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Map(m) => {
                // Sorted so output is stable across runs
                let mut entries: Vec<_> = m.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            DataValue::Uint128(n) => serializer.serialize_u128(*n),
            DataValue::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(f) => serializer.serialize_f32(*f),
        }
    }
}

/// Type number carried by a control byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    /// Type 1
    Pointer = 1,
    /// Type 2
    String = 2,
    /// Type 3
    Double = 3,
    /// Type 4
    Bytes = 4,
    /// Type 5
    Uint16 = 5,
    /// Type 6
    Uint32 = 6,
    /// Type 7
    Map = 7,
    /// Type 8 (extended 1)
    Int32 = 8,
    /// Type 9 (extended 2)
    Uint64 = 9,
    /// Type 10 (extended 3)
    Uint128 = 10,
    /// Type 11 (extended 4)
    Array = 11,
    /// Type 14 (extended 7)
    Bool = 14,
    /// Type 15 (extended 8)
    Float = 15,
}

impl DataType {
    fn from_id(type_id: u8) -> Option<Self> {
        Some(match type_id {
            1 => DataType::Pointer,
            2 => DataType::String,
            3 => DataType::Double,
            4 => DataType::Bytes,
            5 => DataType::Uint16,
            6 => DataType::Uint32,
            7 => DataType::Map,
            8 => DataType::Int32,
            9 => DataType::Uint64,
            10 => DataType::Uint128,
            11 => DataType::Array,
            14 => DataType::Bool,
            15 => DataType::Float,
            _ => return None,
        })
    }

    /// Lowercase type name
    pub fn name(self) -> &'static str {
        match self {
            DataType::Pointer => "pointer",
            DataType::String => "string",
            DataType::Double => "double",
            DataType::Bytes => "bytes",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Map => "map",
            DataType::Int32 => "int32",
            DataType::Uint64 => "uint64",
            DataType::Uint128 => "uint128",
            DataType::Array => "array",
            DataType::Bool => "boolean",
            DataType::Float => "float",
        }
    }
}

/// A parsed control byte
///
/// For pointers `size` holds the raw 5-bit payload; for every other type
/// it is the fully extended size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    /// Decoded type
    pub data_type: DataType,
    /// Size, element count, or raw pointer payload
    pub size: usize,
    /// Offset of the first payload byte
    pub payload_offset: usize,
}

/// Data section decoder
///
/// Decodes values from an encoded data section buffer. Every read is
/// bounds-checked against the buffer, so adversarial length and pointer
/// fields produce errors rather than panics.
///
/// Pointer-valued entries inside maps and arrays are returned as
/// [`DataValue::Pointer`]; use [`DataDecoder::resolve`] or
/// [`DataDecoder::decode_resolved`] to follow them.
#[derive(Debug, Clone, Copy)]
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section (pointers are relative to its start)
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// The underlying section
    pub fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    /// Decode one value at `offset`, returning it with the offset just past it
    pub fn decode(&self, offset: usize) -> Result<(DataValue, usize), FormatError> {
        self.decode_value(offset, 0)
    }

    /// Decode the value at `offset` and follow every pointer inside it
    pub fn decode_resolved(&self, offset: usize) -> Result<DataValue, FormatError> {
        let mut budget = self.resolve_budget();
        let (value, next) = self.decode_value(offset, 0)?;
        self.charge(&mut budget, offset, next)?;
        self.resolve_value(value, offset, 0, &mut budget)
    }

    /// Follow pointers in an already decoded value, recursively
    ///
    /// Pointer chains are followed until a non-pointer value is reached;
    /// cycles end in [`FormatError::MaxDepthExceeded`]. All pointer targets
    /// decoded by one call share a budget of [`RESOLVE_BUDGET_FACTOR`] times
    /// the section length; exhausting it is
    /// [`FormatError::ResolveLimitExceeded`].
    pub fn resolve(&self, value: DataValue) -> Result<DataValue, FormatError> {
        let mut budget = self.resolve_budget();
        self.resolve_value(value, 0, 0, &mut budget)
    }

    /// Total encoded bytes one resolving call may decode
    pub fn resolve_budget(&self) -> usize {
        self.buffer
            .len()
            .saturating_mul(RESOLVE_BUDGET_FACTOR)
            .max(MIN_RESOLVE_BUDGET)
    }

    /// Parse the control byte (plus extended type and size bytes) at `offset`
    pub fn read_control(&self, offset: usize) -> Result<Control, FormatError> {
        let ctrl = self.read_byte(offset)?;
        let mut cursor = offset + 1;

        let mut type_id = ctrl >> 5;
        if type_id == 0 {
            type_id = 7u8.saturating_add(self.read_byte(cursor)?);
            cursor += 1;
            // Extended types are 8..=15; an extended byte of 0 would alias map
            if type_id < 8 {
                return Err(FormatError::InvalidType { offset, type_id });
            }
        }

        let data_type =
            DataType::from_id(type_id).ok_or(FormatError::InvalidType { offset, type_id })?;

        let payload = ctrl & 0x1F;
        if data_type == DataType::Pointer {
            return Ok(Control {
                data_type,
                size: payload as usize,
                payload_offset: cursor,
            });
        }

        let (size, payload_offset) = self.decode_size(payload, cursor)?;
        Ok(Control {
            data_type,
            size,
            payload_offset,
        })
    }

    /// Decode a pointer whose control byte was already read
    ///
    /// Bits 3-4 of the payload select 1-4 following bytes; for selectors
    /// 0-2 the low 3 bits are the most significant bits of the offset.
    pub fn read_pointer(&self, payload: usize, offset: usize) -> Result<(u32, usize), FormatError> {
        let selector = (payload >> 3) & 0x3;
        let len = selector + 1;
        let bytes = self.slice(offset, len)?;

        let mut raw: u32 = if selector == 3 {
            0
        } else {
            (payload & 0x7) as u32
        };
        for &b in bytes {
            raw = (raw << 8) | u32::from(b);
        }

        Ok((raw + POINTER_BASE[selector], offset + len))
    }

    fn decode_value(&self, offset: usize, depth: usize) -> Result<(DataValue, usize), FormatError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(FormatError::MaxDepthExceeded {
                offset,
                max: MAX_DECODE_DEPTH,
            });
        }

        let ctrl = self.read_control(offset)?;
        let cursor = ctrl.payload_offset;
        let size = ctrl.size;

        match ctrl.data_type {
            DataType::Pointer => {
                let (target, next) = self.read_pointer(size, cursor)?;
                Ok((DataValue::Pointer(target), next))
            }
            DataType::String => {
                let bytes = self.slice(cursor, size)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| FormatError::InvalidUtf8 { offset: cursor })?;
                Ok((DataValue::String(s.to_string()), cursor + size))
            }
            DataType::Double => {
                let bytes = self.fixed::<8>(offset, cursor, size, "double")?;
                Ok((DataValue::Double(f64::from_be_bytes(bytes)), cursor + 8))
            }
            DataType::Float => {
                let bytes = self.fixed::<4>(offset, cursor, size, "float")?;
                Ok((DataValue::Float(f32::from_be_bytes(bytes)), cursor + 4))
            }
            DataType::Bytes => {
                let bytes = self.slice(cursor, size)?;
                Ok((DataValue::Bytes(bytes.to_vec()), cursor + size))
            }
            DataType::Uint16 => {
                let n = self.read_uint(offset, cursor, size, 2, "uint16")?;
                Ok((DataValue::Uint16(n as u16), cursor + size))
            }
            DataType::Uint32 => {
                let n = self.read_uint(offset, cursor, size, 4, "uint32")?;
                Ok((DataValue::Uint32(n as u32), cursor + size))
            }
            DataType::Int32 => {
                // Narrow encodings are zero-extended
                let n = self.read_uint(offset, cursor, size, 4, "int32")?;
                Ok((DataValue::Int32(n as u32 as i32), cursor + size))
            }
            DataType::Uint64 => {
                let n = self.read_uint(offset, cursor, size, 8, "uint64")?;
                Ok((DataValue::Uint64(n as u64), cursor + size))
            }
            DataType::Uint128 => {
                let n = self.read_uint(offset, cursor, size, 16, "uint128")?;
                Ok((DataValue::Uint128(n), cursor + size))
            }
            DataType::Bool => match size {
                0 | 1 => Ok((DataValue::Bool(size == 1), cursor)),
                _ => Err(FormatError::InvalidSize {
                    offset,
                    kind: "boolean",
                    size,
                }),
            },
            DataType::Map => self.decode_map(cursor, size, depth),
            DataType::Array => self.decode_array(cursor, size, depth),
        }
    }

    fn decode_map(
        &self,
        mut cursor: usize,
        count: usize,
        depth: usize,
    ) -> Result<(DataValue, usize), FormatError> {
        // Every entry needs at least two bytes, so an adversarial count
        // cannot force a large allocation
        let remaining = self.buffer.len().saturating_sub(cursor);
        let mut map = HashMap::with_capacity(count.min(remaining / 2));

        for _ in 0..count {
            let (key, next) = self.decode_key(cursor, depth + 1)?;
            let (value, next) = self.decode_value(next, depth + 1)?;
            map.insert(key, value);
            cursor = next;
        }

        Ok((DataValue::Map(map), cursor))
    }

    fn decode_array(
        &self,
        mut cursor: usize,
        count: usize,
        depth: usize,
    ) -> Result<(DataValue, usize), FormatError> {
        let remaining = self.buffer.len().saturating_sub(cursor);
        let mut array = Vec::with_capacity(count.min(remaining));

        for _ in 0..count {
            let (value, next) = self.decode_value(cursor, depth + 1)?;
            array.push(value);
            cursor = next;
        }

        Ok((DataValue::Array(array), cursor))
    }

    /// Decode a map key, dereferencing pointer-encoded keys
    fn decode_key(&self, offset: usize, depth: usize) -> Result<(String, usize), FormatError> {
        let ctrl = self.read_control(offset)?;
        match ctrl.data_type {
            DataType::String => match self.decode_value(offset, depth)? {
                (DataValue::String(s), next) => Ok((s, next)),
                (other, _) => Err(FormatError::InvalidKeyType {
                    offset,
                    found: other.kind(),
                }),
            },
            DataType::Pointer => {
                let (target, next) = self.read_pointer(ctrl.size, ctrl.payload_offset)?;
                let key = self.follow_key(target as usize, depth + 1)?;
                Ok((key, next))
            }
            other => Err(FormatError::InvalidKeyType {
                offset,
                found: other.name(),
            }),
        }
    }

    fn follow_key(&self, mut offset: usize, mut depth: usize) -> Result<String, FormatError> {
        loop {
            if depth > MAX_DECODE_DEPTH {
                return Err(FormatError::MaxDepthExceeded {
                    offset,
                    max: MAX_DECODE_DEPTH,
                });
            }
            let ctrl = self.read_control(offset)?;
            match ctrl.data_type {
                DataType::Pointer => {
                    let (target, _) = self.read_pointer(ctrl.size, ctrl.payload_offset)?;
                    offset = target as usize;
                    depth += 1;
                }
                DataType::String => {
                    let bytes = self.slice(ctrl.payload_offset, ctrl.size)?;
                    return std::str::from_utf8(bytes).map(str::to_string).map_err(|_| {
                        FormatError::InvalidUtf8 {
                            offset: ctrl.payload_offset,
                        }
                    });
                }
                other => {
                    return Err(FormatError::InvalidKeyType {
                        offset,
                        found: other.name(),
                    })
                }
            }
        }
    }

    fn resolve_value(
        &self,
        value: DataValue,
        origin: usize,
        depth: usize,
        budget: &mut usize,
    ) -> Result<DataValue, FormatError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(FormatError::MaxDepthExceeded {
                offset: origin,
                max: MAX_DECODE_DEPTH,
            });
        }

        match value {
            DataValue::Pointer(target) => {
                let target = target as usize;
                let (value, next) = self.decode_value(target, depth + 1)?;
                self.charge(budget, target, next)?;
                self.resolve_value(value, target, depth + 1, budget)
            }
            DataValue::Map(map) => {
                let mut resolved = HashMap::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key, self.resolve_value(value, origin, depth + 1, budget)?);
                }
                Ok(DataValue::Map(resolved))
            }
            DataValue::Array(array) => array
                .into_iter()
                .map(|v| self.resolve_value(v, origin, depth + 1, budget))
                .collect::<Result<Vec<_>, _>>()
                .map(DataValue::Array),
            other => Ok(other),
        }
    }

    /// Spend the bytes of one decoded value against the resolve budget
    fn charge(&self, budget: &mut usize, offset: usize, next: usize) -> Result<(), FormatError> {
        let used = next.saturating_sub(offset).max(1);
        match budget.checked_sub(used) {
            Some(left) => {
                *budget = left;
                Ok(())
            }
            None => Err(FormatError::ResolveLimitExceeded {
                offset,
                limit: self.resolve_budget(),
            }),
        }
    }

    fn decode_size(&self, size_bits: u8, cursor: usize) -> Result<(usize, usize), FormatError> {
        match size_bits {
            0..=28 => Ok((size_bits as usize, cursor)),
            29 => {
                let b = self.read_byte(cursor)?;
                Ok((29 + b as usize, cursor + 1))
            }
            30 => {
                let bytes = self.slice(cursor, 2)?;
                let n = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
                Ok((285 + n, cursor + 2))
            }
            _ => {
                let bytes = self.slice(cursor, 3)?;
                let n = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize;
                Ok((65_821 + n, cursor + 3))
            }
        }
    }

    /// Big-endian unsigned integer of `size` bytes, at most `max` bytes wide
    fn read_uint(
        &self,
        offset: usize,
        cursor: usize,
        size: usize,
        max: usize,
        kind: &'static str,
    ) -> Result<u128, FormatError> {
        if size > max {
            return Err(FormatError::InvalidSize { offset, kind, size });
        }
        let bytes = self.slice(cursor, size)?;
        Ok(bytes.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b)))
    }

    fn fixed<const N: usize>(
        &self,
        offset: usize,
        cursor: usize,
        size: usize,
        kind: &'static str,
    ) -> Result<[u8; N], FormatError> {
        if size != N {
            return Err(FormatError::InvalidSize { offset, kind, size });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(cursor, N)?);
        Ok(out)
    }

    fn read_byte(&self, offset: usize) -> Result<u8, FormatError> {
        self.slice(offset, 1).map(|b| b[0])
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], FormatError> {
        let available = self.buffer.len().saturating_sub(offset);
        match offset.checked_add(len) {
            Some(end) if end <= self.buffer.len() => Ok(&self.buffer[offset..end]),
            _ => Err(FormatError::TruncatedRecord {
                offset,
                needed: len,
                available,
            }),
        }
    }
}
