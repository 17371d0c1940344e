//! MMDB Binary Format Parsing
//!
//! Locates the metadata section and projects it into [`Metadata`].
//!
//! Layout of an image:
//!
//! ```text
//! [search tree][16 zero bytes][data section]["\xAB\xCD\xEFMaxMind.com"][metadata map]
//! ```
//!
//! The metadata start is not recorded anywhere, so the marker is found by
//! searching backward from the end of the file.

use super::types::{
    IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER, METADATA_SEARCH_WINDOW,
};
use crate::data_section::{DataDecoder, DataValue};
use crate::error::FormatError;
use std::collections::HashMap;

/// Decoded metadata section
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Metadata {
    /// Format major version (2 for every current database)
    pub binary_format_major_version: u16,
    /// Format minor version
    pub binary_format_minor_version: u16,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    #[serde(serialize_with = "serialize_record_size")]
    pub record_size: RecordSize,
    /// IP version the tree was built for
    #[serde(serialize_with = "serialize_ip_version")]
    pub ip_version: IpVersion,
    /// Database type, e.g. "GeoIP2-Country"
    pub database_type: String,
    /// Locale codes the database may have names for
    pub languages: Vec<String>,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Description by language code
    pub description: HashMap<String, String>,
}

impl Metadata {
    /// Locate and decode the metadata section of a full database image
    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let marker_offset = find_metadata_marker(data)?;
        Self::from_section(&data[marker_offset + METADATA_MARKER.len()..])
    }

    /// Decode the metadata map that follows the marker
    pub fn from_section(section: &[u8]) -> Result<Self, FormatError> {
        // Pointers inside the metadata are relative to the section start
        let decoder = DataDecoder::new(section);
        let value = decoder.decode_resolved(0)?;
        Self::from_value(&value)
    }

    /// Project a decoded metadata map
    pub fn from_value(value: &DataValue) -> Result<Self, FormatError> {
        let map = match value {
            DataValue::Map(map) => map,
            other => {
                return Err(FormatError::InvalidFieldType {
                    field: "metadata",
                    expected: "map",
                    found: other.kind(),
                })
            }
        };

        let node_count = required_uint(map, "node_count")?;
        let node_count = u32::try_from(node_count).map_err(|_| FormatError::InvalidFieldType {
            field: "node_count",
            expected: "unsigned integer below 2^32",
            found: "uint64",
        })?;
        let record_size = RecordSize::from_bits(required_uint(map, "record_size")?)?;
        let ip_version = IpVersion::from_number(required_uint(map, "ip_version")?)?;
        let database_type = match map.get("database_type") {
            Some(DataValue::String(s)) => s.clone(),
            Some(other) => return Err(type_mismatch("database_type", "string", other)),
            None => return Err(FormatError::MissingRequiredField("database_type")),
        };

        Ok(Metadata {
            binary_format_major_version: optional_u16(map, "binary_format_major_version")?,
            binary_format_minor_version: optional_u16(map, "binary_format_minor_version")?,
            node_count,
            record_size,
            ip_version,
            database_type,
            languages: optional_languages(map)?,
            build_epoch: optional_uint(map, "build_epoch")?.unwrap_or(0),
            description: optional_description(map)?,
        })
    }

    /// Size of the search tree in bytes
    pub fn search_tree_size(&self) -> usize {
        self.node_count as usize * self.record_size.node_bytes()
    }

    /// Offset of the data section within the image
    pub fn data_section_start(&self) -> usize {
        self.search_tree_size() + DATA_SECTION_SEPARATOR_SIZE
    }
}

/// Find the metadata marker, returning the offset of its first byte
///
/// Only the last [`METADATA_SEARCH_WINDOW`] bytes are searched. When the
/// marker occurs more than once the last occurrence wins.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize, FormatError> {
    let search_start = data.len().saturating_sub(METADATA_SEARCH_WINDOW);
    let offset = memchr::memmem::rfind(&data[search_start..], METADATA_MARKER)
        .map(|pos| search_start + pos)
        .ok_or(FormatError::MetadataNotFound)?;

    tracing::debug!(offset, file_len = data.len(), "found metadata marker");
    Ok(offset)
}

fn type_mismatch(field: &'static str, expected: &'static str, found: &DataValue) -> FormatError {
    FormatError::InvalidFieldType {
        field,
        expected,
        found: found.kind(),
    }
}

fn optional_uint(
    map: &HashMap<String, DataValue>,
    field: &'static str,
) -> Result<Option<u64>, FormatError> {
    match map.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| type_mismatch(field, "unsigned integer", value)),
    }
}

fn required_uint(map: &HashMap<String, DataValue>, field: &'static str) -> Result<u64, FormatError> {
    optional_uint(map, field)?.ok_or(FormatError::MissingRequiredField(field))
}

fn optional_u16(map: &HashMap<String, DataValue>, field: &'static str) -> Result<u16, FormatError> {
    match optional_uint(map, field)? {
        None => Ok(0),
        Some(n) => u16::try_from(n).map_err(|_| FormatError::InvalidFieldType {
            field,
            expected: "uint16",
            found: "wider unsigned integer",
        }),
    }
}

fn optional_languages(map: &HashMap<String, DataValue>) -> Result<Vec<String>, FormatError> {
    let Some(value) = map.get("languages") else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| type_mismatch("languages", "array of strings", value))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| type_mismatch("languages", "array of strings", item))
        })
        .collect()
}

fn optional_description(
    map: &HashMap<String, DataValue>,
) -> Result<HashMap<String, String>, FormatError> {
    let Some(value) = map.get("description") else {
        return Ok(HashMap::new());
    };
    let entries = value
        .as_map()
        .ok_or_else(|| type_mismatch("description", "map of strings", value))?;
    entries
        .iter()
        .map(|(lang, text)| {
            text.as_str()
                .map(|t| (lang.clone(), t.to_string()))
                .ok_or_else(|| type_mismatch("description", "map of strings", text))
        })
        .collect()
}

fn serialize_record_size<S: serde::Serializer>(rs: &RecordSize, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(rs.bits())
}

fn serialize_ip_version<S: serde::Serializer>(v: &IpVersion, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(match v {
        IpVersion::V4 => 4,
        IpVersion::V6 => 6,
    })
}
