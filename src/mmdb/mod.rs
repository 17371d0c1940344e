//! MaxMind DB (MMDB) Reader Core
//!
//! The MMDB format uses a binary search tree for IP address lookups.
//! Data is stored in the MMDB data section format, decoded by
//! [`crate::data_section::DataDecoder`].
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific types and constants
//! - **format**: Metadata marker search and metadata projection
//! - **tree**: Search tree traversal for IP lookups
//!
//! The free functions here are stateless: they take the full image on every
//! call. [`crate::Database`] validates the layout once and should be
//! preferred for repeated lookups.

pub mod format;
pub mod tree;
pub mod types;

// Re-export key types
pub use format::{find_metadata_marker, Metadata};
pub use tree::{LookupResult, SearchTree, TreeHeader};
pub use types::{IpVersion, RecordSize, METADATA_MARKER};

use crate::data_section::{DataDecoder, DataValue};
use crate::error::{FormatError, Result};
use std::net::IpAddr;

/// Locate and decode the metadata of a full database image
pub fn load_metadata(buffer: &[u8]) -> std::result::Result<Metadata, FormatError> {
    Metadata::from_bytes(buffer)
}

/// Resolve `ip` to an offset into the data section of `buffer`
///
/// `Ok(None)` means the tree holds no data for the address.
pub fn resolve_offset(buffer: &[u8], metadata: &Metadata, ip: IpAddr) -> Result<Option<usize>> {
    let header = TreeHeader::new(buffer, metadata, buffer.len())?;
    let tree = SearchTree::new(buffer, &header);
    Ok(tree.lookup(ip)?.map(|r| r.data_offset))
}

/// Decode one value at `offset` within a data section
///
/// `data_section` must start at the data section (the offsets returned by
/// [`resolve_offset`] and pointer targets are relative to it). Returns the
/// value and the offset just past it.
pub fn decode_at(
    data_section: &[u8],
    offset: usize,
) -> std::result::Result<(DataValue, usize), FormatError> {
    DataDecoder::new(data_section).decode(offset)
}
