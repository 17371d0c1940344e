//! MMDB Search Tree Traversal
//!
//! Implements binary search tree traversal for IP address lookups.
//! The tree uses a compact binary representation where each node contains
//! two records (left and right) that point to either:
//! - Another node (record < node_count)
//! - The "no data" marker (record == node_count)
//! - A data section offset (record > node_count)
//!
//! Nodes are never materialized; records are read on demand by offset
//! arithmetic, so a lookup costs at most one record read per address bit.

use super::format::Metadata;
use super::types::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::error::{FormatError, LookupError, Result};
use std::net::{IpAddr, Ipv4Addr};

/// Number of leading zero bits that lead to the IPv4 subtree of an IPv6 tree
const IPV4_SUBTREE_DEPTH: u8 = 96;

/// Result of an IP lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupResult {
    /// Offset into the data section (relative to data section start)
    pub data_offset: usize,
    /// Network prefix length (relative to IPv4 for IPv4 lookups)
    pub prefix_len: u8,
}

/// Search tree parameters, validated against the image
///
/// Cheap to copy; a database computes it once at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32)
    pub record_size: RecordSize,
    /// IP version the tree was built for
    pub ip_version: IpVersion,
    /// Size of the search tree in bytes
    pub tree_size: usize,
    /// Record reached after the ::/96 prefix (root for IPv4 trees)
    ipv4_start: u32,
    /// Bits consumed to reach `ipv4_start`
    ipv4_start_depth: u8,
}

impl TreeHeader {
    /// Validate the tree described by `metadata` against `data`
    ///
    /// The tree and its 16-byte separator must end at or before `limit`
    /// (the metadata marker offset, or the image length).
    pub fn new(data: &[u8], metadata: &Metadata, limit: usize) -> std::result::Result<Self, FormatError> {
        let tree_size = metadata.search_tree_size();
        let limit = limit.min(data.len());
        if tree_size + DATA_SECTION_SEPARATOR_SIZE > limit {
            return Err(FormatError::SearchTreeOutOfBounds {
                node_count: metadata.node_count,
                tree_size,
                metadata_start: limit,
            });
        }

        let mut header = TreeHeader {
            node_count: metadata.node_count,
            record_size: metadata.record_size,
            ip_version: metadata.ip_version,
            tree_size,
            ipv4_start: 0,
            ipv4_start_depth: 0,
        };

        if header.ip_version == IpVersion::V6 {
            let tree = SearchTree::new(data, &header);
            let (node, depth) = tree.find_ipv4_start()?;
            header.ipv4_start = node;
            header.ipv4_start_depth = depth;
        }

        Ok(header)
    }
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    /// The raw file data containing the tree
    data: &'a [u8],
    /// Validated header information
    header: &'a TreeHeader,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(data: &'a [u8], header: &'a TreeHeader) -> Self {
        Self { data, header }
    }

    /// Look up an IP address
    ///
    /// Returns `Ok(None)` when the tree has no data for the address.
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<LookupResult>> {
        match ip {
            IpAddr::V4(addr) => Ok(self.lookup_v4(addr)?),
            IpAddr::V6(addr) => match self.header.ip_version {
                IpVersion::V6 => Ok(self.finish(0, 0, u128::from(addr), 128)?),
                IpVersion::V4 => match addr.to_ipv4_mapped() {
                    Some(v4) => Ok(self.lookup_v4(v4)?),
                    None => Err(LookupError::InvalidAddress(ip).into()),
                },
            },
        }
    }

    /// Look up an IPv4 address
    pub fn lookup_v4(
        &self,
        addr: Ipv4Addr,
    ) -> std::result::Result<Option<LookupResult>, FormatError> {
        let bits = u128::from(u32::from(addr));
        let result = self.finish(
            self.header.ipv4_start,
            self.header.ipv4_start_depth,
            bits,
            32,
        )?;

        // Report the prefix relative to IPv4 rather than the ::/96 subtree
        Ok(result.map(|r| LookupResult {
            prefix_len: r.prefix_len.saturating_sub(match self.header.ip_version {
                IpVersion::V4 => 0,
                IpVersion::V6 => IPV4_SUBTREE_DEPTH,
            }),
            ..r
        }))
    }

    /// Walk `bit_count` bits of `bits` (most significant first) from `node`
    fn finish(
        &self,
        start: u32,
        start_depth: u8,
        bits: u128,
        bit_count: usize,
    ) -> std::result::Result<Option<LookupResult>, FormatError> {
        let node_count = self.header.node_count;
        let mut node = start;
        let mut consumed = 0usize;

        while consumed < bit_count && node < node_count {
            let bit = ((bits >> (bit_count - 1 - consumed)) & 1) as u8;
            node = self.read_record(node, bit)?;
            consumed += 1;
        }

        let prefix_len = start_depth.saturating_add(consumed as u8);
        if node == node_count {
            tracing::trace!(prefix_len, "no data for address");
            Ok(None)
        } else if node > node_count {
            let data_offset = self.calculate_data_offset(node)?;
            tracing::trace!(data_offset, prefix_len, "resolved address");
            Ok(Some(LookupResult {
                data_offset,
                prefix_len,
            }))
        } else {
            Err(FormatError::IncompleteLookupPath { node })
        }
    }

    /// Read a record from a node
    ///
    /// Each node contains two records. `side` determines which:
    /// - 0 = left record (for IP bit 0)
    /// - 1 = right record (for IP bit 1)
    fn read_record(&self, node: u32, side: u8) -> std::result::Result<u32, FormatError> {
        let node_bytes = self.header.record_size.node_bytes();
        let offset = node as usize * node_bytes;
        let bytes = self
            .data
            .get(offset..offset + node_bytes)
            .filter(|_| offset + node_bytes <= self.header.tree_size)
            .ok_or(FormatError::TruncatedRecord {
                offset,
                needed: node_bytes,
                available: self.header.tree_size.saturating_sub(offset),
            })?;

        Ok(match self.header.record_size {
            RecordSize::Bits24 => {
                let b = &bytes[side as usize * 3..side as usize * 3 + 3];
                u32::from_be_bytes([0, b[0], b[1], b[2]])
            }
            // Layout: [left low 24 bits][left high nibble | right high nibble][right low 24 bits]
            RecordSize::Bits28 => {
                if side == 0 {
                    let high = u32::from(bytes[3] >> 4);
                    (high << 24) | u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
                } else {
                    let high = u32::from(bytes[3] & 0x0F);
                    (high << 24) | u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]])
                }
            }
            RecordSize::Bits32 => {
                let b = &bytes[side as usize * 4..side as usize * 4 + 4];
                u32::from_be_bytes([b[0], b[1], b[2], b[3]])
            }
        })
    }

    /// Calculate data section offset from record value
    ///
    /// data_offset = (record - node_count) - 16; the 16 is the separator
    fn calculate_data_offset(&self, record: u32) -> std::result::Result<usize, FormatError> {
        (record as usize)
            .checked_sub(self.header.node_count as usize)
            .and_then(|n| n.checked_sub(DATA_SECTION_SEPARATOR_SIZE))
            .ok_or(FormatError::InvalidSearchTreeRecord {
                record,
                node_count: self.header.node_count,
            })
    }

    /// Follow 96 zero bits from the root to reach the IPv4 subtree
    ///
    /// Stops early if a terminal record is reached; every IPv4 lookup then
    /// resolves to that record.
    fn find_ipv4_start(&self) -> std::result::Result<(u32, u8), FormatError> {
        let mut node = 0u32;
        let mut depth = 0u8;
        while depth < IPV4_SUBTREE_DEPTH && node < self.header.node_count {
            node = self.read_record(node, 0)?;
            depth += 1;
        }
        Ok((node, depth))
    }
}
