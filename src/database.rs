//! Database handle
//!
//! [`Database`] owns an MMDB image for its whole lifetime, validates the
//! layout once at open, and answers any number of lookups. The image is
//! never mutated, so a `Database` can be shared across threads behind an
//! `Arc` with no locking.

use crate::data_section::{DataDecoder, DataValue};
use crate::error::{FormatError, LookupError, Result};
use crate::mmdb::{find_metadata_marker, LookupResult, Metadata, SearchTree, TreeHeader, METADATA_MARKER};
use memmap2::Mmap;
use std::fs::File;
use std::net::IpAddr;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

/// Result of a successful IP lookup
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// The data associated with this IP, with every pointer resolved
    pub data: DataValue,
    /// Network prefix length (CIDR)
    pub prefix_len: u8,
}

/// Storage for database data - owned, shared, or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Shared(a) => a,
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// A loaded, validated MMDB image
///
/// # Examples
///
/// ```no_run
/// use ipmeta::Database;
///
/// let db = Database::open("GeoLite2-Country.mmdb")?;
/// println!("type: {}", db.database_type());
///
/// if let Some(result) = db.lookup("8.8.8.8".parse()?)? {
///     println!("/{} -> {:?}", result.prefix_len, result.data);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Database {
    data: DatabaseStorage,
    metadata: Metadata,
    tree: TreeHeader,
    data_section: Range<usize>,
}

impl Database {
    /// Open a database file using memory mapping
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // SAFETY: the mapping is read-only and owned by the Database. Callers
        // must not truncate or rewrite the file while it is open.
        let mmap = unsafe { Mmap::map(&file) }?;

        tracing::debug!(path = %path.display(), len = mmap.len(), "mapped database file");
        Self::from_storage(DatabaseStorage::Mmap(mmap))
    }

    /// Create database from an owned buffer
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(DatabaseStorage::Owned(data))
    }

    /// Create database from a reference-counted buffer shared with others
    pub fn from_shared(data: Arc<[u8]>) -> Result<Self> {
        Self::from_storage(DatabaseStorage::Shared(data))
    }

    fn from_storage(storage: DatabaseStorage) -> Result<Self> {
        let data = storage.as_slice();

        let marker_offset = find_metadata_marker(data)?;
        let metadata = Metadata::from_section(&data[marker_offset + METADATA_MARKER.len()..])?;
        let tree = TreeHeader::new(data, &metadata, marker_offset)?;
        let data_section = metadata.data_section_start()..marker_offset;

        tracing::debug!(
            database_type = %metadata.database_type,
            node_count = metadata.node_count,
            record_size = metadata.record_size.bits(),
            ip_version = ?metadata.ip_version,
            tree_size = tree.tree_size,
            data_section_len = data_section.len(),
            "opened database"
        );

        Ok(Self {
            data: storage,
            metadata,
            tree,
            data_section,
        })
    }

    /// Decoded metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Database type string, e.g. "GeoIP2-Country"
    pub fn database_type(&self) -> &str {
        &self.metadata.database_type
    }

    /// The whole image
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// The data section (offsets from lookups are relative to its start)
    pub fn data_section(&self) -> &[u8] {
        &self.data.as_slice()[self.data_section.clone()]
    }

    /// Decoder over the data section
    pub fn decoder(&self) -> DataDecoder<'_> {
        DataDecoder::new(self.data_section())
    }

    /// Walk the search tree for `ip`, returning the data offset and prefix
    pub fn lookup_offset(&self, ip: IpAddr) -> Result<Option<LookupResult>> {
        SearchTree::new(self.as_bytes(), &self.tree).lookup(ip)
    }

    /// Walk the search tree for `ip`, returning only the data offset
    pub fn resolve_offset(&self, ip: IpAddr) -> Result<Option<usize>> {
        Ok(self.lookup_offset(ip)?.map(|r| r.data_offset))
    }

    /// Decode one value in the data section without following pointers
    pub fn decode_at(&self, offset: usize) -> std::result::Result<(DataValue, usize), FormatError> {
        self.decoder().decode(offset)
    }

    /// Look up an IP address and decode its record
    ///
    /// Pointers are followed at every level, so the returned value never
    /// contains [`DataValue::Pointer`].
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<QueryResult>> {
        let Some(found) = self.lookup_offset(ip)? else {
            return Ok(None);
        };
        let data = self.decoder().decode_resolved(found.data_offset)?;
        Ok(Some(QueryResult {
            data,
            prefix_len: found.prefix_len,
        }))
    }

    /// Look up an address given as text
    pub fn lookup_str(&self, ip: &str) -> Result<Option<QueryResult>> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| LookupError::Unparseable(ip.to_string()))?;
        self.lookup(addr)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("database_type", &self.metadata.database_type)
            .field("node_count", &self.metadata.node_count)
            .field("len", &self.as_bytes().len())
            .finish()
    }
}
