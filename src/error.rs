//! Error types for the ipmeta library
//!
//! Errors are split by who is at fault:
//! - [`FormatError`]: the database bytes are malformed or adversarial
//! - [`FieldError`]: the bytes decode fine but have an unexpected shape
//! - [`LookupError`]: the caller supplied an address the tree cannot answer
//! - [`ConfigError`]: the database is not of an accepted kind
//!
//! Everything is recoverable; nothing in the library aborts the process.

use std::net::IpAddr;

/// Result type alias for ipmeta operations
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed database bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// A value, size extension or pointer extends past the end of its buffer
    #[error("record truncated at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Offset the read started at
        offset: usize,
        /// Bytes the encoding asked for
        needed: usize,
        /// Bytes left in the buffer from `offset`
        available: usize,
    },

    /// The `\xAB\xCD\xEFMaxMind.com` marker is absent from the tail of the file
    #[error("metadata marker not found")]
    MetadataNotFound,

    /// The metadata map lacks a required key
    #[error("metadata is missing required field '{0}'")]
    MissingRequiredField(&'static str),

    /// A metadata field decoded to the wrong kind of value
    #[error("metadata field '{field}' should be {expected}, found {found}")]
    InvalidFieldType {
        /// Metadata key
        field: &'static str,
        /// Kind the reader needs
        expected: &'static str,
        /// Kind actually decoded
        found: &'static str,
    },

    /// A string payload is not valid UTF-8
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the string payload
        offset: usize,
    },

    /// A map key decoded to something other than a string
    #[error("map key at offset {offset} should be a string, found {found}")]
    InvalidKeyType {
        /// Offset of the key's control byte
        offset: usize,
        /// Kind actually decoded
        found: &'static str,
    },

    /// Every address bit was consumed without reaching a terminal record
    #[error("lookup path ended at node {node} without reaching a terminal record")]
    IncompleteLookupPath {
        /// Node index the walk stopped at
        node: u32,
    },

    /// Nesting and pointer following went deeper than the decoder allows
    #[error("maximum decode depth {max} exceeded at offset {offset}")]
    MaxDepthExceeded {
        /// Offset being decoded when the limit was hit
        offset: usize,
        /// The configured limit
        max: usize,
    },

    /// Following pointers would decode more data than the section can justify
    #[error("pointer resolution exceeded {limit} decoded bytes at offset {offset}")]
    ResolveLimitExceeded {
        /// Offset being resolved when the limit was hit
        offset: usize,
        /// Bytes one resolving call may decode
        limit: usize,
    },

    /// The control byte names a reserved or unknown type
    #[error("invalid data type {type_id} at offset {offset}")]
    InvalidType {
        /// Offset of the control byte
        offset: usize,
        /// The raw type number (extended types are 8 and above)
        type_id: u8,
    },

    /// A fixed-width value declares a width its type cannot have
    #[error("invalid size {size} for {kind} at offset {offset}")]
    InvalidSize {
        /// Offset of the control byte
        offset: usize,
        /// Type name
        kind: &'static str,
        /// Declared size
        size: usize,
    },

    /// Record size in the metadata is not 24, 28 or 32
    #[error("invalid record size: {0} bits")]
    InvalidRecordSize(u64),

    /// IP version in the metadata is not 4 or 6
    #[error("invalid IP version: {0}")]
    InvalidIpVersion(u64),

    /// The search tree plus separator runs into the metadata section
    #[error(
        "search tree of {node_count} nodes ({tree_size} bytes) does not fit before metadata at {metadata_start}"
    )]
    SearchTreeOutOfBounds {
        /// Node count from the metadata
        node_count: u32,
        /// Computed search tree size in bytes
        tree_size: usize,
        /// Offset of the metadata marker
        metadata_start: usize,
    },

    /// A terminal record points into the data section separator
    #[error("search tree record {record} is not a valid data pointer (node_count = {node_count})")]
    InvalidSearchTreeRecord {
        /// Raw record value
        record: u32,
        /// Node count from the metadata
        node_count: u32,
    },
}

/// Structurally valid data with an unexpected shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// A known key holds the wrong kind of value
    #[error("field '{field}' should be {expected}, found {found}")]
    UnexpectedType {
        /// Key being projected
        field: String,
        /// Kind the projection needs
        expected: &'static str,
        /// Kind actually decoded
        found: &'static str,
    },

    /// A top-level pointer resolved to something other than a map
    #[error("pointer at offset {offset} targets {found} at {target}, expected map")]
    InvalidPointerTarget {
        /// Offset of the pointer's control byte
        offset: usize,
        /// Pointer target
        target: usize,
        /// Kind found at the target
        found: &'static str,
    },

    /// A record is neither a map nor a pointer to one
    #[error("record at offset {offset} is {found}, expected map or pointer to map")]
    UnsupportedTopLevelType {
        /// Offset of the record
        offset: usize,
        /// Kind found
        found: &'static str,
    },
}

/// The caller's address cannot be looked up in this tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// IPv6 address against an IPv4-only tree
    #[error("cannot look up {0} in an IPv4-only database")]
    InvalidAddress(IpAddr),

    /// Text that does not parse as an IP address
    #[error("'{0}' is not a valid IP address")]
    Unparseable(String),
}

/// The database is not one the reader was configured to accept
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Metadata `database_type` is not in the allowlist
    #[error("unexpected database type '{found}' (expected one of: {})", expected.join(", "))]
    UnexpectedDatabaseType {
        /// Type from the metadata
        found: String,
        /// Accepted types
        expected: Vec<String>,
    },
}

/// Main error type for ipmeta operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed database bytes
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Unexpected record shape
    #[error("field error: {0}")]
    Field(#[from] FieldError),

    /// Bad lookup address
    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Wrong kind of database
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors while opening a database file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
