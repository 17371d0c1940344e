//! ipmeta - Read-only MaxMind DB (MMDB) reader
//!
//! ipmeta opens MMDB images (GeoIP2, GeoLite2, DB-IP and compatible files),
//! resolves IPv4 and IPv6 addresses through the binary search tree, and
//! decodes the associated records from the data section.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ipmeta::Database;
//!
//! let db = Database::open("GeoLite2-Country.mmdb")?;
//!
//! if let Some(result) = db.lookup_str("81.2.69.160")? {
//!     println!("/{}: {:?}", result.prefix_len, result.data.get("country"));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Typed records are available for the common GeoIP2 database kinds:
//!
//! ```rust,no_run
//! use ipmeta::geoip2::{AnonymousIp, Reader};
//!
//! let reader = Reader::<AnonymousIp>::open("GeoIP2-Anonymous-IP.mmdb")?;
//! let flags = reader.lookup("1.2.0.1".parse()?)?.unwrap_or_default();
//! println!("tor exit node: {}", flags.is_tor_exit_node);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  1. Search tree (node_count nodes)   │
//! │  2. 16 zero bytes                    │
//! │  3. Data section                     │
//! │  4. "\xAB\xCD\xEFMaxMind.com"        │
//! │  5. Metadata map                     │
//! └──────────────────────────────────────┘
//! ```
//!
//! Images are never modified. A [`Database`] is `Send + Sync` and can be
//! shared across threads for concurrent lookups.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Data section decoding
pub mod data_section;
/// Validated database handle
pub mod database;
/// Error types
pub mod error;
/// Typed GeoIP2 records
pub mod geoip2;
/// MMDB layout: metadata, search tree
pub mod mmdb;

// Re-exports for Rust consumers

pub use crate::database::{Database, QueryResult};

/// Decoded value types
pub use crate::data_section::{DataDecoder, DataValue, MAX_DECODE_DEPTH, RESOLVE_BUDGET_FACTOR};

pub use crate::error::{ConfigError, Error, FieldError, FormatError, LookupError, Result};

pub use crate::mmdb::{decode_at, load_metadata, resolve_offset, IpVersion, Metadata, RecordSize};

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
