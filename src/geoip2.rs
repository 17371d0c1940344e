//! Typed GeoIP2 records
//!
//! Projects decoded data-section maps onto fixed result shapes. Every
//! database kind follows the same steps:
//!
//! 1. resolve the address to a data offset
//! 2. [`resolve_to_map`]: decode the record, following one top-level pointer
//! 3. pull the known keys out with a [`FieldReader`]; unknown keys are ignored
//!
//! ```no_run
//! use ipmeta::geoip2::{CountryResult, Reader};
//!
//! let reader = Reader::<CountryResult>::open("GeoLite2-Country.mmdb")?;
//! if let Some(result) = reader.lookup("81.2.69.160".parse()?)? {
//!     println!("{}", result.country.iso_code);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::data_section::{DataDecoder, DataValue};
use crate::database::Database;
use crate::error::{ConfigError, FieldError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::net::IpAddr;
use std::path::Path;

/// Decode the record at `offset` and require a map
///
/// A top-level pointer is followed exactly once; its target must be a map.
pub fn resolve_to_map(
    decoder: &DataDecoder<'_>,
    offset: usize,
) -> Result<HashMap<String, DataValue>> {
    match decoder.decode(offset)?.0 {
        DataValue::Map(map) => Ok(map),
        DataValue::Pointer(target) => match decoder.decode(target as usize)?.0 {
            DataValue::Map(map) => Ok(map),
            other => Err(FieldError::InvalidPointerTarget {
                offset,
                target: target as usize,
                found: other.kind(),
            }
            .into()),
        },
        other => Err(FieldError::UnsupportedTopLevelType {
            offset,
            found: other.kind(),
        }
        .into()),
    }
}

/// A result shape that can be filled from a decoded map
pub trait Project: Sized {
    /// Pull this shape's known keys out of `fields`
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self>;
}

/// A top-level record stored in a particular kind of database
pub trait DatabaseRecord: Project {
    /// Database types accepted by default
    const DATABASE_TYPES: &'static [&'static str];
}

/// Typed access to the entries of one decoded map
///
/// Values that are pointers are resolved through the decoder before their
/// type is checked. Absent keys yield the type's default.
pub struct FieldReader<'d, 'a> {
    decoder: &'d DataDecoder<'a>,
    map: HashMap<String, DataValue>,
    path: String,
}

impl<'d, 'a> FieldReader<'d, 'a> {
    /// Wrap a decoded map; `path` prefixes field names in errors
    pub fn new(decoder: &'d DataDecoder<'a>, map: HashMap<String, DataValue>, path: &str) -> Self {
        Self {
            decoder,
            map,
            path: path.to_string(),
        }
    }

    fn field_name(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn unexpected(&self, key: &str, expected: &'static str, found: &DataValue) -> FieldError {
        FieldError::UnexpectedType {
            field: self.field_name(key),
            expected,
            found: found.kind(),
        }
    }

    fn take(&mut self, key: &str) -> Result<Option<DataValue>> {
        match self.map.remove(key) {
            Some(value @ DataValue::Pointer(_)) => Ok(Some(self.decoder.resolve(value)?)),
            other => Ok(other),
        }
    }

    /// A UTF-8 string field
    pub fn string(&mut self, key: &str) -> Result<String> {
        match self.take(key)? {
            None => Ok(String::new()),
            Some(DataValue::String(s)) => Ok(s),
            Some(other) => Err(self.unexpected(key, "string", &other).into()),
        }
    }

    /// A boolean field
    pub fn boolean(&mut self, key: &str) -> Result<bool> {
        match self.take(key)? {
            None => Ok(false),
            Some(DataValue::Bool(b)) => Ok(b),
            Some(other) => Err(self.unexpected(key, "boolean", &other).into()),
        }
    }

    /// An unsigned integer field that must fit in 32 bits
    pub fn uint32(&mut self, key: &str) -> Result<u32> {
        match self.take(key)? {
            None => Ok(0),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| self.unexpected(key, "uint32", &value).into()),
        }
    }

    /// A map of language code to localized name
    pub fn names(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let map = match self.take(key)? {
            None => return Ok(HashMap::new()),
            Some(DataValue::Map(map)) => map,
            Some(other) => return Err(self.unexpected(key, "map", &other).into()),
        };

        let mut names = FieldReader::new(self.decoder, map, &self.field_name(key));
        let langs: Vec<String> = names.map.keys().cloned().collect();
        langs
            .into_iter()
            .map(|lang| {
                let name = names.string(&lang)?;
                Ok((lang, name))
            })
            .collect()
    }

    /// A nested structure
    pub fn nested<T: Project + Default>(&mut self, key: &str) -> Result<T> {
        match self.take(key)? {
            None => Ok(T::default()),
            Some(DataValue::Map(map)) => {
                let mut inner = FieldReader::new(self.decoder, map, &self.field_name(key));
                T::project(&mut inner)
            }
            Some(other) => Err(self.unexpected(key, "map", &other).into()),
        }
    }
}

/// Decode and project the record at `offset`
pub fn project_at<T: Project>(decoder: &DataDecoder<'_>, offset: usize) -> Result<T> {
    let map = resolve_to_map(decoder, offset)?;
    T::project(&mut FieldReader::new(decoder, map, ""))
}

/// Continent block of a country record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Continent {
    /// Two-letter continent code
    pub code: String,
    /// GeoNames identifier
    pub geoname_id: u32,
    /// Localized names
    pub names: HashMap<String, String>,
}

impl Project for Continent {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(Continent {
            code: fields.string("code")?,
            geoname_id: fields.uint32("geoname_id")?,
            names: fields.names("names")?,
        })
    }
}

/// Country, registered country, or represented country block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Country {
    /// GeoNames identifier
    pub geoname_id: u32,
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    /// Member of the European Union
    pub is_in_european_union: bool,
    /// Localized names
    pub names: HashMap<String, String>,
    /// Represented country type, e.g. "military"
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub represented_type: String,
}

impl Project for Country {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(Country {
            geoname_id: fields.uint32("geoname_id")?,
            iso_code: fields.string("iso_code")?,
            is_in_european_union: fields.boolean("is_in_european_union")?,
            names: fields.names("names")?,
            represented_type: fields.string("type")?,
        })
    }
}

/// Network traits of a country record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Traits {
    /// Anonymous proxy (deprecated by MaxMind, still populated)
    pub is_anonymous_proxy: bool,
    /// Anycast network
    pub is_anycast: bool,
    /// Satellite internet provider
    pub is_satellite_provider: bool,
}

impl Project for Traits {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(Traits {
            is_anonymous_proxy: fields.boolean("is_anonymous_proxy")?,
            is_anycast: fields.boolean("is_anycast")?,
            is_satellite_provider: fields.boolean("is_satellite_provider")?,
        })
    }
}

/// Record of a *-Country database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountryResult {
    /// Continent
    pub continent: Continent,
    /// Country where the address is located
    pub country: Country,
    /// Country the ISP registered the network in
    pub registered_country: Country,
    /// Country represented by users of the address (e.g. embassies)
    pub represented_country: Country,
    /// Network traits
    pub traits: Traits,
}

impl Project for CountryResult {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(CountryResult {
            continent: fields.nested("continent")?,
            country: fields.nested("country")?,
            registered_country: fields.nested("registered_country")?,
            represented_country: fields.nested("represented_country")?,
            traits: fields.nested("traits")?,
        })
    }
}

impl DatabaseRecord for CountryResult {
    const DATABASE_TYPES: &'static [&'static str] = &[
        "GeoIP2-Country",
        "GeoLite2-Country",
        "Geoacumen-Country",
        "DBIP-Country",
        "DBIP-Country-Lite",
    ];
}

/// Record of a GeoIP2-Anonymous-IP database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnonymousIp {
    /// Any of the flags below
    pub is_anonymous: bool,
    /// Commercial VPN
    pub is_anonymous_vpn: bool,
    /// Hosting or VPN provider
    pub is_hosting_provider: bool,
    /// Public proxy
    pub is_public_proxy: bool,
    /// Tor exit node
    pub is_tor_exit_node: bool,
    /// Residential proxy
    pub is_residential_proxy: bool,
}

impl Project for AnonymousIp {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(AnonymousIp {
            is_anonymous: fields.boolean("is_anonymous")?,
            is_anonymous_vpn: fields.boolean("is_anonymous_vpn")?,
            is_hosting_provider: fields.boolean("is_hosting_provider")?,
            is_public_proxy: fields.boolean("is_public_proxy")?,
            is_tor_exit_node: fields.boolean("is_tor_exit_node")?,
            is_residential_proxy: fields.boolean("is_residential_proxy")?,
        })
    }
}

impl DatabaseRecord for AnonymousIp {
    const DATABASE_TYPES: &'static [&'static str] = &["GeoIP2-Anonymous-IP"];
}

/// Record of a GeoIP2-Connection-Type database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionType {
    /// "Dialup", "Cable/DSL", "Corporate", "Cellular" or "Satellite"
    pub connection_type: String,
}

impl Project for ConnectionType {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(ConnectionType {
            connection_type: fields.string("connection_type")?,
        })
    }
}

impl DatabaseRecord for ConnectionType {
    const DATABASE_TYPES: &'static [&'static str] = &["GeoIP2-Connection-Type"];
}

/// Record of a GeoIP2-Domain database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Domain {
    /// Second-level domain of the address's reverse DNS
    pub domain: String,
}

impl Project for Domain {
    fn project(fields: &mut FieldReader<'_, '_>) -> Result<Self> {
        Ok(Domain {
            domain: fields.string("domain")?,
        })
    }
}

impl DatabaseRecord for Domain {
    const DATABASE_TYPES: &'static [&'static str] = &["GeoIP2-Domain"];
}

/// Database handle that yields typed records
///
/// The database type is checked against an allowlist at construction.
pub struct Reader<T> {
    db: Database,
    _record: PhantomData<fn() -> T>,
}

impl<T: DatabaseRecord> Reader<T> {
    /// Accept databases whose type is in `T::DATABASE_TYPES`
    pub fn new(db: Database) -> Result<Self> {
        Self::with_types(db, T::DATABASE_TYPES)
    }

    /// Accept databases with a custom set of types
    ///
    /// Only the fields of `T` are read; it is up to the caller to pick
    /// databases that provide a compatible selection of fields.
    pub fn with_types(db: Database, expected: &[&str]) -> Result<Self> {
        if !expected.contains(&db.database_type()) {
            return Err(ConfigError::UnexpectedDatabaseType {
                found: db.database_type().to_string(),
                expected: expected.iter().map(|s| s.to_string()).collect(),
            }
            .into());
        }
        Ok(Self {
            db,
            _record: PhantomData,
        })
    }

    /// Memory-map a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Database::open(path)?)
    }

    /// Load from an owned buffer
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::new(Database::from_bytes(data)?)
    }

    /// Look up the record for `ip`
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<T>> {
        match self.db.resolve_offset(ip)? {
            None => Ok(None),
            Some(offset) => project_at(&self.db.decoder(), offset).map(Some),
        }
    }

    /// Look up the record for `ip` along with the prefix length of its network
    pub fn lookup_with_prefix(&self, ip: IpAddr) -> Result<Option<(T, u8)>> {
        let Some(found) = self.db.lookup_offset(ip)? else {
            return Ok(None);
        };
        let record = project_at(&self.db.decoder(), found.data_offset)?;
        Ok(Some((record, found.prefix_len)))
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }
}
