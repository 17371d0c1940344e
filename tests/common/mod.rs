//! Synthetic MMDB writer shared by the integration tests and benches
//!
//! Produces images byte-for-byte in the layout real MaxMind databases use:
//! search tree, 16-byte separator, data section, metadata marker, metadata.

#![allow(dead_code)]

use ipmeta::mmdb::{IpVersion, RecordSize, METADATA_MARKER};
use ipmeta::DataValue;
use std::collections::HashMap;
use std::net::IpAddr;

// Type ids
const POINTER: u8 = 1;
const STRING: u8 = 2;
const DOUBLE: u8 = 3;
const BYTES: u8 = 4;
const UINT16: u8 = 5;
const UINT32: u8 = 6;
const MAP: u8 = 7;
const INT32: u8 = 8;
const UINT64: u8 = 9;
const UINT128: u8 = 10;
const ARRAY: u8 = 11;
const BOOL: u8 = 14;
const FLOAT: u8 = 15;

/// Data section encoder
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Append raw bytes (for hand-crafted corrupt records)
    pub fn raw(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(bytes);
        offset
    }

    /// Encode `value`, returning the offset it starts at
    pub fn encode(&mut self, value: &DataValue) -> u32 {
        let offset = self.buf.len() as u32;
        self.write_value(value);
        offset
    }

    /// Encode a map whose keys are pointers to previously encoded strings
    pub fn encode_map_with_key_pointers(&mut self, entries: &[(u32, DataValue)]) -> u32 {
        let offset = self.buf.len() as u32;
        self.write_control(MAP, entries.len());
        for (key_offset, value) in entries {
            self.write_pointer(*key_offset);
            self.write_value(value);
        }
        offset
    }

    fn write_value(&mut self, value: &DataValue) {
        match value {
            DataValue::Pointer(target) => self.write_pointer(*target),
            DataValue::String(s) => {
                self.write_control(STRING, s.len());
                self.buf.extend_from_slice(s.as_bytes());
            }
            DataValue::Double(d) => {
                self.write_control(DOUBLE, 8);
                self.buf.extend_from_slice(&d.to_be_bytes());
            }
            DataValue::Bytes(b) => {
                self.write_control(BYTES, b.len());
                self.buf.extend_from_slice(b);
            }
            DataValue::Uint16(n) => self.write_uint(UINT16, u128::from(*n)),
            DataValue::Uint32(n) => self.write_uint(UINT32, u128::from(*n)),
            DataValue::Uint64(n) => self.write_uint(UINT64, u128::from(*n)),
            DataValue::Uint128(n) => self.write_uint(UINT128, *n),
            DataValue::Int32(n) => {
                self.write_control(INT32, 4);
                self.buf.extend_from_slice(&n.to_be_bytes());
            }
            DataValue::Map(map) => {
                self.write_control(MAP, map.len());
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    self.write_value(&DataValue::String(key.clone()));
                    self.write_value(&map[key]);
                }
            }
            DataValue::Array(items) => {
                self.write_control(ARRAY, items.len());
                for item in items {
                    self.write_value(item);
                }
            }
            DataValue::Bool(b) => self.write_control(BOOL, usize::from(*b)),
            DataValue::Float(f) => {
                self.write_control(FLOAT, 4);
                self.buf.extend_from_slice(&f.to_be_bytes());
            }
        }
    }

    fn write_uint(&mut self, type_id: u8, n: u128) {
        let bytes = n.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        self.write_control(type_id, bytes.len() - skip);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    fn write_control(&mut self, type_id: u8, size: usize) {
        let (size_bits, ext): (u8, Vec<u8>) = if size < 29 {
            (size as u8, vec![])
        } else if size < 285 {
            (29, vec![(size - 29) as u8])
        } else if size < 65_821 {
            (30, ((size - 285) as u16).to_be_bytes().to_vec())
        } else {
            (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
        };

        if type_id <= 7 {
            self.buf.push((type_id << 5) | size_bits);
        } else {
            self.buf.push(size_bits);
            self.buf.push(type_id - 7);
        }
        self.buf.extend_from_slice(&ext);
    }

    fn write_pointer(&mut self, target: u32) {
        let ctrl = POINTER << 5;
        if target < 2048 {
            self.buf.push(ctrl | ((target >> 8) & 0x7) as u8);
            self.buf.push(target as u8);
        } else if target < 526_336 {
            let v = target - 2048;
            self.buf.push(ctrl | (1 << 3) | ((v >> 16) & 0x7) as u8);
            self.buf.extend_from_slice(&(v as u16).to_be_bytes());
        } else if target < 134_744_064 {
            let v = target - 526_336;
            self.buf.push(ctrl | (2 << 3) | ((v >> 24) & 0x7) as u8);
            self.buf.extend_from_slice(&v.to_be_bytes()[1..]);
        } else {
            self.buf.push(ctrl | (3 << 3));
            self.buf.extend_from_slice(&target.to_be_bytes());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    Empty,
    Node(u32),
    Data(u32),
}

/// Search tree writer
#[derive(Debug)]
pub struct TreeWriter {
    ip_version: IpVersion,
    record_size: RecordSize,
    nodes: Vec<[Record; 2]>,
}

impl TreeWriter {
    pub fn new(ip_version: IpVersion, record_size: RecordSize) -> Self {
        Self {
            ip_version,
            record_size,
            nodes: vec![[Record::Empty; 2]],
        }
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Point `network/prefix_len` at `data_offset`
    ///
    /// More specific networks must be inserted after the ones containing them.
    /// IPv4 networks in an IPv6 tree land under `::/96`.
    pub fn insert(&mut self, network: IpAddr, prefix_len: u8, data_offset: u32) {
        let (bits, prefix_len) = match (network, self.ip_version) {
            (IpAddr::V4(v4), IpVersion::V4) => (u128::from(u32::from(v4)) << 96, prefix_len),
            (IpAddr::V4(v4), IpVersion::V6) => (u128::from(u32::from(v4)), prefix_len + 96),
            (IpAddr::V6(v6), IpVersion::V6) => (u128::from(v6), prefix_len),
            (IpAddr::V6(_), IpVersion::V4) => panic!("IPv6 network in an IPv4 tree"),
        };
        assert!(prefix_len > 0, "cannot insert a zero-length prefix");

        let mut node = 0usize;
        for i in 0..prefix_len - 1 {
            let bit = ((bits >> (127 - i)) & 1) as usize;
            node = match self.nodes[node][bit] {
                Record::Node(next) => next as usize,
                inherited => {
                    let next = self.nodes.len();
                    self.nodes.push([inherited; 2]);
                    self.nodes[node][bit] = Record::Node(next as u32);
                    next
                }
            };
        }
        let bit = ((bits >> (128 - u32::from(prefix_len))) & 1) as usize;
        self.nodes[node][bit] = Record::Data(data_offset);
    }

    /// Encode every node with the configured record width
    pub fn build(&self) -> Vec<u8> {
        let node_count = self.node_count();
        let mut out = Vec::with_capacity(self.nodes.len() * self.record_size.node_bytes());
        for [left, right] in &self.nodes {
            let l = record_value(*left, node_count);
            let r = record_value(*right, node_count);
            match self.record_size {
                RecordSize::Bits24 => {
                    out.extend_from_slice(&l.to_be_bytes()[1..]);
                    out.extend_from_slice(&r.to_be_bytes()[1..]);
                }
                RecordSize::Bits28 => {
                    out.extend_from_slice(&l.to_be_bytes()[1..]);
                    out.push((((l >> 24) & 0x0F) << 4) as u8 | ((r >> 24) & 0x0F) as u8);
                    out.extend_from_slice(&r.to_be_bytes()[1..]);
                }
                RecordSize::Bits32 => {
                    out.extend_from_slice(&l.to_be_bytes());
                    out.extend_from_slice(&r.to_be_bytes());
                }
            }
        }
        out
    }
}

fn record_value(record: Record, node_count: u32) -> u32 {
    match record {
        Record::Empty => node_count,
        Record::Node(id) => id,
        Record::Data(offset) => node_count + 16 + offset,
    }
}

/// Metadata fields written after the marker
#[derive(Debug, Clone)]
pub struct MetadataFields {
    pub database_type: String,
    pub languages: Vec<String>,
    pub description: Vec<(String, String)>,
    pub build_epoch: u64,
}

impl MetadataFields {
    pub fn new(database_type: &str) -> Self {
        Self {
            database_type: database_type.to_string(),
            languages: vec!["en".to_string()],
            description: vec![("en".to_string(), format!("{} test database", database_type))],
            build_epoch: 1_700_000_000,
        }
    }
}

/// Builder for a complete database image
pub struct MmdbWriter {
    pub tree: TreeWriter,
    pub data: Encoder,
    pub metadata: MetadataFields,
}

impl MmdbWriter {
    pub fn new(database_type: &str, ip_version: IpVersion, record_size: RecordSize) -> Self {
        Self {
            tree: TreeWriter::new(ip_version, record_size),
            data: Encoder::new(),
            metadata: MetadataFields::new(database_type),
        }
    }

    /// Encode `value` and map `cidr` to it; returns the data offset
    pub fn insert(&mut self, cidr: &str, value: &DataValue) -> u32 {
        let offset = self.data.encode(value);
        self.insert_offset(cidr, offset);
        offset
    }

    /// Map `cidr` to an already encoded record
    pub fn insert_offset(&mut self, cidr: &str, offset: u32) {
        let (ip, prefix_len) = parse_cidr(cidr);
        self.tree.insert(ip, prefix_len, offset);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = self.tree.build();
        image.extend_from_slice(&[0u8; 16]);
        image.extend_from_slice(self.data.bytes());
        image.extend_from_slice(METADATA_MARKER);
        image.extend_from_slice(&self.metadata_section());
        image
    }

    fn metadata_section(&self) -> Vec<u8> {
        let md = &self.metadata;
        let mut map = HashMap::new();
        map.insert("binary_format_major_version".to_string(), DataValue::Uint16(2));
        map.insert("binary_format_minor_version".to_string(), DataValue::Uint16(0));
        map.insert("node_count".to_string(), DataValue::Uint32(self.tree.node_count()));
        map.insert(
            "record_size".to_string(),
            DataValue::Uint16(self.tree.record_size.bits()),
        );
        map.insert(
            "ip_version".to_string(),
            DataValue::Uint16(match self.tree.ip_version {
                IpVersion::V4 => 4,
                IpVersion::V6 => 6,
            }),
        );
        map.insert("database_type".to_string(), string(&md.database_type));
        map.insert(
            "languages".to_string(),
            DataValue::Array(md.languages.iter().map(|l| string(l)).collect()),
        );
        map.insert("build_epoch".to_string(), DataValue::Uint64(md.build_epoch));
        map.insert(
            "description".to_string(),
            DataValue::Map(
                md.description
                    .iter()
                    .map(|(k, v)| (k.clone(), string(v)))
                    .collect(),
            ),
        );

        let mut encoder = Encoder::new();
        encoder.encode(&DataValue::Map(map));
        encoder.into_bytes()
    }
}

pub fn parse_cidr(cidr: &str) -> (IpAddr, u8) {
    let (ip, len) = cidr.split_once('/').expect("cidr needs a prefix length");
    (ip.parse().expect("bad ip"), len.parse().expect("bad prefix length"))
}

pub fn string(s: &str) -> DataValue {
    DataValue::String(s.to_string())
}

pub fn map(entries: &[(&str, DataValue)]) -> DataValue {
    DataValue::Map(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}

/// `{"iso_code": code, "names": {"en": name}}`
pub fn country(iso_code: &str, name: &str) -> DataValue {
    map(&[
        ("iso_code", string(iso_code)),
        ("names", map(&[("en", string(name))])),
    ])
}

/// A small GeoIP2-Country style database
///
/// - 1.0.0.0/8: US, continent NA, with an unknown top-level key
/// - 2.0.0.0/16: DE, registered_country via a shared pointer
/// - 81.2.69.0/24: GB, record stored behind a top-level pointer
/// - 2001:218::/32 (IPv6 trees only): JP
pub fn country_db(ip_version: IpVersion, record_size: RecordSize) -> Vec<u8> {
    let mut w = MmdbWriter::new("GeoLite2-Country", ip_version, record_size);

    w.insert(
        "1.0.0.0/8",
        &map(&[
            (
                "continent",
                map(&[
                    ("code", string("NA")),
                    ("geoname_id", DataValue::Uint32(6_255_149)),
                ]),
            ),
            ("country", country("US", "United States")),
            ("future_key", DataValue::Array(vec![DataValue::Uint16(1)])),
        ]),
    );

    let germany = w.data.encode(&country("DE", "Germany"));
    w.insert(
        "2.0.0.0/16",
        &map(&[
            ("country", DataValue::Pointer(germany)),
            ("registered_country", DataValue::Pointer(germany)),
            (
                "traits",
                map(&[("is_anycast", DataValue::Bool(true))]),
            ),
        ]),
    );

    let gb = w.data.encode(&map(&[("country", country("GB", "United Kingdom"))]));
    let gb_ptr = w.data.encode(&DataValue::Pointer(gb));
    w.insert_offset("81.2.69.0/24", gb_ptr);

    if ip_version == IpVersion::V6 {
        w.insert("2001:218::/32", &map(&[("country", country("JP", "Japan"))]));
    }

    w.build()
}
