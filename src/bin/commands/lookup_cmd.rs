use anyhow::{Context, Result};
use clap::ValueEnum;
use ipmeta::geoip2::{AnonymousIp, ConnectionType, CountryResult, DatabaseRecord, Domain, Reader};
use ipmeta::mmdb::IpVersion;
use ipmeta::Database;
use serde::Serialize;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cli_utils::{format_network, searched_address};

/// How lookup results are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    /// Decoded data as stored
    Raw,
    /// GeoIP2 country record
    Country,
    /// GeoIP2 anonymous IP flags
    AnonymousIp,
    /// GeoIP2 connection type
    ConnectionType,
    /// GeoIP2 domain
    Domain,
}

/// Look up every address; returns whether any of them had a record
pub fn cmd_lookup(
    database: PathBuf,
    addresses: Vec<String>,
    kind: RecordKind,
    quiet: bool,
) -> Result<bool> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;
    let tree = db.metadata().ip_version;

    match kind {
        RecordKind::Raw => lookup_all(&addresses, tree, quiet, |ip| {
            Ok(match db.lookup(ip)? {
                Some(result) => Some((result.prefix_len, serde_json::to_value(&result.data)?)),
                None => None,
            })
        }),
        RecordKind::Country => lookup_typed::<CountryResult>(db, &addresses, tree, quiet),
        RecordKind::AnonymousIp => lookup_typed::<AnonymousIp>(db, &addresses, tree, quiet),
        RecordKind::ConnectionType => lookup_typed::<ConnectionType>(db, &addresses, tree, quiet),
        RecordKind::Domain => lookup_typed::<Domain>(db, &addresses, tree, quiet),
    }
}

fn lookup_typed<T>(
    db: Database,
    addresses: &[String],
    tree: IpVersion,
    quiet: bool,
) -> Result<bool>
where
    T: DatabaseRecord + Serialize,
{
    let reader = Reader::<T>::new(db)?;
    lookup_all(addresses, tree, quiet, |ip| {
        Ok(match reader.lookup_with_prefix(ip)? {
            Some((record, prefix_len)) => Some((prefix_len, serde_json::to_value(&record)?)),
            None => None,
        })
    })
}

fn lookup_all<F>(
    addresses: &[String],
    tree: IpVersion,
    quiet: bool,
    mut lookup: F,
) -> Result<bool>
where
    F: FnMut(IpAddr) -> Result<Option<(u8, Value)>>,
{
    let mut found_any = false;
    let mut results = Vec::with_capacity(addresses.len());

    for text in addresses {
        let ip: IpAddr = text
            .trim()
            .parse()
            .with_context(|| format!("Invalid IP address: {}", text))?;

        let entry = match lookup(ip).with_context(|| format!("Lookup failed for: {}", ip))? {
            Some((prefix_len, data)) => {
                found_any = true;
                json!({
                    "ip": ip.to_string(),
                    "network": format_network(searched_address(ip, tree), prefix_len),
                    "prefix_len": prefix_len,
                    "data": data,
                })
            }
            None => json!({ "ip": ip.to_string(), "data": null }),
        };
        results.push(entry);
    }

    if !quiet {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    Ok(found_any)
}
