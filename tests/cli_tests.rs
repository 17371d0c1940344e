mod common;

use assert_cmd::Command;
use common::{country_db, MmdbWriter};
use ipmeta::mmdb::{IpVersion, RecordSize};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create an ipmeta command
fn ipmeta_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("ipmeta"))
}

fn country_file(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("country.mmdb");
    fs::write(&path, country_db(IpVersion::V6, RecordSize::Bits24)).unwrap();
    path
}

#[test]
fn test_help() {
    ipmeta_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MaxMind DB"));
}

#[test]
fn test_version() {
    ipmeta_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ipmeta"));
}

#[test]
fn test_lookup_raw() {
    let dir = TempDir::new().unwrap();
    let db = country_file(&dir);

    let output = ipmeta_cmd()
        .arg("lookup")
        .arg(&db)
        .arg("81.2.69.160")
        .arg("9.9.9.9")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["network"], "81.2.69.0/24");
    assert_eq!(results[0]["prefix_len"], 24);
    assert_eq!(results[0]["data"]["country"]["iso_code"], "GB");
    assert_eq!(results[1]["ip"], "9.9.9.9");
    assert!(results[1]["data"].is_null());
}

#[test]
fn test_lookup_typed_country() {
    let dir = TempDir::new().unwrap();
    let db = country_file(&dir);

    ipmeta_cmd()
        .args(["lookup", "--type", "country"])
        .arg(&db)
        .arg("2001:218::1")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"network\": \"2001:218::/32\""))
        .stdout(predicate::str::contains("\"iso_code\": \"JP\""))
        .stdout(predicate::str::contains("\"is_anycast\": false"));
}

#[test]
fn test_lookup_typed_wrong_database_type() {
    let dir = TempDir::new().unwrap();
    let db = country_file(&dir);

    ipmeta_cmd()
        .args(["lookup", "--type", "domain"])
        .arg(&db)
        .arg("1.2.3.4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected database type 'GeoLite2-Country'"));
}

#[test]
fn test_lookup_not_found_exit_code() {
    let dir = TempDir::new().unwrap();
    let db = country_file(&dir);

    ipmeta_cmd()
        .args(["lookup", "--quiet"])
        .arg(&db)
        .arg("9.9.9.9")
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());

    ipmeta_cmd()
        .args(["lookup", "-q"])
        .arg(&db)
        .arg("1.1.1.1")
        .assert()
        .success();
}

#[test]
fn test_lookup_invalid_address() {
    let dir = TempDir::new().unwrap();
    let db = country_file(&dir);

    ipmeta_cmd()
        .arg("lookup")
        .arg(&db)
        .arg("not-an-ip")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid IP address: not-an-ip"));
}

#[test]
fn test_lookup_ipv6_in_ipv4_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v4.mmdb");
    fs::write(&path, country_db(IpVersion::V4, RecordSize::Bits24)).unwrap();

    ipmeta_cmd()
        .arg("lookup")
        .arg(&path)
        .arg("2001:db8::1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Lookup failed for: 2001:db8::1"));
}

#[test]
fn test_lookup_mapped_address_in_ipv4_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("v4.mmdb");
    fs::write(&path, country_db(IpVersion::V4, RecordSize::Bits24)).unwrap();

    let output = ipmeta_cmd()
        .arg("lookup")
        .arg(&path)
        .arg("::ffff:1.2.3.4")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json[0]["ip"], "::ffff:1.2.3.4");
    assert_eq!(json[0]["network"], "1.0.0.0/8");
    assert_eq!(json[0]["prefix_len"], 8);
    assert_eq!(json[0]["data"]["country"]["iso_code"], "US");
}

#[test]
fn test_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("anon.mmdb");
    let mut w = MmdbWriter::new("GeoIP2-Anonymous-IP", IpVersion::V4, RecordSize::Bits32);
    w.insert("1.0.0.0/8", &common::map(&[("is_anonymous", ipmeta::DataValue::Bool(true))]));
    fs::write(&path, w.build()).unwrap();

    let output = ipmeta_cmd().arg("metadata").arg(&path).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["database_type"], "GeoIP2-Anonymous-IP");
    assert_eq!(json["record_size"], 32);
    assert_eq!(json["ip_version"], 4);
    assert_eq!(json["node_count"], 8);
    assert_eq!(json["languages"][0], "en");
}

#[test]
fn test_metadata_not_a_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.mmdb");
    fs::write(&path, b"this is not a database").unwrap();

    ipmeta_cmd()
        .arg("metadata")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load database"));
}
