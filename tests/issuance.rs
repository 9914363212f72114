// tests/issuance.rs

//! Integration tests for issuing sets to devices.
//!
//! These tests verify that:
//! 1. Concurrent devices never receive the same set
//! 2. A device keeps getting its own set back
//! 3. The download counter marks unconfirmed issuance
//! 4. Devices only ever see fault reasons

mod common;

use common::{BANNER, CA, CONFIG, SECRET, setup_initialized, setup_prefix};
use provsys::{
    DeviceRequest, Error, Fault, ProvSet, ProvSystem, Provisioning, hash, same_config,
};
use std::collections::HashSet;
use std::thread;

fn request(dev_id: &str) -> DeviceRequest {
    DeviceRequest::new(dev_id, "prod-x", "1.2.3")
}

#[test]
fn test_concurrent_allocation_is_exclusive() {
    let (_temp_dir, paths) = setup_initialized(3);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let paths = paths.clone();
            thread::spawn(move || -> provsys::Result<String> {
                let provisioning = Provisioning::new(paths, request(&format!("dev-{i}")))?;
                provisioning.fetch_set().map(|issued| issued.set.id)
            })
        })
        .collect();

    let mut issued = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(id) => issued.push(id),
            Err(Error::NoFreeSets) => exhausted += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(issued.len(), 3);
    assert_eq!(exhausted, 5);
    let unique: HashSet<&String> = issued.iter().collect();
    assert_eq!(unique.len(), 3);
}

#[test]
fn test_device_gets_same_set_back() {
    let (_temp_dir, paths) = setup_initialized(3);
    let provisioning = Provisioning::new(paths, request("dev-7")).unwrap();

    let first = provisioning.fetch_set().unwrap();
    let second = provisioning.fetch_set().unwrap();
    assert_eq!(first.set.id, second.set.id);
    assert_eq!(first.set.download_count, -1);
    assert_eq!(second.set.download_count, -1);
    assert_eq!(second.set.dev_id.as_deref(), Some("dev-7"));
}

#[test]
fn test_exhausted_pool() {
    let (_temp_dir, paths) = setup_initialized(1);

    Provisioning::new(paths.clone(), request("dev-1"))
        .unwrap()
        .fetch_set()
        .unwrap();

    let err = Provisioning::new(paths.clone(), request("dev-2"))
        .unwrap()
        .fetch_set()
        .unwrap_err();
    assert!(matches!(err, Error::NoFreeSets));
    assert_eq!(err.fault(), Fault::NoFreeSets);

    // the owner is still served
    let again = Provisioning::new(paths, request("dev-1"))
        .unwrap()
        .fetch_set()
        .unwrap();
    assert_eq!(again.set.id, "s0");
}

#[test]
fn test_complete_is_idempotent() {
    let (_temp_dir, paths) = setup_initialized(2);
    let provisioning = Provisioning::new(paths.clone(), request("dev-7")).unwrap();
    provisioning.fetch_set().unwrap();

    assert!(provisioning.complete().unwrap());
    assert!(provisioning.complete().unwrap());

    let conn = ProvSystem::new(paths).connect().unwrap();
    let set = ProvSet::find_by_device(&conn, "dev-7", &[]).unwrap().unwrap();
    assert_eq!(set.download_count, 1);
    assert!(!set.is_pending());
}

#[test]
fn test_set_done() {
    let (_temp_dir, paths) = setup_initialized(2);
    let provisioning = Provisioning::new(paths.clone(), request("dev-7")).unwrap();

    assert_eq!(provisioning.set_done().unwrap(), "dev-7\nprod-x\n1.2.3");

    let counts = ProvSystem::new(paths).counts().unwrap().unwrap();
    assert_eq!(counts.pending, 0);
    assert_eq!(counts.free, 1);
}

#[test]
fn test_fetch_config_issues_set() {
    let (_temp_dir, paths) = setup_initialized(2);
    let provisioning = Provisioning::new(paths.clone(), request("dev-7")).unwrap();

    let config: serde_json::Value =
        serde_json::from_str(&provisioning.fetch_config().unwrap()).unwrap();
    let expected: serde_json::Value = serde_json::from_str(CONFIG).unwrap();
    assert!(same_config(&config, &expected));

    let counts = ProvSystem::new(paths).counts().unwrap().unwrap();
    assert_eq!(counts.pending, 1);
}

#[test]
fn test_read_file() {
    let (_temp_dir, paths) = setup_initialized(2);
    let provisioning = Provisioning::new(paths, request("dev-7")).unwrap();

    assert_eq!(provisioning.read_file("wifi.ca").unwrap(), CA);
    assert_eq!(provisioning.read_file("device.banner").unwrap(), BANNER);
    assert_eq!(provisioning.read_file("wifi.cert").unwrap(), b"cert-b1-0");
    assert_eq!(provisioning.read_file("device.seed").unwrap(), b"seed-b1-0");

    for key in ["nope", "secret", "../PROV/secret"] {
        let err = provisioning.read_file(key).unwrap_err();
        assert_eq!(err.fault(), Fault::NotFound, "key {key}");
    }
}

#[test]
fn test_purge_code() {
    let (_temp_dir, paths) = setup_initialized(1);
    let provisioning = Provisioning::new(paths, request("dev-7")).unwrap();

    let expected = hash::purge_code("dev-7", SECRET).into_string();
    assert_eq!(provisioning.purge_code(), expected);
    assert_eq!(provisioning.fetch_set().unwrap().purge_code, expected);
}

#[test]
fn test_uninitialized_fault() {
    let (_temp_dir, paths) = setup_prefix();

    let err = Provisioning::new(paths, request("dev-7")).unwrap_err();
    assert!(matches!(err, Error::Uninitialized(_)));
    assert_eq!(err.fault().reason(), "UNINITIALIZED");
}
