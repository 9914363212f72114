// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use provsys::ProvPaths;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

/// Project configuration used by most tests.
///
/// Static keys: `wifi.ca`, `device.banner`. Dynamic keys: `wifi.cert`,
/// `device.seed`.
pub const CONFIG: &str = r#"{
  "project": "sensor-gw",
  "endpoints": {
    "wifi": {"files": [{"type": "static", "name": "ca"}, {"type": "dynamic", "name": "cert"}]},
    "device": {"files": [{"type": "dynamic", "name": "seed"}, {"type": "static", "name": "banner"}]}
  }
}"#;

/// Same content as [`CONFIG`], keys reordered.
pub const CONFIG_REORDERED: &str = r#"{
  "endpoints": {
    "device": {"files": [{"name": "seed", "type": "dynamic"}, {"name": "banner", "type": "static"}]},
    "wifi": {"files": [{"name": "ca", "type": "static"}, {"name": "cert", "type": "dynamic"}]}
  },
  "project": "sensor-gw"
}"#;

pub const SECRET: &[u8] = b"factory-secret";
pub const CA: &[u8] = b"-----BEGIN CERTIFICATE-----\nca\n";
pub const BANNER: &[u8] = b"sensor-gw factory image\n";

/// Builds batch archives the way factory tooling writes them.
pub struct BatchBuilder {
    config: String,
    secret: Option<Vec<u8>>,
    files: Vec<(String, Vec<u8>)>,
    sets: Vec<(String, Vec<(String, Vec<u8>)>)>,
    dot_prefix: bool,
    gzip: bool,
}

impl BatchBuilder {
    /// Batch with [`CONFIG`], [`SECRET`] and both static files.
    pub fn new() -> Self {
        Self {
            config: CONFIG.to_string(),
            secret: Some(SECRET.to_vec()),
            files: vec![
                ("wifi.ca".to_string(), CA.to_vec()),
                ("device.banner".to_string(), BANNER.to_vec()),
            ],
            sets: Vec::new(),
            dot_prefix: false,
            gzip: false,
        }
    }

    pub fn config(mut self, config: &str) -> Self {
        self.config = config.to_string();
        self
    }

    pub fn without_file(mut self, name: &str) -> Self {
        self.files.retain(|(n, _)| n != name);
        self
    }

    /// Replace a top-level file, adding it if absent.
    pub fn with_file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.retain(|(n, _)| n != name);
        self.files.push((name.to_string(), content.to_vec()));
        self
    }

    pub fn secret(mut self, secret: &[u8]) -> Self {
        self.secret = Some(secret.to_vec());
        self
    }

    pub fn without_secret(mut self) -> Self {
        self.secret = None;
        self
    }

    /// Add a complete set; payloads are derived from `tag` so they stay unique.
    pub fn set(self, id: &str, tag: &str) -> Self {
        self.raw_set(
            id,
            &[
                ("wifi.cert", format!("cert-{tag}").as_bytes()),
                ("device.seed", format!("seed-{tag}").as_bytes()),
            ],
        )
    }

    pub fn raw_set(mut self, id: &str, files: &[(&str, &[u8])]) -> Self {
        self.sets.push((
            id.to_string(),
            files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        ));
        self
    }

    pub fn dot_prefixed(mut self) -> Self {
        self.dot_prefix = true;
        self
    }

    pub fn gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let prefix = if self.dot_prefix { "./" } else { "" };
        let mut builder = Builder::new(Vec::new());

        if self.dot_prefix {
            append(&mut builder, "./", EntryType::Directory, b"");
        }
        append(
            &mut builder,
            &format!("{prefix}config.json"),
            EntryType::Regular,
            self.config.as_bytes(),
        );
        if let Some(secret) = &self.secret {
            append(&mut builder, &format!("{prefix}secret"), EntryType::Regular, secret);
        }
        for (name, content) in &self.files {
            append(&mut builder, &format!("{prefix}{name}"), EntryType::Regular, content);
        }
        append(&mut builder, &format!("{prefix}sets/"), EntryType::Directory, b"");
        for (id, files) in &self.sets {
            append(&mut builder, &format!("{prefix}sets/{id}/"), EntryType::Directory, b"");
            for (key, content) in files {
                append(
                    &mut builder,
                    &format!("{prefix}sets/{id}/{key}"),
                    EntryType::Regular,
                    content,
                );
            }
        }

        let tar = builder.into_inner().unwrap();
        if self.gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&tar).unwrap();
            encoder.finish().unwrap()
        } else {
            tar
        }
    }

    /// Write the archive into the inbound directory.
    pub fn write_to(&self, paths: &ProvPaths, name: &str) -> PathBuf {
        fs::create_dir_all(&paths.inbound).unwrap();
        let path = paths.inbound.join(name);
        fs::write(&path, self.build()).unwrap();
        path
    }
}

// Raw headers keep names byte-for-byte; `append_data` would drop `./`
fn append(builder: &mut Builder<Vec<u8>>, path: &str, kind: EntryType, content: &[u8]) {
    let mut header = Header::new_gnu();
    header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path.as_bytes());
    header.set_entry_type(kind);
    header.set_size(content.len() as u64);
    header.set_mode(if kind == EntryType::Directory { 0o755 } else { 0o644 });
    header.set_cksum();
    builder.append(&header, content).unwrap();
}

/// Create an empty install prefix.
///
/// Returns (TempDir, paths) - keep the TempDir alive to prevent cleanup.
pub fn setup_prefix() -> (TempDir, ProvPaths) {
    let temp_dir = tempfile::tempdir().unwrap();
    let paths = ProvPaths::from_prefix(temp_dir.path());
    fs::create_dir_all(&paths.inbound).unwrap();
    (temp_dir, paths)
}

/// Create a prefix initialized from a batch `b1` holding `sets` sets.
pub fn setup_initialized(sets: usize) -> (TempDir, ProvPaths) {
    let (temp_dir, paths) = setup_prefix();
    let mut batch = BatchBuilder::new();
    for i in 0..sets {
        batch = batch.set(&format!("s{i}"), &format!("b1-{i}"));
    }
    batch.write_to(&paths, "b1");
    provsys::ProvSystem::new(paths.clone())
        .import_batch("b1")
        .unwrap();
    (temp_dir, paths)
}
