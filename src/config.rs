// src/config.rs

//! Project configuration
//!
//! A batch ships a `config.json` describing the project and its endpoints.
//! Each endpoint may declare files that a device downloads:
//!
//! ```json
//! {
//!   "project": "sensor-gw",
//!   "endpoints": {
//!     "wifi": { "files": [ { "type": "static", "name": "ca" },
//!                          { "type": "dynamic", "name": "cert" } ] },
//!     "seed": { "files": [ { "type": "dynamic" } ] }
//!   }
//! }
//! ```
//!
//! File keys are `"{endpoint}.{name}"`, or the bare endpoint when the file has
//! no name, so the example yields static `wifi.ca` and dynamic `wifi.cert`,
//! `seed`. Static files are shared by every set and live in the install root;
//! dynamic files are per set and become columns of the set table.
//!
//! The configuration is loaded once per session and never mutated. An
//! incoming batch is compatible only if its configuration is semantically
//! identical to the installed one, key order aside.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Whether a file is shared by all sets or unique per set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Static,
    Dynamic,
}

/// One file declared by an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FileSpec {
    /// File key for this file under `endpoint`
    pub fn key(&self, endpoint: &str) -> String {
        match &self.name {
            Some(name) => format!("{endpoint}.{name}"),
            None => endpoint.to_string(),
        }
    }
}

/// An endpoint; fields other than `files` are carried in the raw document only
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub files: Vec<FileSpec>,
}

#[derive(Deserialize)]
struct RawConfig {
    project: String,
    endpoints: Map<String, Value>,
}

/// Parsed project configuration
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    project: String,
    endpoints: Vec<(String, Endpoint)>,
    document: Value,
}

impl ProjectConfig {
    /// Parse a configuration document
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let document: Value = serde_json::from_slice(bytes)?;
        let raw: RawConfig = serde_json::from_value(document.clone())?;

        let mut endpoints = Vec::with_capacity(raw.endpoints.len());
        for (name, value) in raw.endpoints {
            let endpoint: Endpoint = serde_json::from_value(value)
                .map_err(|e| Error::ConfigParse(format!("endpoint '{name}': {e}")))?;
            endpoints.push((name, endpoint));
        }

        Ok(Self {
            project: raw.project,
            endpoints,
            document,
        })
    }

    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
            .map_err(|e| Error::ConfigParse(format!("{}: {}", path.display(), e)))
    }

    /// Project name
    pub fn project(&self) -> &str {
        &self.project
    }

    /// The raw document as parsed
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Keys of all files of `kind`, in declared order
    pub fn file_keys(&self, kind: FileKind) -> Vec<String> {
        self.endpoints
            .iter()
            .flat_map(|(endpoint, spec)| {
                spec.files
                    .iter()
                    .filter(move |f| f.kind == kind)
                    .map(move |f| f.key(endpoint))
            })
            .collect()
    }

    /// Keys stored per set as table columns
    pub fn dynamic_file_keys(&self) -> Vec<String> {
        self.file_keys(FileKind::Dynamic)
    }

    /// Keys stored once in the install root
    pub fn static_file_keys(&self) -> Vec<String> {
        self.file_keys(FileKind::Static)
    }

    /// Kind of a declared file key, if any
    pub fn file_kind(&self, key: &str) -> Option<FileKind> {
        self.endpoints.iter().find_map(|(endpoint, spec)| {
            spec.files
                .iter()
                .find(|f| f.key(endpoint) == key)
                .map(|f| f.kind)
        })
    }

    /// Semantic equality with another configuration
    pub fn is_same_as(&self, other: &ProjectConfig) -> bool {
        same_config(&self.document, &other.document)
    }
}

/// Compare two configuration documents irrespective of key order
pub fn same_config(a: &Value, b: &Value) -> bool {
    canonical(a) == canonical(b)
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|x, y| x.0.cmp(y.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = r#"{
        "project": "sensor-gw",
        "endpoints": {
            "wifi": { "url": "/wifi", "files": [
                { "type": "static", "name": "ca" },
                { "type": "dynamic", "name": "cert" },
                { "type": "dynamic", "name": "key" }
            ] },
            "status": { "url": "/status" },
            "seed": { "files": [ { "type": "dynamic" } ] },
            "banner": { "files": [ { "type": "static" } ] }
        }
    }"#;

    #[test]
    fn test_file_keys_in_declared_order() {
        let cfg = ProjectConfig::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(cfg.project(), "sensor-gw");
        assert_eq!(cfg.dynamic_file_keys(), vec!["wifi.cert", "wifi.key", "seed"]);
        assert_eq!(cfg.static_file_keys(), vec!["wifi.ca", "banner"]);
    }

    #[test]
    fn test_file_kind_lookup() {
        let cfg = ProjectConfig::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(cfg.file_kind("wifi.ca"), Some(FileKind::Static));
        assert_eq!(cfg.file_kind("seed"), Some(FileKind::Dynamic));
        assert_eq!(cfg.file_kind("status"), None);
        assert_eq!(cfg.file_kind("config.json"), None);
    }

    #[test]
    fn test_malformed_documents_rejected() {
        assert!(matches!(ProjectConfig::parse(b"{not json"), Err(Error::ConfigParse(_))));
        assert!(matches!(
            ProjectConfig::parse(br#"{"endpoints": {}}"#),
            Err(Error::ConfigParse(_))
        ));
        assert!(matches!(
            ProjectConfig::parse(br#"{"project": "p", "endpoints": {"a": {"files": [{"type": "weird"}]}}}"#),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_same_config_ignores_key_order() {
        let a = json!({"project": "p", "endpoints": {"a": {"files": [{"type": "dynamic", "name": "x"}]}, "b": {}}});
        let b = json!({"endpoints": {"b": {}, "a": {"files": [{"name": "x", "type": "dynamic"}]}}, "project": "p"});
        assert!(same_config(&a, &b));
    }

    #[test]
    fn test_same_config_detects_drift() {
        let a = json!({"project": "p", "endpoints": {"a": {"files": [{"type": "dynamic"}]}}});
        let b = json!({"project": "p", "endpoints": {"a": {"files": [{"type": "static"}]}}});
        let c = json!({"project": "q", "endpoints": {"a": {"files": [{"type": "dynamic"}]}}});
        assert!(!same_config(&a, &b));
        assert!(!same_config(&a, &c));
    }

    #[test]
    fn test_same_config_array_order_matters() {
        let a = json!({"project": "p", "endpoints": {"a": {"files": [{"type": "dynamic", "name": "x"}, {"type": "dynamic", "name": "y"}]}}});
        let b = json!({"project": "p", "endpoints": {"a": {"files": [{"type": "dynamic", "name": "y"}, {"type": "dynamic", "name": "x"}]}}});
        assert!(!same_config(&a, &b));
    }

    #[test]
    fn test_is_same_as_on_parsed_configs() {
        let reordered = r#"{"endpoints": {
            "banner": { "files": [ { "type": "static" } ] },
            "seed": { "files": [ { "type": "dynamic" } ] },
            "status": { "url": "/status" },
            "wifi": { "files": [
                { "name": "ca", "type": "static" },
                { "name": "cert", "type": "dynamic" },
                { "name": "key", "type": "dynamic" }
            ], "url": "/wifi" }
        }, "project": "sensor-gw"}"#;
        let a = ProjectConfig::parse(SAMPLE.as_bytes()).unwrap();
        let b = ProjectConfig::parse(reordered.as_bytes()).unwrap();
        assert!(a.is_same_as(&b));
    }
}
