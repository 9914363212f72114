// src/paths.rs
//! Centralized path derivation for the provisioning directories
//!
//! Everything hangs off one prefix:
//!
//! ```text
//! <prefix>/PROV/      local install root (config.json, secret, static files, sets.db)
//! <prefix>/IMPORT/    inbound batches
//! <prefix>/EXPORT/    outbound backups
//! ```

use crate::error::Result;
use crate::filesystem::path::{safe_join, single_component};
use std::path::{Path, PathBuf};

/// Default installation prefix
pub const DEFAULT_PREFIX: &str = "/PROV";

/// Project configuration file name, both in batches and in the install root
pub const CONFIG_FILE: &str = "config.json";

/// Secret key material file name
pub const SECRET_FILE: &str = "secret";

/// Set table database file name
pub const DB_FILE: &str = "sets.db";

/// Directory inside a batch holding one subdirectory per set
pub const SETS_DIR: &str = "sets";

/// Lock file serializing administrative operations, inside the install root
pub const LOCK_FILE: &str = ".provsys.lock";

/// Placeholder kept in the inbound directory, never a batch
pub const KEEP_MARKER: &str = "KEEP";

/// Inodes ignored when listing inbound and outbound directories
pub const DEFAULT_IGNORE: &[&str] = &["lost+found"];

/// Resolved directory layout for one install
#[derive(Debug, Clone)]
pub struct ProvPaths {
    /// Local install root
    pub local: PathBuf,
    /// Inbound batch directory
    pub inbound: PathBuf,
    /// Outbound backup directory
    pub outbound: PathBuf,
    ignore: Vec<String>,
}

impl ProvPaths {
    /// Derive the standard layout below `prefix`
    pub fn from_prefix(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref();
        Self {
            local: prefix.join("PROV"),
            inbound: prefix.join("IMPORT"),
            outbound: prefix.join("EXPORT"),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add names to the ignore list
    pub fn with_ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !name.is_empty() && !self.ignore.contains(&name) {
                self.ignore.push(name);
            }
        }
        self
    }

    /// Whether an inbound entry is never a batch
    pub fn is_ignored(&self, name: &str) -> bool {
        name == KEEP_MARKER || self.ignore.iter().any(|i| i == name)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.local.join(LOCK_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.local.join(CONFIG_FILE)
    }

    pub fn secret_file(&self) -> PathBuf {
        self.local.join(SECRET_FILE)
    }

    pub fn db_file(&self) -> PathBuf {
        self.local.join(DB_FILE)
    }

    /// Location of a static file key inside the install root
    pub fn static_file(&self, key: &str) -> Result<PathBuf> {
        safe_join(&self.local, key)
    }

    /// Location of an inbound batch
    pub fn batch(&self, name: &str) -> Result<PathBuf> {
        Ok(self.inbound.join(single_component(name)?))
    }

    /// Location of an outbound backup
    pub fn backup(&self, name: &str) -> Result<PathBuf> {
        Ok(self.outbound.join(single_component(name)?))
    }
}

impl Default for ProvPaths {
    fn default() -> Self {
        Self::from_prefix(DEFAULT_PREFIX)
    }
}
