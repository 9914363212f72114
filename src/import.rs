// src/import.rs

//! Batch import, backup and reset
//!
//! [`ProvSystem`] is the per-session handle for administrative operations.
//! It holds nothing but the directory layout; every operation re-reads the
//! install state from disk and opens its own database connection.
//!
//! # Import
//!
//! ```text
//! open batch -> structure check -+- uninitialized -> first import (undone on failure)
//!                                +- initialized   -> compatibility check
//!            -> one transaction: double-import guard, insert every set
//! ```
//!
//! Import, backup and reset hold the [`InstallLock`] for their whole run, so
//! concurrent administrative processes are serialized.

use crate::archive::BatchArchive;
use crate::config::ProjectConfig;
use crate::db;
use crate::db::models::{NewSet, ProvSet, SetCounts, bulk_insert};
use crate::error::{Error, Result};
use crate::filesystem::write_atomic;
use crate::integrity::{
    self, LocalState, inspect_local, validate_batch_compatibility, validate_batch_structure,
};
use crate::lock::InstallLock;
use crate::paths::{CONFIG_FILE, ProvPaths, SECRET_FILE};
use flate2::Compression;
use flate2::write::GzEncoder;
use rusqlite::{Connection, TransactionBehavior};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An inbound batch and whether it is already imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInfo {
    pub name: String,
    pub imported: bool,
}

/// Outcome of a successful import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub batch: String,
    /// Sets inserted
    pub sets: usize,
    /// This batch initialized the install
    pub initialized: bool,
}

/// Per-resource outcome of a reset
#[derive(Debug, Default)]
pub struct ResetReport {
    pub removed: Vec<PathBuf>,
    pub absent: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, io::Error)>,
}

impl ResetReport {
    fn remove(&mut self, path: PathBuf) {
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                self.removed.push(path);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.absent.push(path),
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                self.failed.push((path, e));
            }
        }
    }

    /// Every artifact is gone
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Administrative session over one install
#[derive(Debug, Clone)]
pub struct ProvSystem {
    paths: ProvPaths,
}

impl ProvSystem {
    pub fn new(paths: ProvPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ProvPaths {
        &self.paths
    }

    /// Take the administrative lock
    pub fn lock(&self) -> Result<InstallLock> {
        InstallLock::acquire(self.paths.lock_file())
    }

    /// Inspect the local install
    pub fn state(&self) -> LocalState {
        inspect_local(&self.paths)
    }

    /// Whether the install is initialized; errors if it is inconsistent
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(integrity::check_local(&self.paths)?.is_some())
    }

    /// Open the set table of an initialized install
    pub fn connect(&self) -> Result<Connection> {
        db::open(&self.paths.db_file())
    }

    /// Config and connection of an initialized install
    pub fn session(&self) -> Result<(ProjectConfig, Connection)> {
        let cfg = integrity::require_initialized(&self.paths)?;
        let conn = self.connect()?;
        Ok((cfg, conn))
    }

    /// Pool statistics, `None` when uninitialized
    pub fn counts(&self) -> Result<Option<SetCounts>> {
        if !self.is_initialized()? {
            return Ok(None);
        }
        Ok(Some(ProvSet::counts(&self.connect()?)?))
    }

    /// Inbound batches, sorted by name
    pub fn list_batches(&self) -> Result<Vec<BatchInfo>> {
        let names = list_dir(&self.paths, &self.paths.inbound)?;
        let conn = if self.is_initialized()? {
            Some(self.connect()?)
        } else {
            None
        };

        names
            .into_iter()
            .map(|name| {
                let imported = match &conn {
                    Some(conn) => ProvSet::batch_exists(conn, &name)?,
                    None => false,
                };
                Ok(BatchInfo { name, imported })
            })
            .collect()
    }

    /// Outbound backups, sorted by name
    pub fn list_backups(&self) -> Result<Vec<String>> {
        list_dir(&self.paths, &self.paths.outbound)
    }

    /// Whether any set references `batch`
    pub fn is_batch_imported(&self, batch: &str) -> Result<bool> {
        if !self.is_initialized()? {
            return Ok(false);
        }
        ProvSet::batch_exists(&self.connect()?, batch)
    }

    /// Open an inbound batch and check its structure
    pub fn open_batch(&self, name: &str) -> Result<BatchArchive> {
        let path = self.paths.batch(name)?;
        let archive = BatchArchive::open(&path).map_err(|e| match e {
            Error::PathTraversal(_) => e,
            other => Error::IncomingIntegrity(format!(
                "{}: expected a provisioning import archive ({})",
                path.display(),
                other
            )),
        })?;
        validate_batch_structure(&archive)?;
        Ok(archive)
    }

    /// Install config, secret, static files and the empty set table
    ///
    /// Only valid on an uninitialized install. Does not clean up after
    /// itself; [`ProvSystem::import_batch`] does.
    pub fn first_import(&self, archive: &BatchArchive) -> Result<ProjectConfig> {
        let _lock = self.lock()?;
        self.install(archive)
    }

    fn install(&self, archive: &BatchArchive) -> Result<ProjectConfig> {
        validate_batch_structure(archive)?;
        match self.state() {
            LocalState::Uninitialized => {}
            LocalState::Initialized(_) => {
                return Err(Error::LocalIntegrity(
                    "system is already initialized".to_string(),
                ));
            }
            LocalState::Inconsistent(failures) => {
                return Err(Error::LocalIntegrity(failures.join("; ")));
            }
        }

        info!(
            "Initializing {} from batch {}",
            self.paths.local.display(),
            archive.name()
        );
        fs::create_dir_all(&self.paths.local)?;

        let config_bytes = archive.read(CONFIG_FILE)?;
        let cfg = ProjectConfig::parse(config_bytes).map_err(|e| {
            Error::IncomingIntegrity(format!("{}|{}: {}", archive.name(), CONFIG_FILE, e))
        })?;
        write_atomic(&self.paths.config_file(), config_bytes)?;
        write_atomic(&self.paths.secret_file(), read_required(archive, SECRET_FILE)?)?;

        for key in cfg.static_file_keys() {
            let content = read_required(archive, &key)?;
            write_atomic(&self.paths.static_file(&key)?, content)?;
        }

        db::init(&self.paths.db_file(), &cfg.dynamic_file_keys())?;

        // Whatever was written must pass the same checks every later session runs
        match self.state() {
            LocalState::Initialized(cfg) => {
                info!("Initialized project '{}'", cfg.project());
                Ok(cfg)
            }
            LocalState::Uninitialized => Err(Error::LocalIntegrity(format!(
                "{}: nothing installed from batch {}",
                self.paths.local.display(),
                archive.name()
            ))),
            LocalState::Inconsistent(failures) => Err(Error::LocalIntegrity(failures.join("; "))),
        }
    }

    /// Import an inbound batch
    pub fn import_batch(&self, name: &str) -> Result<ImportSummary> {
        let archive = self.open_batch(name)?;
        let _lock = self.lock()?;

        let (cfg, initialized) = match self.state() {
            LocalState::Uninitialized => match self.install(&archive) {
                Ok(cfg) => (cfg, true),
                Err(e) => {
                    warn!("First import of {} failed, resetting: {}", name, e);
                    let static_keys = archive
                        .read(CONFIG_FILE)
                        .and_then(|bytes| ProjectConfig::parse(bytes))
                        .map(|cfg| cfg.static_file_keys())
                        .unwrap_or_default();
                    self.reset_with(&static_keys);
                    return Err(e);
                }
            },
            LocalState::Initialized(_) => (validate_batch_compatibility(&self.paths, &archive)?, false),
            LocalState::Inconsistent(failures) => {
                return Err(Error::LocalIntegrity(failures.join("; ")));
            }
        };

        let mut conn = self.connect()?;
        let dynamic_keys = cfg.dynamic_file_keys();
        let new_sets = archive
            .set_ids()
            .into_iter()
            .map(|id| {
                let mut set = NewSet::new(id.as_str());
                for key in &dynamic_keys {
                    let content = archive.read(&BatchArchive::set_member(&id, key))?;
                    set = set.with_payload(key.as_str(), content);
                }
                Ok(set)
            })
            .collect::<Result<Vec<_>>>()?;
        let sets = bulk_insert(&mut conn, archive.name(), &new_sets)?;

        if sets == 0 {
            warn!("Batch {} contains no sets", archive.name());
        }
        info!("Imported {} set(s) from batch {}", sets, archive.name());

        Ok(ImportSummary {
            batch: archive.name().to_string(),
            sets,
            initialized,
        })
    }

    /// Archive the whole install root into the outbound directory
    ///
    /// Holds the database write lock while archiving so the copied table is
    /// consistent. Refuses to overwrite an existing backup; a failed backup
    /// leaves no file behind.
    pub fn export_backup(&self, name: &str) -> Result<PathBuf> {
        let _lock = self.lock()?;
        integrity::require_initialized(&self.paths)?;
        let target = self.paths.backup(name)?;
        fs::create_dir_all(&self.paths.outbound)?;

        let mut conn = self.connect()?;
        let db_lock = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let file = File::create_new(&target)?;
        if let Err(e) = self.write_backup(file) {
            warn!("Backup {} failed, removing it: {}", target.display(), e);
            if let Err(rm) = fs::remove_file(&target) {
                warn!("Failed to remove {}: {}", target.display(), rm);
            }
            return Err(e);
        }

        db_lock.commit()?;
        info!("Backup written to {}", target.display());
        Ok(target)
    }

    fn write_backup(&self, file: File) -> Result<()> {
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let root_name = self
            .paths
            .local
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("PROV"));
        builder.append_dir_all(&root_name, &self.paths.local)?;
        let encoder = builder.into_inner()?;
        encoder.finish()?.sync_all()?;
        Ok(())
    }

    /// Remove every local artifact
    ///
    /// Best effort: already absent artifacts are fine, removal failures are
    /// logged and reported but do not stop the reset. Fails only if the
    /// administrative lock cannot be taken.
    pub fn reset(&self) -> Result<ResetReport> {
        let _lock = self.lock()?;
        let static_keys = ProjectConfig::load(&self.paths.config_file())
            .map(|cfg| cfg.static_file_keys())
            .unwrap_or_else(|e| {
                warn!("Static files unknown, config unreadable: {}", e);
                Vec::new()
            });
        Ok(self.reset_with(&static_keys))
    }

    fn reset_with(&self, static_keys: &[String]) -> ResetReport {
        let mut report = ResetReport::default();
        for key in static_keys {
            match self.paths.static_file(key) {
                Ok(path) => report.remove(path),
                Err(e) => warn!("Skipping static file {}: {}", key, e),
            }
        }
        report.remove(self.paths.config_file());
        report.remove(self.paths.secret_file());

        let db_file = self.paths.db_file();
        report.remove(sidecar(&db_file, "-journal"));
        report.remove(sidecar(&db_file, "-wal"));
        report.remove(sidecar(&db_file, "-shm"));
        report.remove(db_file);

        info!(
            "Reset {}: {} removed, {} absent, {} failed",
            self.paths.local.display(),
            report.removed.len(),
            report.absent.len(),
            report.failed.len()
        );
        report
    }
}

/// Content of a member the install cannot work without
fn read_required<'a>(archive: &'a BatchArchive, name: &str) -> Result<&'a [u8]> {
    match archive.read(name) {
        Ok(content) if !content.is_empty() => Ok(content),
        Ok(_) => Err(Error::IncomingIntegrity(format!(
            "{}|{}: file is empty",
            archive.name(),
            name
        ))),
        Err(_) => Err(Error::IncomingIntegrity(format!(
            "{}|{}: file required by the configuration but missing from archive",
            archive.name(),
            name
        ))),
    }
}

fn sidecar(db_file: &Path, suffix: &str) -> PathBuf {
    let mut name = db_file.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn list_dir(paths: &ProvPaths, dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    for entry in entries {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if !paths.is_ignored(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
