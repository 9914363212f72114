// src/integrity.rs

//! Consistency checks for the local install and for incoming batches
//!
//! The local install is inspected with independent checks. If every check fails
//! the install was never set up; if every check passes it is usable. Any
//! mix means a torn install (a crash during first import, a hand-deleted
//! file, ...) and is reported as [`Error::LocalIntegrity`] rather than being
//! mistaken for a fresh system. The config is checked twice, for presence
//! and for parseability, so an unparsable config on its own still counts as
//! a mixed result.

use crate::archive::BatchArchive;
use crate::config::ProjectConfig;
use crate::db;
use crate::db::schema::table_columns;
use crate::error::{Error, Result};
use crate::filesystem::is_non_empty_file;
use crate::paths::{CONFIG_FILE, ProvPaths, SETS_DIR};
use tracing::debug;

/// State of the local install
#[derive(Debug)]
pub enum LocalState {
    /// Nothing installed yet
    Uninitialized,
    /// Everything present and valid
    Initialized(ProjectConfig),
    /// Partially installed; diagnostics of the failed checks in check order
    Inconsistent(Vec<String>),
}

impl LocalState {
    pub fn is_initialized(&self) -> bool {
        matches!(self, LocalState::Initialized(_))
    }

    /// Config of an initialized install, `None` when uninitialized
    ///
    /// An inconsistent install yields its first diagnostic as
    /// [`Error::LocalIntegrity`].
    pub fn into_config(self) -> Result<Option<ProjectConfig>> {
        match self {
            LocalState::Uninitialized => Ok(None),
            LocalState::Initialized(cfg) => Ok(Some(cfg)),
            LocalState::Inconsistent(failures) => Err(Error::LocalIntegrity(
                failures.into_iter().next().unwrap_or_default(),
            )),
        }
    }
}

/// Inspect the local install
pub fn inspect_local(paths: &ProvPaths) -> LocalState {
    let config_file = paths.config_file();
    let db_file = paths.db_file();
    let secret_file = paths.secret_file();

    let config_exists = if is_non_empty_file(&config_file) {
        Ok(())
    } else {
        Err(format!("{}: expected a non-empty file", config_file.display()))
    };

    let config = ProjectConfig::load(&config_file);
    let config_parses = match &config {
        Ok(_) => Ok(()),
        Err(e) => Err(format!(
            "{}: expected a parsable project configuration ({})",
            config_file.display(),
            e
        )),
    };

    let secret_exists = if is_non_empty_file(&secret_file) {
        Ok(())
    } else {
        Err(format!("{}: expected a non-empty file", secret_file.display()))
    };

    let db_exists = if is_non_empty_file(&db_file) {
        Ok(())
    } else {
        Err(format!("{}: expected a non-empty SQLite database", db_file.display()))
    };

    let static_files = match &config {
        Ok(cfg) => check_static_files(paths, cfg),
        Err(_) => Err("static files: project configuration unavailable".to_string()),
    };

    let dynamic_columns = match &config {
        Ok(cfg) => check_dynamic_columns(paths, cfg),
        Err(_) => Err("set table: project configuration unavailable".to_string()),
    };

    let results = [
        config_exists,
        config_parses,
        secret_exists,
        db_exists,
        static_files,
        dynamic_columns,
    ];
    let failures: Vec<String> = results.into_iter().filter_map(|r| r.err()).collect();
    debug!("local install checks: {} failed", failures.len());

    match (failures.len(), config) {
        (0, Ok(cfg)) => LocalState::Initialized(cfg),
        (6, _) => LocalState::Uninitialized,
        _ => LocalState::Inconsistent(failures),
    }
}

fn check_static_files(paths: &ProvPaths, cfg: &ProjectConfig) -> std::result::Result<(), String> {
    for key in cfg.static_file_keys() {
        let path = paths.static_file(&key).map_err(|e| e.to_string())?;
        if !is_non_empty_file(&path) {
            return Err(format!("{}: expected a non-empty file", path.display()));
        }
    }
    Ok(())
}

fn check_dynamic_columns(paths: &ProvPaths, cfg: &ProjectConfig) -> std::result::Result<(), String> {
    let db_file = paths.db_file();
    let conn = db::open(&db_file).map_err(|e| format!("{}: {}", db_file.display(), e))?;
    let columns = table_columns(&conn).map_err(|e| format!("{}: {}", db_file.display(), e))?;
    if columns.is_empty() {
        return Err(format!("{}: no set table", db_file.display()));
    }
    for key in cfg.dynamic_file_keys() {
        if !columns.contains(&key) {
            return Err(format!("{key}: no such column in set table"));
        }
    }
    Ok(())
}

/// Local config, `None` when uninitialized, error when inconsistent
pub fn check_local(paths: &ProvPaths) -> Result<Option<ProjectConfig>> {
    inspect_local(paths).into_config()
}

/// Local config of an initialized install
pub fn require_initialized(paths: &ProvPaths) -> Result<ProjectConfig> {
    check_local(paths)?.ok_or_else(|| {
        Error::Uninitialized("import a first batch to initialize the system".to_string())
    })
}

/// A batch must carry a config and a `sets` directory
pub fn validate_batch_structure(archive: &BatchArchive) -> Result<()> {
    if archive.contains(CONFIG_FILE) && archive.contains(SETS_DIR) {
        Ok(())
    } else {
        Err(Error::IncomingIntegrity(format!(
            "{}: expected a provisioning import archive with {} and {}/",
            archive.name(),
            CONFIG_FILE,
            SETS_DIR
        )))
    }
}

/// A batch for an initialized install must carry the same config
///
/// Returns the local config.
pub fn validate_batch_compatibility(
    paths: &ProvPaths,
    archive: &BatchArchive,
) -> Result<ProjectConfig> {
    let local = require_initialized(paths)?;

    let incoming = archive
        .read(CONFIG_FILE)
        .and_then(|bytes| ProjectConfig::parse(bytes))
        .map_err(|e| {
            Error::IncomingIntegrity(format!("{}|{}: {}", archive.name(), CONFIG_FILE, e))
        })?;

    if !local.is_same_as(&incoming) {
        return Err(Error::IncomingIntegrity(format!(
            "{} vs {}|{}: configuration incompatible with the installed one",
            paths.config_file().display(),
            archive.name(),
            CONFIG_FILE
        )));
    }
    Ok(local)
}
