// src/issue.rs

//! Issuance of provisioning sets to devices
//!
//! A [`Provisioning`] is built per device request. It verifies the install
//! once, then every operation opens its own connection so concurrent
//! requests only meet inside SQLite.
//!
//! Every device operation goes through [`Provisioning::fetch_set`] first,
//! which is safe to repeat: a set that is issued but not yet confirmed keeps
//! its counter, so retried requests are not counted twice.

use crate::config::{FileKind, ProjectConfig};
use crate::db;
use crate::db::models::ProvSet;
use crate::error::{Error, Result};
use crate::hash::purge_code;
use crate::integrity::require_initialized;
use crate::paths::ProvPaths;
use std::fmt;
use std::fs;
use tracing::{error, info};

/// Identity a device presents with every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub dev_id: String,
    pub prod_id: String,
    pub fw_ver: String,
}

impl DeviceRequest {
    pub fn new(
        dev_id: impl Into<String>,
        prod_id: impl Into<String>,
        fw_ver: impl Into<String>,
    ) -> Self {
        Self {
            dev_id: dev_id.into(),
            prod_id: prod_id.into(),
            fw_ver: fw_ver.into(),
        }
    }
}

/// A set bound to the requesting device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSet {
    pub set: ProvSet,
    /// Authorizes a later factory reset of the device
    pub purge_code: String,
}

/// One device request against an initialized install
#[derive(Debug)]
pub struct Provisioning {
    paths: ProvPaths,
    request: DeviceRequest,
    config: ProjectConfig,
    secret: Vec<u8>,
}

impl Provisioning {
    /// Fails with [`Error::Uninitialized`] unless the install is complete
    pub fn new(paths: ProvPaths, request: DeviceRequest) -> Result<Self> {
        let config = require_initialized(&paths)?;
        let secret = fs::read(paths.secret_file())?;
        Ok(Self {
            paths,
            request,
            config,
            secret,
        })
    }

    /// Bind a set to the device, or return the one it already has
    pub fn fetch_set(&self) -> Result<IssuedSet> {
        let mut conn = db::open(&self.paths.db_file())?;
        let set = ProvSet::allocate(
            &mut conn,
            &self.request.dev_id,
            &self.request.prod_id,
            &self.request.fw_ver,
            &self.config.dynamic_file_keys(),
        )?;
        Ok(IssuedSet {
            set,
            purge_code: self.purge_code(),
        })
    }

    /// Purge code of the requesting device
    pub fn purge_code(&self) -> String {
        purge_code(&self.request.dev_id, &self.secret).into_string()
    }

    /// Issue a set and return the project configuration
    pub fn fetch_config(&self) -> Result<String> {
        self.fetch_set()?;
        Ok(serde_json::to_string_pretty(self.config.document())?)
    }

    /// Content of a declared file for this device
    ///
    /// Static files come from the install root, dynamic files from the set
    /// issued to the device.
    pub fn read_file(&self, key: &str) -> Result<Vec<u8>> {
        let issued = self.fetch_set()?;
        match self.config.file_kind(key) {
            Some(FileKind::Static) => {
                let path = self.paths.static_file(key)?;
                Ok(fs::read(path)?)
            }
            Some(FileKind::Dynamic) => issued
                .set
                .payload(key)
                .map(|content| content.to_vec())
                .ok_or_else(|| Error::NotFound(key.to_string())),
            None => Err(Error::NotFound(key.to_string())),
        }
    }

    /// Confirm receipt; returns the device, product and firmware lines
    pub fn set_done(&self) -> Result<String> {
        let issued = self.fetch_set()?;
        self.complete()?;
        info!("Device {} confirmed set {}", self.request.dev_id, issued.set.id);
        Ok(format!(
            "{}\n{}\n{}",
            issued.set.dev_id.as_deref().unwrap_or_default(),
            issued.set.prod_id.as_deref().unwrap_or_default(),
            issued.set.fw_ver.as_deref().unwrap_or_default()
        ))
    }

    /// Mark the device's set as confirmed
    pub fn complete(&self) -> Result<bool> {
        let conn = db::open(&self.paths.db_file())?;
        ProvSet::complete(&conn, &self.request.dev_id)
    }
}

/// Device-safe failure reason
///
/// Devices only ever see one of these; the underlying error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Uninitialized,
    NoFreeSets,
    NotFound,
    Internal,
}

impl Fault {
    pub fn reason(&self) -> &'static str {
        match self {
            Fault::Uninitialized => "UNINITIALIZED",
            Fault::NoFreeSets => "NO_FREE_SETS",
            Fault::NotFound => "NOT_FOUND",
            Fault::Internal => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl From<&Error> for Fault {
    fn from(err: &Error) -> Self {
        match err {
            Error::Uninitialized(_) => Fault::Uninitialized,
            Error::NoFreeSets => Fault::NoFreeSets,
            Error::NotFound(_) | Error::PathTraversal(_) | Error::InvalidPath(_) => Fault::NotFound,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => Fault::NotFound,
            other => {
                error!("Provisioning request failed: {}", other);
                Fault::Internal
            }
        }
    }
}

impl Error {
    /// Device-facing view of this error
    pub fn fault(&self) -> Fault {
        Fault::from(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_mapping() {
        assert_eq!(
            Error::Uninitialized("x".to_string()).fault(),
            Fault::Uninitialized
        );
        assert_eq!(Error::NoFreeSets.fault(), Fault::NoFreeSets);
        assert_eq!(Error::NotFound("k".to_string()).fault(), Fault::NotFound);
        assert_eq!(
            Error::PathTraversal("../x".to_string()).fault(),
            Fault::NotFound
        );
        assert_eq!(
            Error::LocalIntegrity("torn".to_string()).fault(),
            Fault::Internal
        );
        assert_eq!(
            Error::Storage(rusqlite::Error::InvalidQuery).fault(),
            Fault::Internal
        );
    }

    #[test]
    fn test_fault_reason_hides_detail() {
        let err = Error::Storage(rusqlite::Error::InvalidQuery);
        assert_eq!(err.fault().to_string(), "INTERNAL_ERROR");
        assert_eq!(Fault::NoFreeSets.reason(), "NO_FREE_SETS");
    }
}
