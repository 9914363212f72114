// src/lib.rs

//! Provisioning backend
//!
//! Imports batches of per-device credential sets from tar archives and hands
//! them out to devices, one set per device.
//!
//! # Architecture
//!
//! - Filesystem-first install: config, secret and static files live as plain
//!   files under the install root; sets live in one SQLite table
//! - First import initializes: the first batch defines the project, later
//!   batches must match it
//! - Crash-safe issuance: a negative download counter marks a set handed out
//!   but not yet confirmed by its device
//! - Torn installs are detected, never mistaken for fresh ones

pub mod archive;
pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod hash;
pub mod import;
pub mod integrity;
pub mod issue;
pub mod lock;
pub mod paths;

pub use archive::BatchArchive;
pub use config::{FileKind, ProjectConfig, same_config};
pub use db::models::{NewSet, ProvSet, SetCounts};
pub use error::{Error, Result};
pub use import::{BatchInfo, ImportSummary, ProvSystem, ResetReport};
pub use integrity::LocalState;
pub use issue::{DeviceRequest, Fault, IssuedSet, Provisioning};
pub use paths::ProvPaths;
