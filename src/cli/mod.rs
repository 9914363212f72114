// src/cli/mod.rs
//! CLI definitions for the provisioning system
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Administrative commands:
//! - `status` - Install state and pool statistics
//! - `batches` / `import` - Inbound batches
//! - `backup` / `backups` - Outbound backups
//! - `reset` - Remove the local install
//! - `set` - Inspect and edit individual sets
//!
//! Device commands:
//! - `device` - Act on behalf of one device

use clap::{Parser, Subcommand};

mod device;
mod set;

pub use device::DeviceCommands;
pub use set::SetCommands;

#[derive(Parser)]
#[command(name = "provsys")]
#[command(author = "provsys contributors")]
#[command(version)]
#[command(about = "Provisioning backend: batch import and per-device credential issuance", long_about = None)]
pub struct Cli {
    /// Root under which PROV/, IMPORT/ and EXPORT/ live
    #[arg(long, global = true, env = "PROVSYS_PREFIX", default_value = provsys::paths::DEFAULT_PREFIX)]
    pub prefix: String,

    /// Extra directory entries to hide from batch and backup listings
    #[arg(long, global = true, env = "PROVSYS_IGNORE", value_delimiter = ',')]
    pub ignore: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show install state and set counts
    Status,

    /// List inbound batches and whether they are imported
    Batches,

    /// Import an inbound batch
    ///
    /// The first batch initializes the install from its configuration,
    /// secret and static files. Later batches must carry the same
    /// configuration.
    Import {
        /// Batch file name in the inbound directory
        batch: String,
    },

    /// Archive the local install into the outbound directory
    Backup {
        /// Backup file name (default: PROV-BACKUP_<UTC timestamp>.tar.gz)
        name: Option<String>,
    },

    /// List outbound backups
    Backups,

    /// Remove config, secret, static files and the set table
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Set inspection and editing
    #[command(subcommand)]
    Set(SetCommands),

    /// Act as a device
    Device {
        /// Device identifier
        #[arg(long)]
        dev_id: String,

        /// Product identifier
        #[arg(long)]
        prod_id: String,

        /// Firmware version
        #[arg(long)]
        fw_ver: String,

        #[command(subcommand)]
        command: DeviceCommands,
    },
}
