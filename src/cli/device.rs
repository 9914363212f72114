// src/cli/device.rs
//! Device-facing commands
//!
//! Output goes to stdout unchanged; failures print a fault reason only.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// Issue a set and print the project configuration
    FetchConfig,

    /// Print a declared static or dynamic file
    ReadFile {
        /// File key, e.g. wifi.cert
        key: String,
    },

    /// Confirm receipt of the issued set
    Done,

    /// Print the device's purge code
    PurgeCode,
}
