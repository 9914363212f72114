// src/commands/device.rs

//! Device-facing command
//!
//! Whatever goes wrong, the device only learns the fault reason.

use crate::cli::DeviceCommands;
use provsys::{DeviceRequest, Fault, ProvPaths, Provisioning};
use std::io::{self, Write};

/// Run one device operation, printing its output on stdout
pub fn cmd_device(
    paths: &ProvPaths,
    request: DeviceRequest,
    command: DeviceCommands,
) -> Result<(), Fault> {
    let provisioning = Provisioning::new(paths.clone(), request).map_err(|e| e.fault())?;

    let output = match command {
        DeviceCommands::FetchConfig => provisioning
            .fetch_config()
            .map(String::into_bytes)
            .map_err(|e| e.fault())?,
        DeviceCommands::ReadFile { key } => {
            provisioning.read_file(&key).map_err(|e| e.fault())?
        }
        DeviceCommands::Done => provisioning
            .set_done()
            .map(String::into_bytes)
            .map_err(|e| e.fault())?,
        DeviceCommands::PurgeCode => provisioning.purge_code().into_bytes(),
    };

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&output)
        .and_then(|()| stdout.flush())
        .map_err(|_| Fault::Internal)
}
