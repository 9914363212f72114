// src/commands/mod.rs
//! Command handlers for the provsys CLI

mod batch;
mod device;
mod set;

// Re-export all command handlers
pub use batch::{
    cmd_backup, cmd_backups, cmd_batches, cmd_import, cmd_reset, cmd_status, default_backup_name,
};
pub use device::cmd_device;
pub use set::{cmd_set_assign, cmd_set_comment, cmd_set_list, cmd_set_show, cmd_set_unassign};
