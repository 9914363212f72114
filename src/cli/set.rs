// src/cli/set.rs
//! Set inspection and editing commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum SetCommands {
    /// List all sets
    List {
        /// Only sets of this batch
        #[arg(long)]
        batch: Option<String>,

        /// Only sets issued but not confirmed
        #[arg(long)]
        pending: bool,
    },

    /// Show one set
    Show {
        /// Set identifier
        id: String,
    },

    /// Set or clear the comment of a set
    Comment {
        /// Set identifier
        id: String,

        /// Comment text (clears the comment if omitted)
        text: Option<String>,
    },

    /// Pin an unassigned set to a device
    Assign {
        /// Set identifier
        id: String,

        /// Device identifier
        dev_id: String,
    },

    /// Release a set from its device
    Unassign {
        /// Set identifier
        id: String,
    },
}
