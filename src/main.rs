// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, SetCommands};
use provsys::{DeviceRequest, ProvPaths};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries device output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = ProvPaths::from_prefix(&cli.prefix).with_ignored(cli.ignore);

    match cli.command {
        Commands::Status => commands::cmd_status(&paths),
        Commands::Batches => commands::cmd_batches(&paths),
        Commands::Import { batch } => commands::cmd_import(&paths, &batch),
        Commands::Backup { name } => commands::cmd_backup(&paths, name.as_deref()),
        Commands::Backups => commands::cmd_backups(&paths),
        Commands::Reset { yes } => commands::cmd_reset(&paths, yes),
        Commands::Set(set_cmd) => match set_cmd {
            SetCommands::List { batch, pending } => {
                commands::cmd_set_list(&paths, batch.as_deref(), pending)
            }
            SetCommands::Show { id } => commands::cmd_set_show(&paths, &id),
            SetCommands::Comment { id, text } => {
                commands::cmd_set_comment(&paths, &id, text.as_deref())
            }
            SetCommands::Assign { id, dev_id } => commands::cmd_set_assign(&paths, &id, &dev_id),
            SetCommands::Unassign { id } => commands::cmd_set_unassign(&paths, &id),
        },
        Commands::Device {
            dev_id,
            prod_id,
            fw_ver,
            command,
        } => {
            let request = DeviceRequest::new(dev_id, prod_id, fw_ver);
            if let Err(fault) = commands::cmd_device(&paths, request, command) {
                println!("{}", fault.reason());
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
