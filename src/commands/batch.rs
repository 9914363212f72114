// src/commands/batch.rs

//! Install-level commands: status, import, backup and reset

use anyhow::Result;
use chrono::Utc;
use provsys::{LocalState, ProvPaths, ProvSystem};
use tracing::info;

/// Show install state and pool statistics
pub fn cmd_status(paths: &ProvPaths) -> Result<()> {
    let system = ProvSystem::new(paths.clone());

    match system.state() {
        LocalState::Uninitialized => {
            println!("Provisioning system: not initialized");
            println!("\nUse 'provsys import <batch>' to initialize it from a first batch.");
        }
        LocalState::Inconsistent(failures) => {
            println!("Provisioning system: INCONSISTENT");
            for failure in &failures {
                println!("  {}", failure);
            }
            println!("\nUse 'provsys reset --yes' to start over, or restore a backup.");
        }
        LocalState::Initialized(cfg) => {
            let conn = system.connect()?;
            let counts = provsys::ProvSet::counts(&conn)?;
            let batches = provsys::ProvSet::batches(&conn)?;

            println!("Provisioning system: initialized");
            println!("  Project:  {}", cfg.project());
            println!("  Root:     {}", paths.local.display());
            println!("  Batches:  {}", batches.len());
            println!("  Sets:     {}", counts.total);
            println!("  Free:     {}", counts.free);
            println!("  Pending:  {}", counts.pending);
            if counts.free == 0 && counts.total > 0 {
                println!("\nWarning: the set pool is exhausted.");
            }
        }
    }

    Ok(())
}

/// List inbound batches
pub fn cmd_batches(paths: &ProvPaths) -> Result<()> {
    let system = ProvSystem::new(paths.clone());
    let batches = system.list_batches()?;

    if batches.is_empty() {
        println!("No batches in {}", paths.inbound.display());
        return Ok(());
    }

    println!("Batches ({}):", batches.len());
    for batch in &batches {
        let marker = if batch.imported { "imported" } else { "new" };
        println!("  {:<40} {}", batch.name, marker);
    }

    Ok(())
}

/// Import one inbound batch
pub fn cmd_import(paths: &ProvPaths, batch: &str) -> Result<()> {
    let system = ProvSystem::new(paths.clone());
    let summary = system.import_batch(batch)?;

    if summary.initialized {
        println!("Initialized provisioning system from batch {}", summary.batch);
    }
    println!("Imported {} set(s) from batch {}", summary.sets, summary.batch);
    Ok(())
}

/// Backup name used when none is given
pub fn default_backup_name() -> String {
    format!("PROV-BACKUP_{}.tar.gz", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// Write a backup of the local install
pub fn cmd_backup(paths: &ProvPaths, name: Option<&str>) -> Result<()> {
    let system = ProvSystem::new(paths.clone());
    let name = name.map(String::from).unwrap_or_else(default_backup_name);

    let target = system.export_backup(&name)?;
    println!("Backup written to {}", target.display());
    Ok(())
}

/// List outbound backups
pub fn cmd_backups(paths: &ProvPaths) -> Result<()> {
    let system = ProvSystem::new(paths.clone());
    let backups = system.list_backups()?;

    if backups.is_empty() {
        println!("No backups in {}", paths.outbound.display());
        return Ok(());
    }

    println!("Backups ({}):", backups.len());
    for backup in &backups {
        println!("  {}", backup);
    }
    Ok(())
}

/// Remove the local install
pub fn cmd_reset(paths: &ProvPaths, yes: bool) -> Result<()> {
    if !yes {
        return Err(anyhow::anyhow!(
            "Refusing to reset {} without --yes",
            paths.local.display()
        ));
    }

    let system = ProvSystem::new(paths.clone());
    let report = system.reset()?;
    info!("Reset finished, {} artifact(s) removed", report.removed.len());

    for path in &report.removed {
        println!("  removed  {}", path.display());
    }
    for (path, err) in &report.failed {
        println!("  FAILED   {} ({})", path.display(), err);
    }

    if !report.is_clean() {
        return Err(anyhow::anyhow!(
            "{} artifact(s) could not be removed",
            report.failed.len()
        ));
    }
    println!("Provisioning system reset.");
    Ok(())
}
