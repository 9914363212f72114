// src/commands/set.rs

//! Set inspection and editing commands

use anyhow::Result;
use provsys::{ProvPaths, ProvSet, ProvSystem};
use tracing::info;

/// List sets
pub fn cmd_set_list(paths: &ProvPaths, batch: Option<&str>, pending: bool) -> Result<()> {
    let (_, conn) = ProvSystem::new(paths.clone()).session()?;

    let sets: Vec<ProvSet> = ProvSet::list_all(&conn)?
        .into_iter()
        .filter(|s| batch.is_none_or(|b| s.batch == b))
        .filter(|s| !pending || s.is_pending())
        .collect();

    if sets.is_empty() {
        println!("No sets found.");
        return Ok(());
    }

    println!("Sets ({}):", sets.len());
    for set in &sets {
        let device = set.dev_id.as_deref().unwrap_or("-");
        let state = if set.is_pending() { " [pending]" } else { "" };
        println!(
            "  {:<24} {:<24} {:<20} downloads={}{}",
            set.id,
            set.batch,
            device,
            set.downloads(),
            state
        );
    }
    Ok(())
}

/// Show one set without its payloads
pub fn cmd_set_show(paths: &ProvPaths, id: &str) -> Result<()> {
    let (cfg, conn) = ProvSystem::new(paths.clone()).session()?;
    let keys = cfg.dynamic_file_keys();

    let set = ProvSet::find_by_id(&conn, id, &keys)?
        .ok_or_else(|| anyhow::anyhow!("Set '{}' not found", id))?;

    println!("Set: {}", set.id);
    println!("  Batch:      {}", set.batch);
    println!("  Imported:   {}", set.imported_at.as_deref().unwrap_or("-"));
    println!("  Device:     {}", set.dev_id.as_deref().unwrap_or("-"));
    println!("  Product:    {}", set.prod_id.as_deref().unwrap_or("-"));
    println!("  Firmware:   {}", set.fw_ver.as_deref().unwrap_or("-"));
    println!("  Downloads:  {}", set.downloads());
    if set.is_pending() {
        println!("  Status:     issued, not confirmed");
    }
    if let Some(at) = &set.downloaded_at {
        println!("  Last issue: {}", at);
    }
    if let Some(comment) = &set.comment {
        println!("  Comment:    {}", comment);
    }
    println!("  Files:");
    for (key, content) in &set.payloads {
        println!("    {} ({} bytes)", key, content.len());
    }
    Ok(())
}

/// Set or clear a comment
pub fn cmd_set_comment(paths: &ProvPaths, id: &str, text: Option<&str>) -> Result<()> {
    let (_, conn) = ProvSystem::new(paths.clone()).session()?;

    if !ProvSet::set_comment(&conn, id, text)? {
        return Err(anyhow::anyhow!("Set '{}' not found", id));
    }
    match text {
        Some(text) => println!("Comment on {} set to: {}", id, text),
        None => println!("Comment on {} cleared", id),
    }
    Ok(())
}

/// Pin a free set to a device
pub fn cmd_set_assign(paths: &ProvPaths, id: &str, dev_id: &str) -> Result<()> {
    let (_, conn) = ProvSystem::new(paths.clone()).session()?;

    if !ProvSet::assign(&conn, id, dev_id)? {
        return Err(anyhow::anyhow!(
            "Set '{}' not found or already assigned to a device",
            id
        ));
    }
    info!("Assigned set {} to device {}", id, dev_id);
    println!("Assigned set {} to device {}", id, dev_id);
    Ok(())
}

/// Release a set from its device
pub fn cmd_set_unassign(paths: &ProvPaths, id: &str) -> Result<()> {
    let (_, conn) = ProvSystem::new(paths.clone()).session()?;

    if !ProvSet::unassign(&conn, id)? {
        return Err(anyhow::anyhow!("Set '{}' not found", id));
    }
    info!("Unassigned set {}", id);
    println!("Set {} is free again", id);
    Ok(())
}
