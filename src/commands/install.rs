// src/commands/install.rs
//! Install, remove and update commands

use super::{parse_requests, print_report};
use anyhow::Result;
use googet::Manager;
use tracing::info;

/// Install packages from the configured repositories
pub fn cmd_install(manager: &Manager, packages: &[String], reinstall: bool) -> Result<()> {
    let requests = parse_requests(packages)?;
    info!("Installing {}", packages.join(", "));
    let report = manager.install(&requests, reinstall)?;
    print_report(&report);
    Ok(())
}

/// Remove installed packages and their dependents
pub fn cmd_remove(manager: &Manager, packages: &[String], dbonly: bool) -> Result<()> {
    let requests = parse_requests(packages)?;
    info!("Removing {}", packages.join(", "));
    let report = manager.remove(&requests, dbonly)?;
    print_report(&report);
    Ok(())
}

/// Apply every available update
pub fn cmd_update(manager: &Manager) -> Result<()> {
    let report = manager.update()?;
    print_report(&report);
    Ok(())
}

/// List available updates
pub fn cmd_check(manager: &Manager) -> Result<()> {
    let updates = manager.check()?;
    if updates.is_empty() {
        println!("No updates available.");
        return Ok(());
    }

    println!("Available updates:");
    for update in &updates {
        let marker = if update.is_rollback() { " (rollback)" } else { "" };
        println!(
            "  {} {} -> {}{}  [{}]",
            update.key,
            update.installed,
            update.available(),
            marker,
            update.target.repo_url
        );
    }
    println!("\nTotal: {} update(s)", updates.len());
    Ok(())
}
