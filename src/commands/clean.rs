// src/commands/clean.rs
//! Cache cleanup command

use anyhow::Result;
use googet::Manager;
use googet::clean::CleanMode;

pub fn cmd_clean(manager: &Manager, all: bool, packages: Option<Vec<String>>) -> Result<()> {
    let mode = match (all, packages) {
        (true, _) => CleanMode::All,
        (false, Some(names)) => CleanMode::Packages(
            names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        ),
        (false, None) => CleanMode::Uninstalled,
    };

    let report = manager.clean(&mode)?;
    for path in &report.removed {
        println!("Removed {}", path.display());
    }
    println!("Removed {} cache entries", report.removed.len());
    if !report.failed.is_empty() {
        println!("Failed to remove {} entries; see the log for details", report.failed.len());
    }
    Ok(())
}
