// src/commands/query.rs
//! Installed-state queries

use super::parse_requests;
use anyhow::Result;
use googet::Manager;
use googet::db::models::PackageState;

/// List installed packages
pub fn cmd_installed(manager: &Manager, filter: Option<&str>, info: bool) -> Result<()> {
    let states = manager.installed(filter)?;
    if states.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    println!("Installed packages:");
    for state in &states {
        if info {
            print_info(state);
        } else {
            println!("  {}", state.spec);
        }
    }
    println!("\nTotal: {} package(s)", states.len());
    Ok(())
}

fn print_info(state: &PackageState) {
    let spec = &state.spec;
    println!("  {}", spec);
    if let Some(description) = &spec.description {
        println!("    Description: {}", description);
    }
    if let Some(authors) = &spec.authors {
        println!("    Authors: {}", authors);
    }
    if let Some(license) = &spec.license {
        println!("    License: {}", license);
    }
    if let Some(source_url) = &spec.source_url {
        println!("    Source: {}", source_url);
    }
    if !spec.dependencies.is_empty() {
        let deps: Vec<String> = spec
            .dependencies
            .iter()
            .map(|(name, min)| format!("{} >= {}", name, min))
            .collect();
        println!("    Dependencies: {}", deps.join(", "));
    }
    println!("    Download URL: {}", state.download_url);
    match &state.local_path {
        Some(path) => println!("    Cached archive: {}", path.display()),
        None => println!("    Cached archive: (none)"),
    }
    println!("    Checksum: {}", state.checksum);
    println!("    Files: {}", state.installed_files.len());
    if let Some(code) = state.install_exit_code {
        println!("    Install exit code: {}", code);
    }
    println!("    Installed at: {}", state.installed_at);
}

/// Verify installed packages; fails if any check fails
pub fn cmd_verify(manager: &Manager, packages: &[String]) -> Result<()> {
    let requests = parse_requests(packages)?;
    let reports = manager.verify(&requests)?;

    let mut failed = 0;
    for report in &reports {
        if report.is_ok() {
            println!("  {} OK", report.ident);
            continue;
        }
        failed += 1;
        println!("  {} FAILED", report.ident);
        for path in &report.missing {
            println!("    missing: {}", path.display());
        }
        for path in &report.modified {
            println!("    modified: {}", path.display());
        }
        if report.script_ok == Some(false) {
            println!("    verify script failed");
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} package(s) failed verification", failed, reports.len());
    }
    println!("\nVerified {} package(s)", reports.len());
    Ok(())
}
