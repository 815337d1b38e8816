// src/commands/mod.rs
//! Command handlers for the GooGet CLI

mod clean;
mod install;
mod query;
mod repo;

pub use clean::cmd_clean;
pub use install::{cmd_check, cmd_install, cmd_remove, cmd_update};
pub use query::{cmd_installed, cmd_verify};
pub use repo::{cmd_addrepo, cmd_listrepos, cmd_rmrepo};

use googet::packages::PackageRequest;
use googet::transaction::ExecutionReport;

/// Parse command-line package arguments
fn parse_requests(packages: &[String]) -> googet::Result<Vec<PackageRequest>> {
    packages.iter().map(|p| PackageRequest::parse(p)).collect()
}

/// Print what an executed plan did
fn print_report(report: &ExecutionReport) {
    if report.is_empty() {
        println!("Nothing to do.");
        return;
    }
    for key in &report.removed {
        println!("Removed {}", key);
    }
    for ident in &report.installed {
        println!("Installed {}", ident);
    }
    for ident in &report.reinstalled {
        println!("Reinstalled {}", ident);
    }
}
