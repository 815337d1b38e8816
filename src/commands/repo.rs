// src/commands/repo.rs
//! Repository management commands

use anyhow::{Context, Result};
use googet::config::Environment;
use googet::repository::config::{self, RepoEntry};
use googet::repository::parse_priority;
use tracing::info;

/// Add a repository entry to a `.repo` file
pub fn cmd_addrepo(
    env: &Environment,
    name: &str,
    url: &str,
    file: Option<&str>,
    priority: &str,
) -> Result<()> {
    let priority = parse_priority(priority)?;
    info!("Adding repository: {} ({})", name, url);

    let entry = RepoEntry::new(name, url, priority);
    let path = config::add_repo(&env.repo_dir, file, entry)
        .with_context(|| format!("Failed to add repository '{}'", name))?;

    println!("Added repository: {}", name);
    println!("  URL: {}", url);
    println!("  Priority: {}", priority);
    println!("  File: {}", path.display());
    Ok(())
}

/// Remove a repository entry by name
pub fn cmd_rmrepo(env: &Environment, name: &str) -> Result<()> {
    info!("Removing repository: {}", name);
    let path = config::remove_repo(&env.repo_dir, name)?;
    println!("Removed repository {} from {}", name, path.display());
    Ok(())
}

/// List repositories from every `.repo` file
pub fn cmd_listrepos(env: &Environment) -> Result<()> {
    let repos = config::list_repos(&env.repo_dir)?;
    if repos.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    println!("Repositories:");
    for (path, entry) in repos {
        println!("  {} (priority: {})", entry.name, entry.priority);
        println!("      {}", entry.url);
        println!("      from {}", path.display());
    }
    Ok(())
}
