// src/cli.rs
//! CLI definitions for the GooGet package manager
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "googet")]
#[command(author, version, about = "Package manager with prioritized repositories and rollback repos", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Installation root (overrides GOOGETROOT)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages and their dependencies
    Install {
        /// Packages as name, name.arch or name.arch.version
        #[arg(required = true)]
        packages: Vec<String>,

        /// Reinstall packages that are already installed
        #[arg(long)]
        reinstall: bool,
    },

    /// Remove packages and everything that depends on them
    Remove {
        /// Installed packages as name, name.arch or name.arch.version
        #[arg(required = true)]
        packages: Vec<String>,

        /// Only drop the database records; skip scripts and file deletion
        #[arg(long)]
        dbonly: bool,
    },

    /// Move installed packages to the winning repository version
    Update,

    /// Show available updates without applying them
    Check,

    /// Delete entries from the download cache
    Clean {
        /// Delete everything in the cache
        #[arg(long, conflicts_with = "packages")]
        all: bool,

        /// Comma-separated names whose cached archives are deleted
        #[arg(long, value_delimiter = ',')]
        packages: Option<Vec<String>>,
    },

    /// Add a repository
    Addrepo {
        /// Repository name
        name: String,

        /// Repository base URL
        url: String,

        /// Repo file to add the entry to (must end in .repo)
        #[arg(long)]
        file: Option<String>,

        /// Integer or one of Default, Canary, Pin, Rollback
        #[arg(long, default_value = "default")]
        priority: String,
    },

    /// Remove a repository by name
    Rmrepo {
        /// Repository name
        name: String,
    },

    /// List configured repositories
    Listrepos,

    /// List installed packages
    Installed {
        /// Only show packages whose name contains this string
        filter: Option<String>,

        /// Show full package details
        #[arg(long)]
        info: bool,
    },

    /// Check installed files and run verify scripts
    Verify {
        /// Installed packages to verify (all if omitted)
        packages: Vec<String>,
    },
}
