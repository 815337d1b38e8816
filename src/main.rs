// src/main.rs

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use googet::Manager;
use googet::config::Environment;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            debug!("{:?}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let env = Environment::discover(cli.global.root)?;
    debug!("Using root {}", env.root.display());

    // Ctrl-C is observed through the shared cancel token
    let cancel = env.cancel.clone();
    ctrlc::set_handler(move || cancel.cancel()).context("Failed to set signal handler")?;

    match cli.command {
        Commands::Install {
            packages,
            reinstall,
        } => commands::cmd_install(&Manager::new(env)?, &packages, reinstall),
        Commands::Remove { packages, dbonly } => {
            commands::cmd_remove(&Manager::new(env)?, &packages, dbonly)
        }
        Commands::Update => commands::cmd_update(&Manager::new(env)?),
        Commands::Check => commands::cmd_check(&Manager::new(env)?),
        Commands::Clean { all, packages } => {
            commands::cmd_clean(&Manager::new(env)?, all, packages)
        }
        Commands::Addrepo {
            name,
            url,
            file,
            priority,
        } => commands::cmd_addrepo(&env, &name, &url, file.as_deref(), &priority),
        Commands::Rmrepo { name } => commands::cmd_rmrepo(&env, &name),
        Commands::Listrepos => commands::cmd_listrepos(&env),
        Commands::Installed { filter, info } => {
            commands::cmd_installed(&Manager::new(env)?, filter.as_deref(), info)
        }
        Commands::Verify { packages } => commands::cmd_verify(&Manager::new(env)?, &packages),
    }
}

/// Exit code of the first GooGet error in the chain; 1 otherwise
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<googet::Error>())
        .map(googet::Error::exit_code)
        .unwrap_or(1)
}
