// src/db/schema.rs

//! Database schema definitions and migrations for GooGet
//!
//! This module defines the SQLite schema for the installed-state database
//! and provides a migration system to evolve the schema over time.

use crate::db::transaction;
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
///
/// Each migration commits together with its version row.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version > SCHEMA_VERSION {
        return Err(Error::DbCorrupt(format!(
            "schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version == SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        transaction(conn, |tx| {
            apply_migration(tx, version)?;
            set_schema_version(tx, version)
        })?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::DbCorrupt(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - packages: one row per installed `name.arch`
/// - installed_files: ownership of every file a package placed on disk
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE packages (
            name TEXT NOT NULL,
            arch TEXT NOT NULL,
            version TEXT NOT NULL,
            spec TEXT NOT NULL,
            local_path TEXT,
            download_url TEXT NOT NULL DEFAULT '',
            checksum TEXT NOT NULL DEFAULT '',
            installed_at TEXT NOT NULL,
            PRIMARY KEY (name, arch)
        );

        CREATE INDEX idx_packages_name ON packages(name);

        CREATE TABLE installed_files (
            path TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            arch TEXT NOT NULL,
            checksum TEXT NOT NULL,
            FOREIGN KEY (name, arch) REFERENCES packages(name, arch) ON DELETE CASCADE
        );

        CREATE INDEX idx_installed_files_owner ON installed_files(name, arch);
        ",
    )?;

    Ok(())
}

/// Schema Version 2: record the install script exit code
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        ALTER TABLE packages ADD COLUMN install_exit_code INTEGER;
        ",
    )?;

    Ok(())
}
