// src/db/mod.rs

//! Installed-state database for GooGet
//!
//! A single SQLite file keyed by `name.arch`. Every mutation runs inside one
//! SQL transaction, so after a crash either the previous or the new set of
//! records is visible, never a mix. The database is only opened while the
//! process-wide [`InstallLock`] is held.

pub mod models;
pub mod schema;

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::lock::InstallLock;
use crate::packages::PackageKey;
use models::{InstalledFile, PackageMap, PackageState};
use rusqlite::{Connection, ErrorCode, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Execute a function within a database transaction
///
/// Commits on success, rolls back (by dropping the transaction) on error.
pub fn transaction<F, T>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

/// Exclusive handle on the installed-state database
pub struct Database {
    conn: Connection,
    path: PathBuf,
    // Declared last so the connection closes before the lock is released
    _lock: InstallLock,
}

impl Database {
    /// Open the database for an environment, taking the installation lock
    pub fn open_env(env: &Environment) -> Result<Self> {
        Self::open(&env.db_path, &env.lock_path)
    }

    /// Open (creating if needed) the database at `db_path`
    ///
    /// Fails with [`Error::DbBusy`] if another process holds `lock_path` and
    /// with [`Error::DbCorrupt`] if the file is not a usable database.
    pub fn open(db_path: &Path, lock_path: &Path) -> Result<Self> {
        let lock = InstallLock::acquire(lock_path)?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::InitError(format!("Failed to create database directory: {}", e))
            })?;
        }

        debug!("Opening database at {}", db_path.display());
        let mut conn = Connection::open(db_path).map_err(classify)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(classify)?;

        schema::migrate(&mut conn).map_err(|e| match e {
            Error::Database(inner) => classify(inner),
            other => other,
        })?;

        Ok(Self {
            conn,
            path: db_path.to_path_buf(),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All states whose name contains `filter`
    pub fn fetch_all(&self, filter: Option<&str>) -> Result<Vec<PackageState>> {
        PackageState::list(&self.conn, filter)
    }

    /// The state for `key`, or [`Error::NotFoundError`]
    pub fn fetch_one(&self, key: &PackageKey) -> Result<PackageState> {
        self.find(key)?
            .ok_or_else(|| Error::NotFoundError(format!("{} is not installed", key)))
    }

    pub fn find(&self, key: &PackageKey) -> Result<Option<PackageState>> {
        PackageState::find_by_key(&self.conn, key)
    }

    /// Installed name.arch -> version
    pub fn package_map(&self) -> Result<PackageMap> {
        Ok(models::package_map(&self.fetch_all(None)?))
    }

    /// The package owning an installed file
    pub fn file_owner(&self, path: &Path) -> Result<Option<PackageKey>> {
        Ok(InstalledFile::find_by_path(&self.conn, path)?.map(|f| f.owner))
    }

    /// Replace the entire set of records atomically
    pub fn write(&mut self, states: &[PackageState]) -> Result<()> {
        transaction(&mut self.conn, |tx| {
            PackageState::delete_all(tx)?;
            for state in states {
                state.upsert(tx)?;
            }
            Ok(())
        })?;
        info!("Wrote {} package record(s)", states.len());
        Ok(())
    }

    /// Insert or replace one record atomically
    pub fn upsert(&mut self, state: &PackageState) -> Result<()> {
        transaction(&mut self.conn, |tx| state.upsert(tx))?;
        debug!("Recorded {}", state.spec);
        Ok(())
    }

    /// Delete one record atomically; returns whether it existed
    pub fn delete(&mut self, key: &PackageKey) -> Result<bool> {
        let existed = transaction(&mut self.conn, |tx| PackageState::delete(tx, key))?;
        debug!("Deleted {} (existed: {})", key, existed);
        Ok(existed)
    }

    /// Release the connection and the installation lock
    pub fn close(self) -> Result<()> {
        let Database {
            conn, _lock: lock, ..
        } = self;
        conn.close().map_err(|(_, e)| Error::Database(e))?;
        drop(lock);
        Ok(())
    }
}

/// Map "this is not a database" failures to [`Error::DbCorrupt`]
fn classify(e: rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
            Error::DbCorrupt(e.to_string())
        }
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            Error::DbBusy(e.to_string())
        }
        _ => Error::Database(e),
    }
}
