// src/db/models.rs

//! Data models for the installed-state database
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

use crate::error::{Error, Result};
use crate::packages::{Arch, PackageKey, PkgSpec};
use crate::version::Version;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Installed name.arch mapped to the installed version
pub type PackageMap = BTreeMap<PackageKey, Version>;

/// The installed record of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageState {
    pub spec: PkgSpec,
    /// Cached archive this install came from; `None` once cleaned or when
    /// the archive was never kept
    pub local_path: Option<PathBuf>,
    pub download_url: String,
    /// Checksum actually verified at install time
    pub checksum: String,
    /// Absolute path of every file placed on disk mapped to its checksum
    pub installed_files: BTreeMap<PathBuf, String>,
    pub install_exit_code: Option<i32>,
    pub installed_at: String,
}

impl PackageState {
    /// Create a new state for a freshly installed spec
    pub fn new(spec: PkgSpec) -> Self {
        let checksum = spec.checksum.clone();
        Self {
            spec,
            local_path: None,
            download_url: String::new(),
            checksum,
            installed_files: BTreeMap::new(),
            install_exit_code: None,
            installed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn key(&self) -> PackageKey {
        self.spec.key()
    }

    /// Insert or replace this state and its file ownership rows
    pub fn upsert(&self, conn: &Connection) -> Result<()> {
        let spec_json = serde_json::to_string(&self.spec)
            .map_err(|e| Error::ParseError(format!("Failed to encode spec: {}", e)))?;

        conn.execute(
            "DELETE FROM packages WHERE name = ?1 AND arch = ?2",
            params![&self.spec.name, self.spec.arch.as_str()],
        )?;
        conn.execute(
            "INSERT INTO packages (name, arch, version, spec, local_path, download_url, checksum, installed_at, install_exit_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.spec.name,
                self.spec.arch.as_str(),
                self.spec.version.as_str(),
                spec_json,
                self.local_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                &self.download_url,
                &self.checksum,
                &self.installed_at,
                &self.install_exit_code,
            ],
        )?;

        for (path, checksum) in &self.installed_files {
            InstalledFile {
                path: path.clone(),
                owner: self.key(),
                checksum: checksum.clone(),
            }
            .insert(conn)?;
        }

        Ok(())
    }

    /// Find the state for a name.arch
    pub fn find_by_key(conn: &Connection, key: &PackageKey) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, arch, spec, local_path, download_url, checksum, installed_at, install_exit_code
             FROM packages WHERE name = ?1 AND arch = ?2",
        )?;

        let state = stmt
            .query_row(params![&key.name, key.arch.as_str()], Self::from_row)
            .optional()
            .map_err(corrupt)?;

        match state {
            Some(mut state) => {
                state.installed_files = InstalledFile::find_by_owner(conn, key)?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// List states whose name contains `filter`, ordered by name then arch
    pub fn list(conn: &Connection, filter: Option<&str>) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, arch, spec, local_path, download_url, checksum, installed_at, install_exit_code
             FROM packages WHERE instr(name, ?1) > 0 ORDER BY name, arch",
        )?;

        let mut states = stmt
            .query_map([filter.unwrap_or("")], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        let mut files = InstalledFile::list_all(conn)?;
        for state in &mut states {
            if let Some(owned) = files.remove(&state.key()) {
                state.installed_files = owned;
            }
        }

        Ok(states)
    }

    /// Delete a state (file rows cascade)
    pub fn delete(conn: &Connection, key: &PackageKey) -> Result<bool> {
        let n = conn.execute(
            "DELETE FROM packages WHERE name = ?1 AND arch = ?2",
            params![&key.name, key.arch.as_str()],
        )?;
        Ok(n > 0)
    }

    /// Delete every state
    pub fn delete_all(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM packages", [])?;
        Ok(())
    }

    /// Convert a database row to a PackageState (files are attached separately)
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let name: String = row.get(0)?;
        let arch: String = row.get(1)?;
        let spec_json: String = row.get(2)?;
        let spec: PkgSpec = serde_json::from_str(&spec_json)
            .map_err(|e| conversion_failure(2, e.to_string()))?;

        if spec.name != name || spec.arch.as_str() != arch {
            return Err(conversion_failure(
                2,
                format!("row {}.{} holds spec for {}", name, arch, spec.key()),
            ));
        }

        let local_path: Option<String> = row.get(3)?;

        Ok(Self {
            spec,
            local_path: local_path.filter(|p| !p.is_empty()).map(PathBuf::from),
            download_url: row.get(4)?,
            checksum: row.get(5)?,
            installed_files: BTreeMap::new(),
            installed_at: row.get(6)?,
            install_exit_code: row.get(7)?,
        })
    }
}

/// Ownership record of an installed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFile {
    pub path: PathBuf,
    pub owner: PackageKey,
    pub checksum: String,
}

impl InstalledFile {
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO installed_files (path, name, arch, checksum) VALUES (?1, ?2, ?3, ?4)",
            params![
                self.path.to_string_lossy(),
                &self.owner.name,
                self.owner.arch.as_str(),
                &self.checksum,
            ],
        )?;
        Ok(())
    }

    /// Find the owner of a path
    pub fn find_by_path(conn: &Connection, path: &std::path::Path) -> Result<Option<Self>> {
        let mut stmt =
            conn.prepare("SELECT path, name, arch, checksum FROM installed_files WHERE path = ?1")?;

        let file = stmt
            .query_row([path.to_string_lossy()], Self::from_row)
            .optional()
            .map_err(corrupt)?;

        Ok(file)
    }

    fn find_by_owner(conn: &Connection, key: &PackageKey) -> Result<BTreeMap<PathBuf, String>> {
        let mut stmt = conn.prepare(
            "SELECT path, name, arch, checksum FROM installed_files WHERE name = ?1 AND arch = ?2",
        )?;

        let files = stmt
            .query_map(params![&key.name, key.arch.as_str()], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        Ok(files.into_iter().map(|f| (f.path, f.checksum)).collect())
    }

    fn list_all(conn: &Connection) -> Result<BTreeMap<PackageKey, BTreeMap<PathBuf, String>>> {
        let mut stmt = conn.prepare("SELECT path, name, arch, checksum FROM installed_files")?;

        let files = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(corrupt)?;

        let mut by_owner: BTreeMap<PackageKey, BTreeMap<PathBuf, String>> = BTreeMap::new();
        for file in files {
            by_owner
                .entry(file.owner)
                .or_default()
                .insert(file.path, file.checksum);
        }
        Ok(by_owner)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let path: String = row.get(0)?;
        let arch_str: String = row.get(2)?;
        let arch = arch_str
            .parse::<Arch>()
            .map_err(|e| conversion_failure(2, e.to_string()))?;

        Ok(Self {
            path: PathBuf::from(path),
            owner: PackageKey::new(row.get::<_, String>(1)?, arch),
            checksum: row.get(3)?,
        })
    }
}

/// Project installed states to name.arch -> version
pub fn package_map(states: &[PackageState]) -> PackageMap {
    states
        .iter()
        .map(|s| (s.key(), s.spec.version.clone()))
        .collect()
}

fn conversion_failure(column: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, msg)),
    )
}

/// Row decoding failures mean the stored data is structurally wrong
fn corrupt(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => Error::DbCorrupt(e.to_string()),
        other => Error::Database(other),
    }
}
