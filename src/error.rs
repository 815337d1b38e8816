// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for GooGet
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Initialization error (directories, HTTP client, ...)
    #[error("Initialization failed: {0}")]
    InitError(String),

    /// A `name.arch.version` string (or pattern) could not be parsed
    #[error("Malformed package identifier: {0}")]
    MalformedIdentifier(String),

    /// Config, repo file or manifest is malformed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Repository manifest could not be fetched
    #[error("Repository unavailable: {0}")]
    RepoUnavailable(String),

    /// No repository offers a matching package
    #[error("No candidate: {0}")]
    NoCandidate(String),

    /// A dependency cannot be met by installed packages or repositories
    #[error("Unsatisfiable dependency: {0}")]
    UnsatisfiableDependency(String),

    /// The dependency closure contains a cycle
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// Two packages replace each other
    #[error("Replacement cycle: {0}")]
    ReplacementCycle(String),

    /// Archive download failed
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Archive or file bytes do not hash to the declared checksum
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Install, uninstall or verify script failed
    #[error("Script failed: {0}")]
    ScriptError(String),

    /// Another process holds the installation lock
    #[error("Database busy: {0}")]
    DbBusy(String),

    /// Structural failure reading the database
    #[error("Database corrupt: {0}")]
    DbCorrupt(String),

    /// Two packages claim the same installed file
    #[error("File conflict: {path} is already owned by {owner}")]
    FileConflict { path: PathBuf, owner: String },

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Coinstallation conflicts and duplicate definitions
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// A package operation was driven through an invalid state transition
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// The operation observed a cancellation request
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Process exit code for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Database(_)
            | Error::Io(_)
            | Error::InitError(_)
            | Error::NotFoundError(_)
            | Error::ConflictError(_)
            | Error::TransactionError(_) => 1,
            Error::MalformedIdentifier(_) | Error::ParseError(_) => 2,
            Error::NoCandidate(_)
            | Error::UnsatisfiableDependency(_)
            | Error::DependencyCycle(_)
            | Error::ReplacementCycle(_) => 3,
            Error::DownloadError(_) | Error::ChecksumMismatch { .. } | Error::RepoUnavailable(_) => {
                4
            }
            Error::ScriptError(_) => 5,
            Error::DbBusy(_) => 6,
            Error::DbCorrupt(_) => 7,
            Error::FileConflict { .. } => 8,
            Error::Cancelled => 130,
        }
    }
}

/// Result type alias using GooGet's Error type
pub type Result<T> = std::result::Result<T, Error>;
