// src/transaction/mod.rs

//! Per-package operation state machine
//!
//! Every install, reinstall and remove is tracked by a [`PackageOp`] whose
//! state only moves along the edges below. The database write at
//! `Recorded` (or `Deleted` for removals) is the commit point: a failure
//! before it leaves the database untouched, a failure after it leaves the
//! package recorded.
//!
//! ```text
//! install:  Planned -> [Downloading ->] Verified -> ScriptRunning -> Recorded -> Done
//! remove:   Recorded -> [ScriptRunning ->] Deleted -> Done
//! any non-terminal state -> Failed(kind)
//! ```

mod installer;

pub use installer::{ExecutionReport, Installer, VerifyReport};

use crate::error::{Error, Result};
use crate::packages::PackageIdent;
use std::fmt;
use tracing::debug;

/// What a [`PackageOp`] does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Install,
    Reinstall,
    Remove,
}

/// Why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Download,
    Checksum,
    Script,
    FileConflict,
    Database,
    Cancelled,
    Other,
}

impl From<&Error> for FailureKind {
    fn from(e: &Error) -> Self {
        match e {
            Error::DownloadError(_) | Error::RepoUnavailable(_) => FailureKind::Download,
            Error::ChecksumMismatch { .. } => FailureKind::Checksum,
            Error::ScriptError(_) => FailureKind::Script,
            Error::FileConflict { .. } => FailureKind::FileConflict,
            Error::Database(_) | Error::DbBusy(_) | Error::DbCorrupt(_) => FailureKind::Database,
            Error::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Other,
        }
    }
}

/// State of one package operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Planned,
    Downloading,
    Verified,
    ScriptRunning,
    Recorded,
    Deleted,
    Done,
    Failed(FailureKind),
}

impl OpState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OpState::Done | OpState::Failed(_))
    }
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpState::Failed(kind) => write!(f, "Failed({:?})", kind),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One package moving through the state machine
#[derive(Debug, Clone)]
pub struct PackageOp {
    ident: PackageIdent,
    kind: OpKind,
    state: OpState,
}

impl PackageOp {
    pub fn new(ident: PackageIdent, kind: OpKind) -> Self {
        let state = match kind {
            OpKind::Install | OpKind::Reinstall => OpState::Planned,
            OpKind::Remove => OpState::Recorded,
        };
        Self { ident, kind, state }
    }

    pub fn ident(&self) -> &PackageIdent {
        &self.ident
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn state(&self) -> OpState {
        self.state
    }

    /// Move to `next`, rejecting edges the machine does not have
    pub fn advance(&mut self, next: OpState) -> Result<()> {
        use OpState::*;

        let allowed = match (self.kind, self.state, next) {
            (_, from, Failed(_)) => !from.is_terminal(),
            (OpKind::Install | OpKind::Reinstall, from, to) => matches!(
                (from, to),
                (Planned, Downloading)
                    | (Planned, Verified)
                    | (Downloading, Verified)
                    | (Verified, ScriptRunning)
                    | (ScriptRunning, Recorded)
                    | (Recorded, Done)
            ),
            (OpKind::Remove, from, to) => matches!(
                (from, to),
                (Recorded, ScriptRunning)
                    | (Recorded, Deleted)
                    | (ScriptRunning, Deleted)
                    | (Deleted, Done)
            ),
        };

        if !allowed {
            return Err(Error::TransactionError(format!(
                "{} ({:?}): cannot go from {} to {}",
                self.ident, self.kind, self.state, next
            )));
        }

        debug!("{} ({:?}): {} -> {}", self.ident, self.kind, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record a failure and hand the error back
    pub fn fail(&mut self, error: Error) -> Error {
        if !self.state.is_terminal() {
            let kind = FailureKind::from(&error);
            debug!("{} ({:?}): {} -> Failed({:?})", self.ident, self.kind, self.state, kind);
            self.state = OpState::Failed(kind);
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OpKind) -> PackageOp {
        PackageOp::new(PackageIdent::parse("foo.noarch.1").unwrap(), kind)
    }

    #[test]
    fn test_install_path_with_download() {
        let mut op = op(OpKind::Install);
        for state in [
            OpState::Downloading,
            OpState::Verified,
            OpState::ScriptRunning,
            OpState::Recorded,
            OpState::Done,
        ] {
            op.advance(state).unwrap();
        }
        assert_eq!(op.state(), OpState::Done);
    }

    #[test]
    fn test_cache_hit_skips_download() {
        let mut op = op(OpKind::Install);
        op.advance(OpState::Verified).unwrap();
        assert!(op.advance(OpState::Recorded).is_err());
    }

    #[test]
    fn test_remove_path() {
        let mut op = op(OpKind::Remove);
        assert_eq!(op.state(), OpState::Recorded);
        op.advance(OpState::ScriptRunning).unwrap();
        op.advance(OpState::Deleted).unwrap();
        op.advance(OpState::Done).unwrap();
        assert!(op.advance(OpState::Deleted).is_err());
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut op = op(OpKind::Install);
        op.advance(OpState::Downloading).unwrap();
        let err = op.fail(Error::ChecksumMismatch {
            path: "x".to_string(),
            expected: "a".to_string(),
            actual: "b".to_string(),
        });
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert_eq!(op.state(), OpState::Failed(FailureKind::Checksum));
        assert!(matches!(
            op.advance(OpState::Verified),
            Err(Error::TransactionError(_))
        ));
    }
}
