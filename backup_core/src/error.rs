//! Top-level error type the orchestrator surfaces. Every collaborator
//! crate classifies its own errors into [`BackupErrorKind`]; this enum just
//! wraps each crate's concrete error so the orchestrator can propagate with
//! `?` while still exposing one `kind()` for the eventual CLI layer to map
//! to a process exit code (§7).

use backup_dispatcher::DispatchError;
use backup_manifest::ManifestError;
use backup_protocol::ProtocolError;
use backup_storage::StorageError;
use pg_control::ControlFileError;
use utils::error::{BackupErrorKind, Classify};

use crate::label::LabelError;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Label(#[from] LabelError),
    #[error(transparent)]
    Control(#[from] ControlFileError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("`postmaster.pid` exists; refusing an offline backup without `force` (§4.I)")]
    PostmasterRunning,
    #[error("no files have changed since the last backup")]
    NothingToBackup,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("a diff/incr backup requires a prior backup to reference")]
    NoPriorBackup,
    #[error("timed out waiting for WAL segment {0} to reach the archive")]
    ArchiveTimeout(String),
}

impl Classify for BackupError {
    fn kind(&self) -> BackupErrorKind {
        match self {
            BackupError::Manifest(e) => e.kind(),
            BackupError::Protocol(e) => e.kind(),
            BackupError::Storage(e) => e.kind(),
            BackupError::Dispatch(e) => e.kind(),
            BackupError::Label(_) => BackupErrorKind::FormatError,
            BackupError::Control(e) => e.kind(),
            BackupError::Io(_) => BackupErrorKind::FileReadError,
            BackupError::PostmasterRunning => BackupErrorKind::PostmasterRunningError,
            BackupError::NothingToBackup => BackupErrorKind::FileMissingError,
            BackupError::Config(_) => BackupErrorKind::ConfigError,
            BackupError::NoPriorBackup => BackupErrorKind::BackupMismatchError,
            BackupError::ArchiveTimeout(_) => BackupErrorKind::ArchiveTimeoutError,
        }
    }
}
