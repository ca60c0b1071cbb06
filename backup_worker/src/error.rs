use thiserror::Error;
use utils::error::{BackupErrorKind, Classify};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("source file missing: {0}")]
    FileMissing(String),

    #[error("storage error: {0}")]
    Storage(#[from] backup_storage::StorageError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized compression suffix: {0}")]
    UnknownCompression(String),

    #[error("repo checksum mismatch on read-back for {path}: expected {expected}, found {found}")]
    ChecksumMismatch { path: String, expected: String, found: String },
}

impl Classify for WorkerError {
    fn kind(&self) -> BackupErrorKind {
        match self {
            WorkerError::FileMissing(_) => BackupErrorKind::FileMissingError,
            WorkerError::Storage(e) => e.kind(),
            WorkerError::Io(_) => BackupErrorKind::FileReadError,
            WorkerError::UnknownCompression(_) => BackupErrorKind::FormatError,
            WorkerError::ChecksumMismatch { .. } => BackupErrorKind::ChecksumError,
        }
    }
}
