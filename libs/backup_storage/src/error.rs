use utils::error::{BackupErrorKind, Classify};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("path already exists: {0}")]
    AlreadyExists(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Classify for StorageError {
    fn kind(&self) -> BackupErrorKind {
        match self {
            StorageError::NotFound(_) => BackupErrorKind::FileMissingError,
            StorageError::AlreadyExists(_) => BackupErrorKind::PathError,
            StorageError::Io { .. } => BackupErrorKind::FileReadError,
        }
    }
}
