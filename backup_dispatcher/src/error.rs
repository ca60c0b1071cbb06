use thiserror::Error;
use utils::error::{BackupErrorKind, Classify};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("worker {worker_id}: i/o error: {source}")]
    Io { worker_id: usize, source: std::io::Error },

    #[error("worker {worker_id} closed its pipe without responding")]
    WorkerClosed { worker_id: usize },

    #[error("worker {worker_id}: malformed response: {source}")]
    Protocol { worker_id: usize, source: serde_json::Error },

    #[error("worker {worker_id} reported job failure ({code}): {message}")]
    JobFailed { worker_id: usize, code: i64, message: String },

    #[error("failed to spawn worker process: {0}")]
    Spawn(#[source] std::io::Error),
}

impl Classify for DispatchError {
    fn kind(&self) -> BackupErrorKind {
        match self {
            DispatchError::Io { .. } | DispatchError::Spawn(_) => BackupErrorKind::FileReadError,
            DispatchError::WorkerClosed { .. } => BackupErrorKind::HostConnectError,
            DispatchError::Protocol { .. } => BackupErrorKind::FormatError,
            DispatchError::JobFailed { code, .. } => BackupErrorKind::from_exit_code(*code),
        }
    }
}
