use std::time::Duration;

use utils::error::{BackupErrorKind, Classify};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to connect to {target}: {source}")]
    HostConnectError {
        target: String,
        #[source]
        source: tokio_postgres::Error,
    },
    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),
    #[error("cluster reports major version {found}, stanza expects {expected}")]
    PgVersionMismatch { expected: String, found: String },
    #[error("expected standby={expected}, cluster reports standby={found}")]
    StandbyMismatch { expected: bool, found: bool },
    #[error("server_version_num {0} does not match any supported major version")]
    UnknownVersion(i32),
    #[error("timed out after {0:?} waiting for replay to reach the target LSN")]
    ReplayTimeout(Duration),
    #[error("malformed LSN returned by server: {0}")]
    LsnParse(#[from] utils::lsn::LsnParseError),
    #[error("backup is already in progress (pg_is_in_backup() = true)")]
    BackupAlreadyInProgress,
}

impl Classify for ProtocolError {
    fn kind(&self) -> BackupErrorKind {
        match self {
            ProtocolError::HostConnectError { .. } => BackupErrorKind::HostConnectError,
            ProtocolError::Query(_) => BackupErrorKind::ProtocolError,
            ProtocolError::PgVersionMismatch { .. } => BackupErrorKind::PgVersionMismatch,
            ProtocolError::StandbyMismatch { .. } => BackupErrorKind::BackupMismatchError,
            ProtocolError::UnknownVersion(_) => BackupErrorKind::FormatError,
            ProtocolError::ReplayTimeout(_) => BackupErrorKind::ArchiveTimeoutError,
            ProtocolError::LsnParse(_) => BackupErrorKind::FormatError,
            ProtocolError::BackupAlreadyInProgress => BackupErrorKind::PostmasterRunningError,
        }
    }
}
