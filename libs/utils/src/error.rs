//! Error taxonomy shared by the backup core.
//!
//! Every crate in the workspace defines its own narrow `thiserror` error at
//! its own seam (`backup_storage::StorageError`, `backup_manifest::ManifestError`,
//! ...). [`BackupErrorKind`] is the flat classification the orchestrator maps
//! those into, mirroring the semantic error kinds of the system this crate
//! implements rather than any one crate's concrete error type. The mapping
//! to a process exit code is kept here too, even though exiting a process is
//! a CLI-layer concern: the taxonomy and its codes are a single, shared fact.

use std::fmt;

/// Semantic error kind, independent of which component raised it.
///
/// Exit codes occupy `25..=99`; unused values are reserved for kinds this
/// core does not yet need to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupErrorKind {
    PgVersionMismatch,
    FormatError,
    ChecksumError,
    FileMissingError,
    FileOpenError,
    FileReadError,
    FileWriteError,
    PathError,
    HostConnectError,
    ProtocolError,
    ArchiveTimeoutError,
    BackupMismatchError,
    ConfigError,
    PostmasterRunningError,
    ResumeIncompatibleError,
}

impl BackupErrorKind {
    /// Process exit code this kind maps to (§6, §7).
    pub const fn exit_code(self) -> u8 {
        match self {
            BackupErrorKind::PgVersionMismatch => 25,
            BackupErrorKind::FormatError => 26,
            BackupErrorKind::ChecksumError => 27,
            BackupErrorKind::FileMissingError => 28,
            BackupErrorKind::FileOpenError => 29,
            BackupErrorKind::FileReadError => 30,
            BackupErrorKind::FileWriteError => 31,
            BackupErrorKind::PathError => 32,
            BackupErrorKind::HostConnectError => 33,
            BackupErrorKind::ProtocolError => 34,
            BackupErrorKind::ArchiveTimeoutError => 35,
            BackupErrorKind::BackupMismatchError => 36,
            BackupErrorKind::ConfigError => 37,
            BackupErrorKind::PostmasterRunningError => 38,
            BackupErrorKind::ResumeIncompatibleError => 39,
        }
    }

    /// Whether this kind is recovered locally rather than aborting the backup (§7).
    pub const fn is_locally_recoverable(self) -> bool {
        matches!(self, BackupErrorKind::ResumeIncompatibleError)
    }

    /// Reverses [`Self::exit_code`]; used by the dispatcher to translate a
    /// worker's wire-level error code back into the shared taxonomy without
    /// a second lookup table. Unrecognized codes fall back to `FormatError`.
    pub const fn from_exit_code(code: i64) -> Self {
        match code {
            25 => BackupErrorKind::PgVersionMismatch,
            27 => BackupErrorKind::ChecksumError,
            28 => BackupErrorKind::FileMissingError,
            29 => BackupErrorKind::FileOpenError,
            30 => BackupErrorKind::FileReadError,
            31 => BackupErrorKind::FileWriteError,
            32 => BackupErrorKind::PathError,
            33 => BackupErrorKind::HostConnectError,
            34 => BackupErrorKind::ProtocolError,
            35 => BackupErrorKind::ArchiveTimeoutError,
            36 => BackupErrorKind::BackupMismatchError,
            37 => BackupErrorKind::ConfigError,
            38 => BackupErrorKind::PostmasterRunningError,
            39 => BackupErrorKind::ResumeIncompatibleError,
            _ => BackupErrorKind::FormatError,
        }
    }
}

impl fmt::Display for BackupErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupErrorKind::PgVersionMismatch => "pg-version-mismatch",
            BackupErrorKind::FormatError => "format-error",
            BackupErrorKind::ChecksumError => "checksum-error",
            BackupErrorKind::FileMissingError => "file-missing-error",
            BackupErrorKind::FileOpenError => "file-open-error",
            BackupErrorKind::FileReadError => "file-read-error",
            BackupErrorKind::FileWriteError => "file-write-error",
            BackupErrorKind::PathError => "path-error",
            BackupErrorKind::HostConnectError => "host-connect-error",
            BackupErrorKind::ProtocolError => "protocol-error",
            BackupErrorKind::ArchiveTimeoutError => "archive-timeout-error",
            BackupErrorKind::BackupMismatchError => "backup-mismatch-error",
            BackupErrorKind::ConfigError => "config-error",
            BackupErrorKind::PostmasterRunningError => "postmaster-running-error",
            BackupErrorKind::ResumeIncompatibleError => "resume-incompatible-error",
        };
        f.write_str(s)
    }
}

/// Implemented by every crate-local error enum so the orchestrator can
/// classify an error without downcasting through `anyhow`.
pub trait Classify {
    fn kind(&self) -> BackupErrorKind;
}
