use utils::error::{BackupErrorKind, Classify};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("PG_VERSION mismatch: cluster reports {found}, stanza expects {expected}")]
    PgVersionMismatch { expected: String, found: String },
    #[error("manifest checksum mismatch: body hashes to {computed}, trailer says {stored}")]
    ChecksumError { stored: String, computed: String },
    #[error("malformed manifest: {0}")]
    FormatError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Classify for ManifestError {
    fn kind(&self) -> BackupErrorKind {
        match self {
            ManifestError::PgVersionMismatch { .. } => BackupErrorKind::PgVersionMismatch,
            ManifestError::ChecksumError { .. } => BackupErrorKind::ChecksumError,
            ManifestError::FormatError(_) => BackupErrorKind::FormatError,
            ManifestError::Io(_) => BackupErrorKind::FileReadError,
        }
    }
}
