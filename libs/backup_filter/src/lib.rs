//! The per-file streaming filter pipeline used by the file copy worker:
//! page-checksum validation, a running SHA1, byte counting, optional
//! compression, and optional encryption, composed into one writer per file.

mod cipher;
mod compress;
mod page_checksum;
mod pipeline;
mod readback;

pub use cipher::{CipherKey, CipherReader, CipherWriter, PBKDF2_ROUNDS, SALT_SIZE};
pub use compress::{CompressKind, CompressWriter, DecompressReader};
pub use page_checksum::IncrementalPageChecker;
pub use pipeline::{CompressConfig, PageChecksumConfig, Pipeline, PipelineConfig, PipelineResult};
pub use readback::read_back_sha1;
