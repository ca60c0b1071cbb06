//! The backup manifest: its in-memory model, a live-cluster builder,
//! diff/incr reference classification, and the sectioned-text
//! serializer/loader used for both the per-backup manifest and the
//! stanza-wide backup-set index.

mod build;
mod diff;
mod error;
pub mod info;
mod model;
mod serialize;

pub use build::{build_live, BuildOptions};
pub use diff::{classify, FileClassification};
pub use error::ManifestError;
pub use model::{
    BackupType, Defaults, FileDefaults, FileInfo, LinkDefaults, LinkInfo, Manifest, ManifestData,
    PathDefaults, PathInfo, Target,
};
pub use serialize::{load, save};
