//! Abstract object store the backup repository is written through. One
//! implementation ships here (the local filesystem); remote backends plug
//! in behind the same [`Repository`] trait, the way the teacher's
//! `RemoteStorage` trait lets `S3Bucket` and other backends share callers.

mod error;
mod features;
mod local;

pub use error::StorageError;
pub use features::RepositoryFeatures;
pub use local::LocalRepository;

use async_trait::async_trait;
use camino::Utf8Path;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Path,
    Link,
    Special,
}

#[derive(Debug, Clone)]
pub struct Info {
    pub name: String,
    pub kind: EntryType,
    pub size: u64,
    pub mode_bits: u32,
    pub user: String,
    pub group: String,
    pub link_destination: Option<String>,
    pub modify_time: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub create_path: bool,
    pub modify_time: Option<i64>,
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub recurse: bool,
    pub sort: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub recurse: bool,
    pub error_if_missing: bool,
}

pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// The storage contract every repository backend implements. Method names
/// mirror the operation names in the design doc (`newRead`, `newWrite`, ...)
/// rather than idiomatic Rust verbs, so the two stay easy to cross-reference.
#[async_trait]
pub trait Repository: Send + Sync {
    fn features(&self) -> RepositoryFeatures;

    async fn new_read(&self, path: &Utf8Path) -> Result<ByteStream, StorageError>;
    async fn new_write(&self, path: &Utf8Path, opts: WriteOptions) -> Result<ByteSink, StorageError>;
    async fn exists(&self, path: &Utf8Path) -> Result<bool, StorageError>;
    async fn list(&self, path: &Utf8Path, opts: ListOptions) -> Result<Vec<Info>, StorageError>;
    async fn remove(&self, path: &Utf8Path, opts: RemoveOptions) -> Result<(), StorageError>;
    async fn path_create(&self, path: &Utf8Path) -> Result<(), StorageError>;
    async fn path_remove(&self, path: &Utf8Path) -> Result<(), StorageError>;
    async fn link_create(&self, target: &Utf8Path, source: &Utf8Path) -> Result<(), StorageError>;
    async fn r#move(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), StorageError>;
    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), StorageError>;
}
