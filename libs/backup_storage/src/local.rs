use std::os::unix::fs::{MetadataExt, PermissionsExt};

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tokio::fs;

use crate::error::StorageError;
use crate::features::RepositoryFeatures;
use crate::{
    ByteSink, ByteStream, EntryType, Info, ListOptions, RemoveOptions, Repository, WriteOptions,
};

/// Stores the repository as a plain directory tree. `root` is the
/// repository base (e.g. `<repo>/backup/<stanza>`); all paths passed to
/// trait methods are relative to it.
pub struct LocalRepository {
    root: Utf8PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        LocalRepository { root: root.into() }
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.root.join(path)
    }

    fn io_err(path: &Utf8Path, source: std::io::Error) -> StorageError {
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io { path: path.to_string(), source }
        }
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn features(&self) -> RepositoryFeatures {
        RepositoryFeatures::local_filesystem()
    }

    async fn new_read(&self, path: &Utf8Path) -> Result<ByteStream, StorageError> {
        let full = self.resolve(path);
        let file = fs::File::open(&full).await.map_err(|e| Self::io_err(path, e))?;
        Ok(Box::new(file))
    }

    async fn new_write(&self, path: &Utf8Path, opts: WriteOptions) -> Result<ByteSink, StorageError> {
        let full = self.resolve(path);
        if opts.create_path {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).await.map_err(|e| Self::io_err(path, e))?;
            }
        }
        let file = fs::File::create(&full).await.map_err(|e| Self::io_err(path, e))?;
        if let Some(mode) = opts.mode {
            let perms = std::fs::Permissions::from_mode(mode);
            fs::set_permissions(&full, perms).await.map_err(|e| Self::io_err(path, e))?;
        }
        if let Some(mtime) = opts.modify_time {
            let _ = mtime; // applied by the orchestrator via filetime after close; no async API here
        }
        Ok(Box::new(file))
    }

    async fn exists(&self, path: &Utf8Path) -> Result<bool, StorageError> {
        Ok(fs::metadata(self.resolve(path)).await.is_ok())
    }

    async fn list(&self, path: &Utf8Path, opts: ListOptions) -> Result<Vec<Info>, StorageError> {
        let full = self.resolve(path);
        let mut out = Vec::new();
        collect_entries(&full, &full, opts.recurse, &mut out)
            .await
            .map_err(|e| Self::io_err(path, e))?;
        if opts.sort {
            out.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(out)
    }

    async fn remove(&self, path: &Utf8Path, opts: RemoveOptions) -> Result<(), StorageError> {
        tracing::debug!(%path, recurse = opts.recurse, "removing repository path");
        let full = self.resolve(path);
        let meta = match fs::symlink_metadata(&full).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return if opts.error_if_missing {
                    Err(StorageError::NotFound(path.to_string()))
                } else {
                    Ok(())
                };
            }
            Err(e) => return Err(Self::io_err(path, e)),
        };
        if meta.is_dir() && !meta.file_type().is_symlink() {
            if opts.recurse {
                fs::remove_dir_all(&full).await.map_err(|e| Self::io_err(path, e))?;
            } else {
                fs::remove_dir(&full).await.map_err(|e| Self::io_err(path, e))?;
            }
        } else {
            fs::remove_file(&full).await.map_err(|e| Self::io_err(path, e))?;
        }
        Ok(())
    }

    async fn path_create(&self, path: &Utf8Path) -> Result<(), StorageError> {
        fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| Self::io_err(path, e))
    }

    async fn path_remove(&self, path: &Utf8Path) -> Result<(), StorageError> {
        match fs::remove_dir(self.resolve(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    async fn link_create(&self, target: &Utf8Path, source: &Utf8Path) -> Result<(), StorageError> {
        let full_source = self.resolve(source);
        if let Some(parent) = full_source.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::io_err(source, e))?;
        }
        std::os::unix::fs::symlink(target, &full_source).map_err(|e| Self::io_err(source, e))
    }

    async fn r#move(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), StorageError> {
        let full_from = self.resolve(from);
        let full_to = self.resolve(to);
        if let Some(parent) = full_to.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::io_err(to, e))?;
        }
        fs::rename(&full_from, &full_to).await.map_err(|e| Self::io_err(from, e))
    }

    async fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), StorageError> {
        let full_from = self.resolve(from);
        let full_to = self.resolve(to);
        if let Some(parent) = full_to.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::io_err(to, e))?;
        }
        fs::copy(&full_from, &full_to).await.map_err(|e| Self::io_err(from, e))?;
        Ok(())
    }
}

fn collect_entries<'a>(
    root: &'a Utf8Path,
    dir: &'a Utf8Path,
    recurse: bool,
    out: &'a mut Vec<Info>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .expect("repository paths must be UTF-8");
            let name = path
                .strip_prefix(root)
                .unwrap_or(path.as_path())
                .to_string();

            let kind = if meta.file_type().is_symlink() {
                EntryType::Link
            } else if meta.is_dir() {
                EntryType::Path
            } else if meta.is_file() {
                EntryType::File
            } else {
                EntryType::Special
            };

            let link_destination = if kind == EntryType::Link {
                tokio::fs::read_link(&path)
                    .await
                    .ok()
                    .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
                    .map(|p| p.to_string())
            } else {
                None
            };

            out.push(Info {
                name,
                kind,
                size: meta.len(),
                mode_bits: meta.permissions().mode(),
                user: meta.uid().to_string(),
                group: meta.gid().to_string(),
                link_destination,
                modify_time: meta.mtime(),
            });

            if recurse && kind == EntryType::Path {
                collect_entries(root, &path, recurse, out).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = Utf8TempDir::new().unwrap();
        let repo = LocalRepository::new(dir.path().to_owned());

        let mut sink = repo
            .new_write(Utf8Path::new("pg_data/PG_VERSION"), WriteOptions { create_path: true, ..Default::default() })
            .await
            .unwrap();
        use tokio::io::AsyncWriteExt;
        sink.write_all(b"13\n").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        assert!(repo.exists(Utf8Path::new("pg_data/PG_VERSION")).await.unwrap());

        let mut stream = repo.new_read(Utf8Path::new("pg_data/PG_VERSION")).await.unwrap();
        use tokio::io::AsyncReadExt;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"13\n");
    }

    #[tokio::test]
    async fn list_recurses_and_reports_relative_names() {
        let dir = Utf8TempDir::new().unwrap();
        let repo = LocalRepository::new(dir.path().to_owned());
        repo.path_create(Utf8Path::new("pg_data/base/1")).await.unwrap();
        let mut sink = repo
            .new_write(Utf8Path::new("pg_data/base/1/3"), WriteOptions::default())
            .await
            .unwrap();
        use tokio::io::AsyncWriteExt;
        sink.write_all(b"data").await.unwrap();
        sink.shutdown().await.unwrap();
        drop(sink);

        let entries = repo
            .list(Utf8Path::new("pg_data"), ListOptions { recurse: true, sort: true })
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"base/1/3"));
    }

    #[tokio::test]
    async fn remove_missing_without_error_if_missing_is_a_noop() {
        let dir = Utf8TempDir::new().unwrap();
        let repo = LocalRepository::new(dir.path().to_owned());
        repo.remove(Utf8Path::new("nope"), RemoveOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn remove_missing_with_error_if_missing_fails() {
        let dir = Utf8TempDir::new().unwrap();
        let repo = LocalRepository::new(dir.path().to_owned());
        let err = repo
            .remove(Utf8Path::new("nope"), RemoveOptions { error_if_missing: true, ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
