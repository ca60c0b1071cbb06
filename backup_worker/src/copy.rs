//! Executes one `backupFile` job: resolves the [`decision`] table against
//! the live source file and repository state, then performs whichever I/O
//! the chosen branch needs.

use std::io::Read;

use backup_filter::{CompressConfig, CompressKind, PageChecksumConfig, Pipeline, PipelineConfig};
use backup_storage::{ListOptions, RemoveOptions, Repository, WriteOptions};
use camino::Utf8Path;
use sha1::{Digest, Sha1};
use tokio_util::io::SyncIoBridge;
use utils::lsn::Lsn;

use backup_dispatcher::{BackupFileOutcome, BackupFileParams, CopyResult, PageChecksumWire};

use crate::decision::{decide, Decision, DecisionFacts};
use crate::error::WorkerError;

/// Path the file is actually stored under in the repo, including the
/// compression suffix when one applies (§6 repository layout).
fn repo_storage_path(params: &BackupFileParams) -> String {
    match &params.repo_file_compress {
        Some(suffix) => format!("{}.{}", params.repo_file, suffix),
        None => params.repo_file.clone(),
    }
}

fn compress_kind(params: &BackupFileParams) -> Result<Option<CompressKind>, WorkerError> {
    match &params.repo_file_compress {
        None => Ok(None),
        Some(suffix) => CompressKind::from_suffix(suffix)
            .map(Some)
            .ok_or_else(|| WorkerError::UnknownCompression(suffix.clone())),
    }
}

pub async fn execute_job(
    repo: &dyn Repository,
    pg_root: &Utf8Path,
    params: &BackupFileParams,
) -> Result<BackupFileOutcome, WorkerError> {
    let source_root = match &params.pg_file_source_root {
        Some(root) => Utf8Path::new(root),
        None => pg_root,
    };
    let pg_path = source_root.join(&params.pg_file);
    let repo_path_str = repo_storage_path(params);
    let repo_path = Utf8Path::new(&repo_path_str);

    let pg_metadata = tokio::fs::metadata(&pg_path).await.ok();
    let pg_exists = pg_metadata.is_some();

    if !pg_exists && !params.ignore_missing {
        return Err(WorkerError::FileMissing(params.pg_file.clone()));
    }

    let repo_exists = repo.exists(repo_path).await?;

    if !pg_exists {
        if repo_exists {
            repo.remove(repo_path, RemoveOptions::default()).await?;
        }
        return Ok(BackupFileOutcome {
            copy_result: CopyResult::Skip,
            copy_size: 0,
            repo_size: 0,
            copy_checksum: None,
            page_checksum_result: None,
        });
    }

    let compress = compress_kind(params)?;
    let cipher_passphrase = params.cipher_sub_pass.as_ref().map(|p| p.as_bytes().to_vec());

    let has_checksum_param = params.pg_file_checksum.is_some();
    let unchanged_since_manifest = if has_checksum_param {
        let live_size = pg_metadata.as_ref().unwrap().len();
        if live_size != params.pg_file_size {
            Some(false)
        } else {
            let prefix_sha1 = hash_prefix(&pg_path, params.pg_file_size).await?;
            Some(Some(prefix_sha1) == params.pg_file_checksum)
        }
    } else {
        None
    };

    let readback_checksum_matches =
        if unchanged_since_manifest == Some(true) && !params.repo_file_has_reference && repo_exists {
            let (checksum, _) = read_back(repo, repo_path, compress, cipher_passphrase.as_deref(), None).await?;
            Some(Some(checksum) == params.pg_file_checksum)
        } else {
            None
        };

    let facts = DecisionFacts {
        pg_exists,
        ignore_missing: params.ignore_missing,
        delta: params.delta,
        has_checksum_param,
        repo_file_has_reference: params.repo_file_has_reference,
        repo_file_exists: repo_exists,
        unchanged_since_manifest,
        readback_checksum_matches,
    };

    match decide(&facts) {
        Decision::Skip => unreachable!("handled above once pg_exists is false"),
        Decision::NoOp => Ok(BackupFileOutcome {
            copy_result: CopyResult::NoOp,
            copy_size: pg_metadata.unwrap().len(),
            repo_size: 0,
            copy_checksum: params.pg_file_checksum.clone(),
            page_checksum_result: None,
        }),
        Decision::Checksum => {
            let page_size = params.pg_file_checksum_page.then_some(pg_control::DEFAULT_PAGE_SIZE);
            let lsn_limit = Lsn(params.pg_file_checksum_page_lsn_limit);
            let (checksum, page_result) =
                read_back(repo, repo_path, compress, cipher_passphrase.as_deref(), page_size.map(|p| (p, lsn_limit)))
                    .await?;
            if Some(&checksum) != params.pg_file_checksum.as_ref() {
                return Err(WorkerError::ChecksumMismatch {
                    path: params.repo_file.clone(),
                    expected: params.pg_file_checksum.clone().unwrap_or_default(),
                    found: checksum,
                });
            }
            let repo_size = stream_len(repo, repo_path).await?;
            Ok(BackupFileOutcome {
                copy_result: CopyResult::Checksum,
                copy_size: params.pg_file_size,
                repo_size,
                copy_checksum: Some(checksum),
                page_checksum_result: page_result,
            })
        }
        decision @ (Decision::Copy | Decision::ReCopy) => {
            let result = stream_copy(repo, &pg_path, repo_path, params, compress, cipher_passphrase).await?;
            let copy_result = if decision == Decision::Copy { CopyResult::Copy } else { CopyResult::ReCopy };
            Ok(BackupFileOutcome {
                copy_result,
                copy_size: result.size_in,
                repo_size: result.size_out,
                copy_checksum: Some(result.sha1_hex),
                page_checksum_result: result.page_errors.map(|(errors, aligned)| PageChecksumWire {
                    valid: errors.is_empty() && aligned,
                    errors,
                }),
            })
        }
    }
}

async fn hash_prefix(path: &Utf8Path, limit: u64) -> Result<String, WorkerError> {
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || -> Result<String, std::io::Error> {
        let file = std::fs::File::open(&path)?;
        let mut reader = file.take(limit);
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .expect("blocking hash task panicked")
    .map_err(WorkerError::Io)
}

struct StreamResult {
    size_in: u64,
    size_out: u64,
    sha1_hex: String,
    page_errors: Option<(Vec<page_check::PageErrorEntry>, bool)>,
}

#[allow(clippy::too_many_arguments)]
async fn stream_copy(
    repo: &dyn Repository,
    pg_path: &Utf8Path,
    repo_path: &Utf8Path,
    params: &BackupFileParams,
    compress: Option<CompressKind>,
    cipher_passphrase: Option<Vec<u8>>,
) -> Result<StreamResult, WorkerError> {
    let pipeline_config = PipelineConfig {
        page_checksum: params.pg_file_checksum_page.then_some(PageChecksumConfig {
            page_size: pg_control::DEFAULT_PAGE_SIZE,
            lsn_limit: Lsn(params.pg_file_checksum_page_lsn_limit),
        }),
        compress: compress.map(|kind| CompressConfig { kind, level: params.repo_file_compress_level }),
        cipher_passphrase,
    };

    let sink = repo.new_write(repo_path, WriteOptions { create_path: true, ..Default::default() }).await?;
    let bridge = SyncIoBridge::new(sink);

    let pg_path = pg_path.to_owned();
    let exact_limit = params.pg_file_copy_exact_size.then_some(params.pg_file_size);

    let result = tokio::task::spawn_blocking(move || -> Result<StreamResult, std::io::Error> {
        let file = std::fs::File::open(&pg_path)?;
        let mut reader: Box<dyn Read> = match exact_limit {
            Some(limit) => Box::new(file.take(limit)),
            None => Box::new(file),
        };
        let mut pipeline = Pipeline::new(&pipeline_config, bridge)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            pipeline.write(&buf[..n])?;
        }
        let finished = pipeline.finish()?;
        Ok(StreamResult {
            size_in: finished.size_in,
            size_out: finished.size_out,
            sha1_hex: finished.sha1_hex,
            page_errors: finished.page_errors,
        })
    })
    .await
    .expect("blocking copy task panicked")?;

    Ok(result)
}

async fn read_back(
    repo: &dyn Repository,
    repo_path: &Utf8Path,
    compress: Option<CompressKind>,
    cipher_passphrase: Option<&[u8]>,
    page_check: Option<(u32, Lsn)>,
) -> Result<(String, Option<PageChecksumWire>), WorkerError> {
    let stream = repo.new_read(repo_path).await?;
    let bridge = SyncIoBridge::new(stream);
    let cipher_passphrase = cipher_passphrase.map(|p| p.to_vec());

    tokio::task::spawn_blocking(move || -> Result<(String, Option<PageChecksumWire>), std::io::Error> {
        match page_check {
            None => {
                let sha1_hex = backup_filter::read_back_sha1(bridge, compress, cipher_passphrase.as_deref())?;
                Ok((sha1_hex, None))
            }
            Some((page_size, lsn_limit)) => {
                let plaintext = decode_chain(bridge, compress, cipher_passphrase.as_deref())?;
                let mut hasher = Sha1::new();
                let mut checker = backup_filter::IncrementalPageChecker::new(page_size, lsn_limit);
                let mut buf = [0u8; 64 * 1024];
                let mut reader = plaintext;
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                    checker.feed(&buf[..n]);
                }
                let (errors, aligned) = checker.finish();
                let valid = errors.is_empty() && aligned;
                Ok((hex::encode(hasher.finalize()), Some(PageChecksumWire { valid, errors })))
            }
        }
    })
    .await
    .expect("blocking read-back task panicked")
    .map_err(WorkerError::Io)
}

fn decode_chain<R: Read + 'static>(
    inner: R,
    compress: Option<CompressKind>,
    cipher_passphrase: Option<&[u8]>,
) -> std::io::Result<Box<dyn Read>> {
    use backup_filter::{CipherReader, DecompressReader};
    match (cipher_passphrase, compress) {
        (None, None) => Ok(Box::new(inner)),
        (Some(pw), None) => Ok(Box::new(CipherReader::new(pw, inner)?)),
        (None, Some(kind)) => Ok(Box::new(DecompressReader::new(kind, inner)?)),
        (Some(pw), Some(kind)) => {
            let deciphered = CipherReader::new(pw, inner)?;
            Ok(Box::new(DecompressReader::new(kind, deciphered)?))
        }
    }
}

async fn stream_len(repo: &dyn Repository, repo_path: &Utf8Path) -> Result<u64, WorkerError> {
    let parent = repo_path.parent().unwrap_or(Utf8Path::new(""));
    let name = repo_path.file_name().unwrap_or_default();
    let entries = repo.list(parent, ListOptions::default()).await?;
    Ok(entries.into_iter().find(|e| e.name == name).map(|e| e.size).unwrap_or(0))
}
