//! Resume engine (§4.J): decides whether a halted partial backup of the
//! same label type can be continued, and if so, which of its already-copied
//! files can be trusted without a second read of the source.

use std::collections::BTreeMap;

use camino::Utf8Path;

use backup_manifest::{FileInfo, Manifest};
use backup_storage::{EntryType, ListOptions, Repository};
use utils::error::{BackupErrorKind, Classify};

#[derive(Debug, thiserror::Error)]
pub enum ResumeRejection {
    #[error("resume is disabled")]
    Disabled,
    #[error("resumed manifest's pg version ({resumed}) does not match the live cluster ({live})")]
    VersionChanged { resumed: String, live: String },
    #[error("resumed manifest's prior-backup label ({resumed:?}) disagrees with the current run ({current:?})")]
    PriorLabelChanged { resumed: Option<String>, current: Option<String> },
    #[error("resumed manifest's compression type ({resumed:?}) disagrees with the current run ({current:?})")]
    CompressionChanged { resumed: Option<String>, current: Option<String> },
}

impl Classify for ResumeRejection {
    fn kind(&self) -> BackupErrorKind {
        BackupErrorKind::ResumeIncompatibleError
    }
}

/// Whether a partial backup's manifest is compatible enough to resume from,
/// rather than being purged and restarted clean (§4.J reject-and-purge).
pub fn check_compatibility(
    resumed: &Manifest,
    live_pg_version: &str,
    current_prior_label: Option<&str>,
    current_compress_type: Option<&str>,
    resume_enabled: bool,
) -> Result<(), ResumeRejection> {
    if !resume_enabled {
        return Err(ResumeRejection::Disabled);
    }
    if resumed.data.pg_version != live_pg_version {
        return Err(ResumeRejection::VersionChanged {
            resumed: resumed.data.pg_version.clone(),
            live: live_pg_version.to_string(),
        });
    }
    if resumed.data.backup_label_prior.as_deref() != current_prior_label {
        return Err(ResumeRejection::PriorLabelChanged {
            resumed: resumed.data.backup_label_prior.clone(),
            current: current_prior_label.map(str::to_string),
        });
    }
    if resumed.data.compress_type.as_deref() != current_compress_type {
        return Err(ResumeRejection::CompressionChanged {
            resumed: resumed.data.compress_type.clone(),
            current: current_compress_type.map(str::to_string),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResumeAction {
    /// The prior attempt's repo bytes and checksum can be trusted as-is; the
    /// file copy worker skips re-reading the source entirely.
    KeepChecksum { sha1: String },
    /// Something about this entry can't be trusted; the file is copied fresh.
    Remove,
}

/// Per-file reconciliation against one entry of the resumed manifest
/// (§4.J accept path). `repo_size` is `None` when the partial backup never
/// got as far as writing this file's repo copy.
#[allow(clippy::too_many_arguments)]
pub fn plan_file(
    resumed: &Manifest,
    live: &FileInfo,
    repo_size: Option<u64>,
    is_live_symlink: bool,
    compress_suffix_matches: bool,
) -> FileResumeAction {
    let Some(prior) = resumed.files.get(&live.name) else {
        return FileResumeAction::Remove;
    };
    if prior.reference.is_some() {
        return FileResumeAction::Remove;
    }
    if is_live_symlink {
        return FileResumeAction::Remove;
    }
    if !compress_suffix_matches {
        return FileResumeAction::Remove;
    }
    if live.size == 0 {
        return FileResumeAction::Remove;
    }
    let Some(repo_size) = repo_size else {
        return FileResumeAction::Remove;
    };
    if repo_size != live.size || prior.size != live.size {
        return FileResumeAction::Remove;
    }
    if prior.timestamp != live.timestamp {
        return FileResumeAction::Remove;
    }
    match &prior.sha1 {
        Some(sha1) => FileResumeAction::KeepChecksum { sha1: sha1.clone() },
        None => FileResumeAction::Remove,
    }
}

pub struct ResumePlan {
    /// File name -> checksum to carry forward without a fresh read.
    pub keep_checksum: BTreeMap<String, String>,
    /// Set when any live file's timestamp is ahead of `backup_start` (§4.J:
    /// forces delta mode with a warning, since mtimes can't be trusted to
    /// order changes against a backup that started "in the future" from the
    /// file's point of view).
    pub force_delta: bool,
}

/// Loads the partial backup's repo file sizes and walks `live_files` against
/// the resumed manifest, producing which files can keep their checksum.
/// `compress_suffix` returns the compression suffix (if any) the current run
/// would use for a given file name, to compare against what's on disk.
pub async fn plan_resume(
    repo: &dyn Repository,
    partial_dir: &Utf8Path,
    resumed: &Manifest,
    live_files: &BTreeMap<String, FileInfo>,
    symlinks: &std::collections::BTreeSet<String>,
    compress_suffix: impl Fn(&str) -> Option<String>,
    backup_start: i64,
) -> Result<ResumePlan, backup_storage::StorageError> {
    let entries = repo.list(partial_dir, ListOptions { recurse: true, sort: false }).await?;
    let mut repo_sizes: BTreeMap<String, u64> = BTreeMap::new();
    for entry in entries {
        if entry.kind == EntryType::File {
            repo_sizes.insert(entry.name, entry.size);
        }
    }

    let mut keep_checksum = BTreeMap::new();
    let mut force_delta = false;

    for (name, live) in live_files {
        if live.timestamp > backup_start {
            force_delta = true;
        }

        // The backup's compression type is a single run-wide setting
        // (`ManifestData::compress_type`), already checked against the
        // resumed manifest by `check_compatibility`; a per-file suffix
        // mismatch can only mean the repo file itself is missing or was
        // written under a stale setting, which the size/lookup below
        // already catches.
        let suffix = compress_suffix(name);
        let repo_name = match &suffix {
            Some(s) => format!("{name}.{s}"),
            None => name.clone(),
        };

        let repo_size = repo_sizes.get(&repo_name).copied();
        let is_live_symlink = symlinks.contains(name);

        match plan_file(resumed, live, repo_size, is_live_symlink, true) {
            FileResumeAction::KeepChecksum { sha1 } => {
                keep_checksum.insert(name.clone(), sha1);
            }
            FileResumeAction::Remove => {}
        }
    }

    Ok(ResumePlan { keep_checksum, force_delta })
}
