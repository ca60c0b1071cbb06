use std::collections::BTreeMap;

use page_check::PageErrorEntry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Diff,
    Incr,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Diff => "diff",
            BackupType::Incr => "incr",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestData {
    pub backup_label: String,
    pub backup_type: BackupType,
    pub backup_label_prior: Option<String>,
    pub pg_version: String,
    pub system_id: u64,
    pub wal_start: Option<String>,
    pub wal_stop: Option<String>,
    pub lsn_start: Option<u64>,
    pub lsn_stop: Option<u64>,
    pub timestamp_start: i64,
    pub timestamp_stop: Option<i64>,
    pub compress_type: Option<String>,
    pub hardlink: bool,
    pub checksum_page: bool,
    pub delta: bool,
}

/// A backup-source root: `pg_data` itself, or one tablespace reached via its
/// `pg_tblspc/<id>` symlink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub path: String,
    pub tablespace_id: Option<u32>,
    pub tablespace_name: Option<String>,
}

/// Per-directory metadata, present only where it differs from
/// [`Defaults::path`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathInfo {
    pub mode: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub size_repo: u64,
    pub timestamp: i64,
    pub mode: Option<u32>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub sha1: Option<String>,
    pub checksum_page: Option<bool>,
    pub checksum_page_error_list: Option<Vec<PageErrorEntry>>,
    /// Label of the prior backup holding this file's bytes, if any.
    pub reference: Option<String>,
    /// Copied from the primary rather than a standby during a
    /// `backup-standby` run.
    pub master: bool,
    pub primary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkInfo {
    pub destination: String,
    pub user: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileDefaults {
    pub mode: u32,
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathDefaults {
    pub mode: u32,
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkDefaults {
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    pub file: FileDefaults,
    pub path: PathDefaults,
    pub link: LinkDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub data: ManifestData,
    pub targets: BTreeMap<String, Target>,
    pub paths: BTreeMap<String, PathInfo>,
    pub files: BTreeMap<String, FileInfo>,
    pub links: BTreeMap<String, LinkInfo>,
    pub defaults: Defaults,
}

impl Manifest {
    /// Every name must resolve under exactly one of `pg_data/` or
    /// `pg_tblspc/<id>/` (§3 invariant); callers that build a manifest by
    /// hand (tests, the live-cluster walker) rely on this holding.
    pub fn target_for<'a>(&self, name: &'a str) -> Option<&'a str> {
        if name.starts_with("pg_data/") {
            Some("pg_data")
        } else if name.starts_with("pg_tblspc/") {
            name.split('/').nth(1)
        } else {
            None
        }
    }
}
