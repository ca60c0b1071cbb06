//! Builds a [`Manifest`] by walking a live `pg_data` directory (§4.E
//! `buildLive`). This only produces the *shape* of the manifest — sizes,
//! modes, ownership, page-checksum candidacy flags — it does not read file
//! contents or run the filter pipeline; that happens per-file in the file
//! copy worker (component H).

use std::collections::BTreeMap;
use std::os::unix::fs::{MetadataExt, PermissionsExt};

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use crate::error::ManifestError;
use crate::model::{Defaults, FileDefaults, FileInfo, LinkDefaults, LinkInfo, PathDefaults, PathInfo, Target};

/// Directories whose *contents* are never backed up (§4.E step 3).
const SKIP_DIR_CONTENTS: &[&str] = &[
    "pg_replslot",
    "pg_dynshmem",
    "pg_notify",
    "pg_serial",
    "pg_snapshots",
    "pg_stat_tmp",
    "pg_subtrans",
];

/// Individual files never backed up, matched by basename.
const SKIP_FILES: &[&str] = &["postmaster.pid", "postmaster.opts", "pg_internal.init"];

/// Page-checksum-ineligible relation fork suffixes: free-space map,
/// visibility map, and the init fork of unlogged tables don't carry the
/// same per-block checksum layout worth validating here.
const NON_CHECKSUM_FORK_SUFFIXES: &[&str] = &["_fsm", "_vm", "_init"];

pub struct BuildOptions {
    pub page_size: u32,
    pub include_wal: bool,
    pub expected_pg_version: String,
}

fn is_skipped(rel: &str, include_wal: bool) -> bool {
    let basename = rel.rsplit('/').next().unwrap_or(rel);
    if SKIP_FILES.contains(&basename) {
        return true;
    }
    if !include_wal && rel.starts_with("pg_wal/") {
        return true;
    }
    SKIP_DIR_CONTENTS.iter().any(|d| {
        let prefix = format!("{d}/");
        rel == *d || rel.starts_with(&prefix)
    })
}

fn is_temp_relation_file(basename: &str) -> bool {
    basename
        .strip_prefix('t')
        .map(|rest| rest.split_once('_').map(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit())).unwrap_or(false))
        .unwrap_or(false)
}

/// A regular relation file under `base/` or a tablespace directory, sized
/// as a nonzero multiple of the page size, whose fork suffix carries page
/// checksums.
fn is_checksum_candidate(rel: &str, size: u64, page_size: u32) -> bool {
    if size == 0 || size % page_size as u64 != 0 {
        return false;
    }
    if !(rel.starts_with("base/") || rel.starts_with("pg_tblspc/")) {
        return false;
    }
    let basename = rel.rsplit('/').next().unwrap_or(rel);
    !NON_CHECKSUM_FORK_SUFFIXES.iter().any(|suffix| basename.ends_with(suffix))
}

fn modal(rows: &[(u32, String, String)]) -> (u32, String, String) {
    let mut counts: BTreeMap<(u32, &str, &str), u32> = BTreeMap::new();
    for (mode, user, group) in rows {
        *counts.entry((*mode, user.as_str(), group.as_str())).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|((mode, user, group), _)| (mode, user.to_string(), group.to_string()))
        .unwrap_or((0o644, String::new(), String::new()))
}

/// Walks `pg_data_root`, producing the manifest's targets/paths/files/links
/// and collapsed defaults. Tablespaces are expected to already be resolved
/// into `extra_targets` by the caller (orchestrator), since following
/// `pg_tblspc/<id>` symlinks requires knowing the cluster's tablespace list
/// from §4.F, not just the filesystem.
pub fn build_live(
    pg_data_root: &Utf8Path,
    extra_targets: &BTreeMap<String, Target>,
    opts: &BuildOptions,
) -> Result<crate::model::Manifest, ManifestError> {
    let pg_version_path = pg_data_root.join("PG_VERSION");
    let found_version = std::fs::read_to_string(&pg_version_path)?.trim().to_string();
    if found_version != opts.expected_pg_version {
        return Err(ManifestError::PgVersionMismatch {
            expected: opts.expected_pg_version.clone(),
            found: found_version,
        });
    }

    let mut targets = extra_targets.clone();
    targets.insert(
        "pg_data".to_string(),
        Target { path: pg_data_root.to_string(), tablespace_id: None, tablespace_name: None },
    );

    let mut files = BTreeMap::new();
    let mut paths = BTreeMap::new();
    let mut links = BTreeMap::new();

    let mut file_rows = Vec::new();
    let mut path_rows = Vec::new();
    let mut link_rows = Vec::new();

    for entry in WalkDir::new(pg_data_root.as_std_path())
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = Utf8PathBuf::from_path_buf(entry.path().to_path_buf())
            .expect("cluster paths must be UTF-8");
        let rel = match path.strip_prefix(pg_data_root) {
            Ok(r) if !r.as_str().is_empty() => r.to_string(),
            _ => continue, // the root itself
        };
        if is_skipped(&rel, opts.include_wal) {
            continue;
        }

        let name = format!("pg_data/{rel}");
        let meta = entry.metadata().map_err(std::io::Error::from)?;
        let mode = meta.permissions().mode() & 0o7777;
        let user = meta.uid().to_string();
        let group = meta.gid().to_string();
        let mtime = meta.mtime();

        if meta.file_type().is_symlink() {
            let destination = std::fs::read_link(entry.path())?
                .to_string_lossy()
                .into_owned();
            link_rows.push((mode, user.clone(), group.clone()));
            links.insert(name, LinkInfo { destination, user: Some(user), group: Some(group) });
        } else if meta.is_dir() {
            path_rows.push((mode, user.clone(), group.clone()));
            paths.insert(name, PathInfo { mode: Some(mode), user: Some(user), group: Some(group) });
        } else {
            let basename = rel.rsplit('/').next().unwrap_or(&rel);
            if is_temp_relation_file(basename) {
                continue;
            }
            let size = meta.len();
            let checksum_page = if is_checksum_candidate(&rel, size, opts.page_size) {
                Some(false) // provisional; the file copy worker fills in the real result
            } else {
                None
            };
            file_rows.push((mode, user.clone(), group.clone()));
            files.insert(
                name.clone(),
                FileInfo {
                    name,
                    size,
                    size_repo: 0,
                    timestamp: mtime,
                    mode: Some(mode),
                    user: Some(user),
                    group: Some(group),
                    sha1: None,
                    checksum_page,
                    checksum_page_error_list: None,
                    reference: None,
                    master: true,
                    primary: true,
                },
            );
        }
    }

    let (file_mode, file_user, file_group) = modal(&file_rows);
    let (path_mode, path_user, path_group) = modal(&path_rows);
    let (_, link_user, link_group) = modal(&link_rows);

    for info in files.values_mut() {
        if info.mode == Some(file_mode) { info.mode = None; }
        if info.user.as_deref() == Some(file_user.as_str()) { info.user = None; }
        if info.group.as_deref() == Some(file_group.as_str()) { info.group = None; }
    }
    for info in paths.values_mut() {
        if info.mode == Some(path_mode) { info.mode = None; }
        if info.user.as_deref() == Some(path_user.as_str()) { info.user = None; }
        if info.group.as_deref() == Some(path_group.as_str()) { info.group = None; }
    }
    for info in links.values_mut() {
        if info.user.as_deref() == Some(link_user.as_str()) { info.user = None; }
        if info.group.as_deref() == Some(link_group.as_str()) { info.group = None; }
    }

    let defaults = Defaults {
        file: FileDefaults { mode: file_mode, user: file_user, group: file_group },
        path: PathDefaults { mode: path_mode, user: path_user, group: path_group },
        link: LinkDefaults { user: link_user, group: link_group },
    };

    Ok(crate::model::Manifest {
        data: crate::model::ManifestData {
            backup_label: String::new(),
            backup_type: crate::model::BackupType::Full,
            backup_label_prior: None,
            pg_version: opts.expected_pg_version.clone(),
            system_id: 0,
            wal_start: None,
            wal_stop: None,
            lsn_start: None,
            lsn_stop: None,
            timestamp_start: 0,
            timestamp_stop: None,
            compress_type: None,
            hardlink: false,
            checksum_page: false,
            delta: false,
        },
        targets,
        paths,
        files,
        links,
        defaults,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    fn write(dir: &Utf8Path, rel: &str, data: &[u8]) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn skips_excluded_entries_and_flags_checksum_candidates() {
        let dir = Utf8TempDir::new().unwrap();
        let root = dir.path();
        write(root, "PG_VERSION", b"13\n");
        write(root, "postmaster.pid", b"1234\n");
        write(root, "base/16384/16385", &vec![0u8; 8192 * 2]);
        write(root, "base/16384/16385_fsm", &vec![0u8; 8192]);
        write(root, "pg_stat_tmp/db_0.stat", b"junk");

        let opts = BuildOptions { page_size: 8192, include_wal: false, expected_pg_version: "13".into() };
        let manifest = build_live(root, &BTreeMap::new(), &opts).unwrap();

        assert!(!manifest.files.contains_key("pg_data/postmaster.pid"));
        assert!(!manifest.files.keys().any(|k| k.starts_with("pg_data/pg_stat_tmp")));
        assert_eq!(manifest.files["pg_data/base/16384/16385"].checksum_page, Some(false));
        assert_eq!(manifest.files["pg_data/base/16384/16385_fsm"].checksum_page, None);
    }

    #[test]
    fn pg_wal_is_skipped_unless_include_wal_is_set() {
        let dir = Utf8TempDir::new().unwrap();
        let root = dir.path();
        write(root, "PG_VERSION", b"13\n");
        write(root, "pg_wal/000000010000000000000001", b"wal");

        let opts = BuildOptions { page_size: 8192, include_wal: false, expected_pg_version: "13".into() };
        let manifest = build_live(root, &BTreeMap::new(), &opts).unwrap();
        assert!(!manifest.files.keys().any(|k| k.starts_with("pg_data/pg_wal")));

        let opts = BuildOptions { page_size: 8192, include_wal: true, expected_pg_version: "13".into() };
        let manifest = build_live(root, &BTreeMap::new(), &opts).unwrap();
        assert!(manifest.files.contains_key("pg_data/pg_wal/000000010000000000000001"));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let dir = Utf8TempDir::new().unwrap();
        write(dir.path(), "PG_VERSION", b"9.6\n");
        let opts = BuildOptions { page_size: 8192, include_wal: false, expected_pg_version: "13".into() };
        let err = build_live(dir.path(), &BTreeMap::new(), &opts).unwrap_err();
        assert!(matches!(err, ManifestError::PgVersionMismatch { .. }));
    }
}
