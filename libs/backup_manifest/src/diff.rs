//! Diff/incr classification against a prior backup's manifest (§4.E
//! "Diff/Incr mode").

use crate::model::{FileInfo, Manifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    /// Bytes are reused from the prior backup; `sizeRepo` stays 0 in the
    /// new backup's footprint.
    Reference,
    Copy,
}

/// Classifies one live file against the prior backup's manifest entry of
/// the same name, if any. `delta` selects sha1-based matching over the
/// cheaper size+timestamp check.
pub fn classify(prior: &Manifest, live: &FileInfo, delta: bool) -> FileClassification {
    let Some(prior_file) = prior.files.get(&live.name) else {
        return FileClassification::Copy;
    };

    let matches = if delta {
        match (&prior_file.sha1, &live.sha1) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    } else {
        prior_file.size == live.size && prior_file.timestamp == live.timestamp
    };

    if matches {
        FileClassification::Reference
    } else {
        FileClassification::Copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupType, Defaults, ManifestData, Target};
    use std::collections::BTreeMap;

    fn file(name: &str, size: u64, timestamp: i64, sha1: Option<&str>) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            size,
            size_repo: size,
            timestamp,
            mode: None,
            user: None,
            group: None,
            sha1: sha1.map(String::from),
            checksum_page: None,
            checksum_page_error_list: None,
            reference: None,
            master: true,
            primary: true,
        }
    }

    fn manifest_with(files: Vec<FileInfo>) -> Manifest {
        Manifest {
            data: ManifestData {
                backup_label: "20260729-000000F".into(),
                backup_type: BackupType::Full,
                backup_label_prior: None,
                pg_version: "13".into(),
                system_id: 1,
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
            targets: BTreeMap::new(),
            paths: BTreeMap::new(),
            files: files.into_iter().map(|f| (f.name.clone(), f)).collect(),
            links: BTreeMap::new(),
            defaults: Defaults::default(),
        }
    }

    #[test]
    fn unchanged_file_by_size_and_timestamp_is_a_reference() {
        let prior = manifest_with(vec![file("pg_data/a", 10, 100, Some("x"))]);
        let live = file("pg_data/a", 10, 100, None);
        assert_eq!(classify(&prior, &live, false), FileClassification::Reference);
    }

    #[test]
    fn changed_timestamp_without_delta_is_a_copy() {
        let prior = manifest_with(vec![file("pg_data/a", 10, 100, Some("x"))]);
        let live = file("pg_data/a", 10, 200, None);
        assert_eq!(classify(&prior, &live, false), FileClassification::Copy);
    }

    #[test]
    fn matching_sha1_under_delta_is_a_reference_even_if_timestamp_moved() {
        let prior = manifest_with(vec![file("pg_data/a", 10, 100, Some("abc"))]);
        let live = file("pg_data/a", 10, 999, Some("abc"));
        assert_eq!(classify(&prior, &live, true), FileClassification::Reference);
    }

    #[test]
    fn new_file_not_in_prior_is_a_copy() {
        let prior = manifest_with(vec![]);
        let live = file("pg_data/new", 5, 1, None);
        assert_eq!(classify(&prior, &live, false), FileClassification::Copy);
    }
}
