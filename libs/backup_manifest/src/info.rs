//! `backup.info`: the index of completed backups for one stanza. A much
//! smaller sectioned-text document than the per-backup manifest, but it
//! shares the same two-pass buffer-then-checksum discipline (§9) since the
//! original keeps both in the same save/load family.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::ManifestError;
use crate::model::BackupType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSetEntry {
    pub label: String,
    pub backup_type: BackupType,
    pub prior_label: Option<String>,
    pub pg_version: String,
    pub timestamp_start: i64,
    pub timestamp_stop: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupSetInfo {
    pub backups: BTreeMap<String, BackupSetEntry>,
}

impl BackupSetInfo {
    pub fn insert(&mut self, entry: BackupSetEntry) {
        self.backups.insert(entry.label.clone(), entry);
    }

    /// The most recent full backup, used when a diff/incr request has
    /// nothing to reference and must coerce to full (§4.I).
    pub fn latest_full(&self) -> Option<&BackupSetEntry> {
        self.backups
            .values()
            .filter(|e| matches!(e.backup_type, BackupType::Full))
            .max_by_key(|e| e.timestamp_start)
    }

    pub fn latest(&self) -> Option<&BackupSetEntry> {
        self.backups.values().max_by_key(|e| e.timestamp_start)
    }
}

fn body(info: &BackupSetInfo) -> String {
    let mut buf = String::new();
    buf.push_str("[db:backup]\n");
    for (label, entry) in &info.backups {
        let json = serde_json::to_value(entry).expect("BackupSetEntry always serializes");
        buf.push_str(label);
        buf.push('=');
        buf.push_str(&json.to_string());
        buf.push('\n');
    }
    buf
}

pub fn save(info: &BackupSetInfo) -> String {
    let mut buf = body(info);
    let checksum = hex::encode(Sha1::digest(buf.as_bytes()));
    buf.push_str("[backrest]\n");
    buf.push_str(&format!("backrest-checksum={checksum:?}\n"));
    buf
}

pub fn load(text: &str) -> Result<BackupSetInfo, ManifestError> {
    let marker = "\n[backrest]\n";
    let split_at = text
        .find(marker)
        .ok_or_else(|| ManifestError::FormatError("missing [backrest] trailer".into()))?;
    let body_text = &text[..split_at + 1];
    let trailer_text = &text[split_at + marker.len()..];

    let computed = hex::encode(Sha1::digest(body_text.as_bytes()));
    let stored = trailer_text
        .lines()
        .find_map(|line| line.strip_prefix("backrest-checksum="))
        .map(|v| v.trim_matches('"').to_string())
        .ok_or_else(|| ManifestError::FormatError("missing backrest-checksum key".into()))?;
    if stored != computed {
        return Err(ManifestError::ChecksumError { stored, computed });
    }

    let mut backups = BTreeMap::new();
    for line in body_text.lines() {
        if line.is_empty() || line.starts_with('[') {
            continue;
        }
        let (label, value) = line
            .split_once('=')
            .ok_or_else(|| ManifestError::FormatError(format!("malformed line: {line}")))?;
        let entry: BackupSetEntry = serde_json::from_str(value)
            .map_err(|e| ManifestError::FormatError(format!("bad entry for {label}: {e}")))?;
        backups.insert(label.to_string(), entry);
    }

    Ok(BackupSetInfo { backups })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_finds_latest_full() {
        let mut info = BackupSetInfo::default();
        info.insert(BackupSetEntry {
            label: "20260701-000000F".into(),
            backup_type: BackupType::Full,
            prior_label: None,
            pg_version: "13".into(),
            timestamp_start: 1,
            timestamp_stop: 2,
        });
        info.insert(BackupSetEntry {
            label: "20260702-000000F_20260702-010000I".into(),
            backup_type: BackupType::Incr,
            prior_label: Some("20260701-000000F".into()),
            pg_version: "13".into(),
            timestamp_start: 3,
            timestamp_stop: 4,
        });

        let text = save(&info);
        let loaded = load(&text).unwrap();
        assert_eq!(loaded.backups.len(), 2);
        assert_eq!(loaded.latest_full().unwrap().label, "20260701-000000F");
    }

    #[test]
    fn tampered_checksum_is_rejected() {
        let info = BackupSetInfo::default();
        let mut text = save(&info);
        let pos = text.rfind("backrest-checksum=").unwrap();
        text.replace_range(pos + 20..pos + 21, "0");
        assert!(load(&text).is_err());
    }
}
