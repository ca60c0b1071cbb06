//! Sectioned text format: `[section]` headers, `key=<json-value>` lines
//! sorted within each section, terminated by a `[backrest]` section holding
//! a checksum of every byte written above it.
//!
//! Per the two-pass discipline in the design notes: the body is built in an
//! in-memory buffer first, the checksum is computed over that buffer, and
//! only then is the trailer appended and the whole thing handed to the
//! caller to flush. There is no streaming-to-disk path that skips this.

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use crate::error::ManifestError;
use crate::model::{Defaults, FileInfo, LinkInfo, Manifest, ManifestData, PathInfo, Target};

fn kv(buf: &mut String, key: &str, value: &serde_json::Value) {
    buf.push_str(key);
    buf.push('=');
    buf.push_str(&value.to_string());
    buf.push('\n');
}

fn write_section<T: serde::Serialize>(buf: &mut String, header: &str, entries: &BTreeMap<String, T>) {
    if entries.is_empty() {
        return;
    }
    buf.push('[');
    buf.push_str(header);
    buf.push_str("]\n");
    for (name, value) in entries {
        let json = serde_json::to_value(value).expect("manifest values are always serializable");
        kv(buf, name, &json);
    }
}

fn body(manifest: &Manifest) -> String {
    let mut buf = String::new();

    buf.push_str("[backup]\n");
    let data = serde_json::to_value(&manifest.data).expect("ManifestData always serializes");
    if let serde_json::Value::Object(map) = data {
        let sorted: BTreeMap<String, serde_json::Value> = map.into_iter().collect();
        for (key, value) in sorted {
            kv(&mut buf, &key, &value);
        }
    }

    write_section(&mut buf, "backup:target", &manifest.targets);
    write_section(&mut buf, "backup:path", &manifest.paths);
    write_section(&mut buf, "backup:file", &manifest.files);
    write_section(&mut buf, "backup:link", &manifest.links);

    buf.push_str("[backup:default]\n");
    let defaults = serde_json::to_value(&manifest.defaults).expect("Defaults always serializes");
    kv(&mut buf, "default", &defaults);

    buf
}

pub fn save(manifest: &Manifest) -> String {
    let mut buf = body(manifest);
    let checksum = hex::encode(Sha1::digest(buf.as_bytes()));
    buf.push_str("[backrest]\n");
    buf.push_str(&format!("backrest-checksum={:?}\n", checksum));
    buf
}

pub fn load(text: &str) -> Result<Manifest, ManifestError> {
    let marker = "\n[backrest]\n";
    let split_at = text
        .find(marker)
        .ok_or_else(|| ManifestError::FormatError("missing [backrest] trailer".into()))?;
    let body_text = &text[..split_at + 1]; // keep trailing newline, matches what `save` hashed
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

    parse_body(body_text)
}

fn parse_body(text: &str) -> Result<Manifest, ManifestError> {
    let mut sections: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ManifestError::FormatError(format!("malformed line: {line}")))?;
        let parsed: serde_json::Value = serde_json::from_str(value)
            .map_err(|e| ManifestError::FormatError(format!("bad JSON value for {key}: {e}")))?;
        sections.entry(current.clone()).or_default().insert(key.to_string(), parsed);
    }

    let backup = sections
        .remove("backup")
        .ok_or_else(|| ManifestError::FormatError("missing [backup] section".into()))?;
    let data: ManifestData = serde_json::from_value(serde_json::Value::Object(backup.into_iter().collect()))
        .map_err(|e| ManifestError::FormatError(format!("bad [backup] section: {e}")))?;

    let targets = decode_section::<Target>(&mut sections, "backup:target")?;
    let paths = decode_section::<PathInfo>(&mut sections, "backup:path")?;
    let files = decode_section::<FileInfo>(&mut sections, "backup:file")?;
    let links = decode_section::<LinkInfo>(&mut sections, "backup:link")?;

    let defaults = sections
        .remove("backup:default")
        .and_then(|mut m| m.remove("default"))
        .map(serde_json::from_value::<Defaults>)
        .transpose()
        .map_err(|e| ManifestError::FormatError(format!("bad [backup:default] section: {e}")))?
        .unwrap_or_default();

    Ok(Manifest { data, targets, paths, files, links, defaults })
}

fn decode_section<T: serde::de::DeserializeOwned>(
    sections: &mut BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    name: &str,
) -> Result<BTreeMap<String, T>, ManifestError> {
    let Some(entries) = sections.remove(name) else {
        return Ok(BTreeMap::new());
    };
    entries
        .into_iter()
        .map(|(k, v)| {
            let parsed = serde_json::from_value(v)
                .map_err(|e| ManifestError::FormatError(format!("bad entry {k} in [{name}]: {e}")))?;
            Ok((k, parsed))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BackupType, Defaults, FileDefaults, LinkDefaults, PathDefaults};
    use std::collections::BTreeMap;

    fn sample_manifest() -> Manifest {
        let mut files = BTreeMap::new();
        files.insert(
            "pg_data/PG_VERSION".to_string(),
            FileInfo {
                name: "pg_data/PG_VERSION".to_string(),
                size: 3,
                size_repo: 3,
                timestamp: 1_700_000_000,
                mode: None,
                user: None,
                group: None,
                sha1: Some("da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string()),
                checksum_page: None,
                checksum_page_error_list: None,
                reference: None,
                master: true,
                primary: true,
            },
        );

        let mut targets = BTreeMap::new();
        targets.insert(
            "pg_data".to_string(),
            Target { path: "/var/lib/postgresql/13/main".to_string(), tablespace_id: None, tablespace_name: None },
        );

        Manifest {
            data: ManifestData {
                backup_label: "20260730-120000F".to_string(),
                backup_type: BackupType::Full,
                backup_label_prior: None,
                pg_version: "13".to_string(),
                system_id: 7_123_456_789,
                wal_start: None,
                wal_stop: None,
                lsn_start: None,
                lsn_stop: None,
                timestamp_start: 1_700_000_000,
                timestamp_stop: Some(1_700_000_060),
                compress_type: Some("zst".to_string()),
                hardlink: false,
                checksum_page: true,
                delta: false,
            },
            targets,
            paths: BTreeMap::new(),
            files,
            links: BTreeMap::new(),
            defaults: Defaults {
                file: FileDefaults { mode: 0o600, user: "postgres".into(), group: "postgres".into() },
                path: PathDefaults { mode: 0o700, user: "postgres".into(), group: "postgres".into() },
                link: LinkDefaults { user: "postgres".into(), group: "postgres".into() },
            },
        }
    }

    #[test]
    fn round_trips() {
        let manifest = sample_manifest();
        let text = save(&manifest);
        let loaded = load(&text).unwrap();
        assert_eq!(loaded.data.backup_label, manifest.data.backup_label);
        assert_eq!(loaded.files.len(), manifest.files.len());
        assert_eq!(
            loaded.files["pg_data/PG_VERSION"].sha1,
            manifest.files["pg_data/PG_VERSION"].sha1
        );
    }

    #[test]
    fn corrupted_body_fails_checksum() {
        let manifest = sample_manifest();
        let mut text = save(&manifest);
        let pos = text.find("system_id").unwrap();
        text.replace_range(pos..pos + 1, "X");
        let err = load(&text).unwrap_err();
        assert!(matches!(err, ManifestError::ChecksumError { .. }));
    }

    #[test]
    fn corrupted_trailer_fails_checksum() {
        let manifest = sample_manifest();
        let mut text = save(&manifest);
        let pos = text.rfind("backrest-checksum=").unwrap();
        text.replace_range(pos + 20..pos + 21, "f");
        let err = load(&text).unwrap_err();
        assert!(matches!(err, ManifestError::ChecksumError { .. }));
    }
}
