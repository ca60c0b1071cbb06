//! Typed configuration surface (§1.3): a plain `serde`-deserializable
//! struct a future CLI/env-var layer populates. No parsing logic lives
//! here — this crate is only ever handed an already-built `BackupConfig`.

use std::collections::BTreeMap;

use backup_manifest::BackupType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CipherType {
    None,
    Aes256Cbc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    pub stanza: String,
    /// `pg1-path`..`pg8-path` (and matching `-host`) collapsed into one map
    /// keyed by the PostgreSQL index used in the env-documented names (§6).
    pub pg_hosts: BTreeMap<u8, HostConfig>,
    pub repo_path: String,
    pub process_max: u32,

    pub backup_type: BackupType,
    pub start_fast: bool,
    pub stop_auto: bool,
    pub checksum_page: bool,
    pub compress_type: Option<String>,
    pub compress_level: i32,
    pub repo_hardlink: bool,
    pub repo_cipher_type: CipherType,
    /// Read from an env var by the caller, never from a config file (§6).
    pub repo_cipher_pass: Option<String>,

    pub backup_standby: bool,
    pub online: bool,
    pub force: bool,
    pub delta: bool,
    pub resume: bool,
    pub manifest_save_threshold: u64,
    pub archive_check: bool,
    pub archive_copy: bool,
    pub archive_timeout: std::time::Duration,
}

impl BackupConfig {
    pub fn primary(&self) -> Option<&HostConfig> {
        self.pg_hosts.get(&1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_json() {
        let json = serde_json::json!({
            "stanza": "main",
            "pgHosts": {"1": {"host": "primary", "path": "/var/lib/postgresql/13/main"}},
            "repoPath": "/var/backups/pg",
            "processMax": 4,
            "backupType": "full",
            "startFast": true,
            "stopAuto": true,
            "checksumPage": true,
            "compressType": "zst",
            "compressLevel": 3,
            "repoHardlink": false,
            "repoCipherType": "none",
            "repoCipherPass": null,
            "backupStandby": false,
            "online": true,
            "force": false,
            "delta": false,
            "resume": true,
            "manifestSaveThreshold": 67108864,
            "archiveCheck": true,
            "archiveCopy": false,
            "archiveTimeout": {"secs": 60, "nanos": 0},
        });
        let config: BackupConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.stanza, "main");
        assert_eq!(config.primary().unwrap().host, "primary");
    }
}
