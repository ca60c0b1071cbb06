use byteorder::{ByteOrder, LittleEndian};

use crate::versions::{
    VERSIONS, CATALOG_VERSION_OFFSET, FIXED_WAL_SEGMENT_SIZE, PG_CONTROL_VERSION_OFFSET,
    SYSTEM_IDENTIFIER_OFFSET,
};
use utils::error::{BackupErrorKind, Classify};

/// Raw `pg_control` files are always this big, regardless of major version.
pub const PG_CONTROL_FILE_SIZE: usize = 8192;

pub const DEFAULT_PAGE_SIZE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PgMajorVersion {
    V83,
    V84,
    V90,
    V91,
    V92,
    V93,
    V94,
    V95,
    V96,
    V100,
    V110,
    V120,
    V130,
}

impl PgMajorVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            PgMajorVersion::V83 => "8.3",
            PgMajorVersion::V84 => "8.4",
            PgMajorVersion::V90 => "9.0",
            PgMajorVersion::V91 => "9.1",
            PgMajorVersion::V92 => "9.2",
            PgMajorVersion::V93 => "9.3",
            PgMajorVersion::V94 => "9.4",
            PgMajorVersion::V95 => "9.5",
            PgMajorVersion::V96 => "9.6",
            PgMajorVersion::V100 => "10",
            PgMajorVersion::V110 => "11",
            PgMajorVersion::V120 => "12",
            PgMajorVersion::V130 => "13",
        }
    }
}

impl std::fmt::Display for PgMajorVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster identity and crash-recovery metadata parsed out of
/// `global/pg_control`. Immutable once parsed: if the file changes underfoot
/// that's a new backup attempt's problem, not this value's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgControl {
    pub version: PgMajorVersion,
    pub system_id: u64,
    pub catalog_version: u32,
    pub page_size: u32,
    pub wal_segment_size: u32,
    pub page_checksum_enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlFileError {
    #[error("pg_control is {actual} bytes, expected {expected}")]
    WrongSize { expected: usize, actual: usize },
    #[error("pg_control does not match any known PostgreSQL major version (8.3-13)")]
    UnrecognizedVersion,
}

impl Classify for ControlFileError {
    fn kind(&self) -> BackupErrorKind {
        BackupErrorKind::FormatError
    }
}

/// Parses raw `pg_control` bytes by trying each major version's recognizer
/// in turn. Exactly one recognizer is expected to match a genuine control
/// file; the first match wins.
pub fn parse_control_file(bytes: &[u8]) -> Result<PgControl, ControlFileError> {
    if bytes.len() < PG_CONTROL_FILE_SIZE {
        return Err(ControlFileError::WrongSize {
            expected: PG_CONTROL_FILE_SIZE,
            actual: bytes.len(),
        });
    }

    let system_id = LittleEndian::read_u64(&bytes[SYSTEM_IDENTIFIER_OFFSET..]);
    let file_control_version = LittleEndian::read_u32(&bytes[PG_CONTROL_VERSION_OFFSET..]);
    let file_catalog_version = LittleEndian::read_u32(&bytes[CATALOG_VERSION_OFFSET..]);

    for spec in VERSIONS {
        if spec.pg_control_version == file_control_version
            && spec.catalog_version == file_catalog_version
        {
            let page_size = LittleEndian::read_u32(&bytes[spec.blcksz_offset..]);
            let wal_segment_size = match spec.xlog_seg_size_offset {
                Some(offset) => LittleEndian::read_u32(&bytes[offset..]),
                None => FIXED_WAL_SEGMENT_SIZE,
            };
            let page_checksum_enabled = match spec.data_checksum_offset {
                Some(offset) => LittleEndian::read_u32(&bytes[offset..]) != 0,
                None => false,
            };

            return Ok(PgControl {
                version: spec.major,
                system_id,
                catalog_version: file_catalog_version,
                page_size,
                wal_segment_size,
                page_checksum_enabled,
            });
        }
    }

    Err(ControlFileError::UnrecognizedVersion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_for(spec_index: usize, page_size: u32, wal_segment_size: u32, checksums: bool) -> Vec<u8> {
        let spec = &VERSIONS[spec_index];
        let mut buf = vec![0u8; PG_CONTROL_FILE_SIZE];
        LittleEndian::write_u64(&mut buf[SYSTEM_IDENTIFIER_OFFSET..], 0x1234_5678_9abc_def0);
        LittleEndian::write_u32(&mut buf[PG_CONTROL_VERSION_OFFSET..], spec.pg_control_version);
        LittleEndian::write_u32(&mut buf[CATALOG_VERSION_OFFSET..], spec.catalog_version);
        LittleEndian::write_u32(&mut buf[spec.blcksz_offset..], page_size);
        if let Some(offset) = spec.xlog_seg_size_offset {
            LittleEndian::write_u32(&mut buf[offset..], wal_segment_size);
        }
        if let Some(offset) = spec.data_checksum_offset {
            LittleEndian::write_u32(&mut buf[offset..], if checksums { 1 } else { 0 });
        }
        buf
    }

    #[test]
    fn parses_each_known_major() {
        for (i, spec) in VERSIONS.iter().enumerate() {
            let buf = fixture_for(i, DEFAULT_PAGE_SIZE, 16 * 1024 * 1024, true);
            let control = parse_control_file(&buf).unwrap_or_else(|e| {
                panic!("failed to parse fixture for {:?}: {e}", spec.major)
            });
            assert_eq!(control.version, spec.major);
            assert_eq!(control.system_id, 0x1234_5678_9abc_def0);
            assert_eq!(control.page_size, DEFAULT_PAGE_SIZE);
        }
    }

    #[test]
    fn pre_93_never_reports_checksums() {
        let buf = fixture_for(0, DEFAULT_PAGE_SIZE, 16 * 1024 * 1024, true);
        let control = parse_control_file(&buf).unwrap();
        assert!(!control.page_checksum_enabled);
    }

    #[test]
    fn unrecognized_version_is_format_error() {
        let mut buf = vec![0u8; PG_CONTROL_FILE_SIZE];
        LittleEndian::write_u32(&mut buf[PG_CONTROL_VERSION_OFFSET..], 999999);
        LittleEndian::write_u32(&mut buf[CATALOG_VERSION_OFFSET..], 1);
        assert!(matches!(
            parse_control_file(&buf),
            Err(ControlFileError::UnrecognizedVersion)
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let buf = vec![0u8; 100];
        assert!(matches!(
            parse_control_file(&buf),
            Err(ControlFileError::WrongSize { .. })
        ));
    }
}
