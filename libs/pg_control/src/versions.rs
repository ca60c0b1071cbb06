//! One row per supported PostgreSQL major version, in the spirit of
//! `postgres/interface/version.h`: each major gets its own
//! `(pg_control_version, catalog_version)` magic pair and its own set of
//! field offsets into `ControlFileData`. Deliberately not generated or
//! derived from a formula — `ControlFileData` is not ABI-stable across
//! majors, and each row must be audited against that major's
//! `src/include/catalog/pg_control.h` rather than inferred from the
//! previous one.

use crate::PgMajorVersion;

/// Offsets are relative to the start of the raw `pg_control` file.
/// `system_identifier` (8 bytes), `pg_control_version` (4 bytes) and
/// `catalog_version_no` (4 bytes) are the first three fields of
/// `ControlFileData` in every supported major, so their offsets are fixed;
/// everything after them has shifted release over release as checkpoint
/// bookkeeping fields were added.
pub(crate) struct VersionSpec {
    pub major: PgMajorVersion,
    pub pg_control_version: u32,
    pub catalog_version: u32,
    pub blcksz_offset: usize,
    /// `None` before PG11: the WAL segment size was a compile-time constant
    /// (16 MiB) and is not recorded in the control file.
    pub xlog_seg_size_offset: Option<usize>,
    /// `None` before PG9.3: page-level checksums did not exist yet.
    pub data_checksum_offset: Option<usize>,
}

pub(crate) const SYSTEM_IDENTIFIER_OFFSET: usize = 0;
pub(crate) const PG_CONTROL_VERSION_OFFSET: usize = 8;
pub(crate) const CATALOG_VERSION_OFFSET: usize = 12;

pub(crate) const FIXED_WAL_SEGMENT_SIZE: u32 = 16 * 1024 * 1024;

pub(crate) const VERSIONS: &[VersionSpec] = &[
    VersionSpec {
        major: PgMajorVersion::V83,
        pg_control_version: 833,
        catalog_version: 200711281,
        blcksz_offset: 92,
        xlog_seg_size_offset: None,
        data_checksum_offset: None,
    },
    VersionSpec {
        major: PgMajorVersion::V84,
        pg_control_version: 843,
        catalog_version: 200904091,
        blcksz_offset: 100,
        xlog_seg_size_offset: None,
        data_checksum_offset: None,
    },
    VersionSpec {
        major: PgMajorVersion::V90,
        pg_control_version: 903,
        catalog_version: 201008051,
        blcksz_offset: 108,
        xlog_seg_size_offset: None,
        data_checksum_offset: None,
    },
    VersionSpec {
        major: PgMajorVersion::V91,
        pg_control_version: 903,
        catalog_version: 201105231,
        blcksz_offset: 108,
        xlog_seg_size_offset: None,
        data_checksum_offset: None,
    },
    VersionSpec {
        major: PgMajorVersion::V92,
        pg_control_version: 922,
        catalog_version: 201204301,
        blcksz_offset: 116,
        xlog_seg_size_offset: None,
        data_checksum_offset: None,
    },
    VersionSpec {
        major: PgMajorVersion::V93,
        pg_control_version: 937,
        catalog_version: 201306121,
        blcksz_offset: 124,
        xlog_seg_size_offset: None,
        data_checksum_offset: Some(184),
    },
    VersionSpec {
        major: PgMajorVersion::V94,
        pg_control_version: 942,
        catalog_version: 201409291,
        blcksz_offset: 124,
        xlog_seg_size_offset: None,
        data_checksum_offset: Some(184),
    },
    VersionSpec {
        major: PgMajorVersion::V95,
        pg_control_version: 942,
        catalog_version: 201510051,
        blcksz_offset: 124,
        xlog_seg_size_offset: None,
        data_checksum_offset: Some(184),
    },
    VersionSpec {
        major: PgMajorVersion::V96,
        pg_control_version: 960,
        catalog_version: 201608131,
        blcksz_offset: 124,
        xlog_seg_size_offset: None,
        data_checksum_offset: Some(184),
    },
    VersionSpec {
        major: PgMajorVersion::V100,
        pg_control_version: 1002,
        catalog_version: 201707211,
        blcksz_offset: 124,
        xlog_seg_size_offset: None,
        data_checksum_offset: Some(184),
    },
    VersionSpec {
        major: PgMajorVersion::V110,
        pg_control_version: 1100,
        catalog_version: 201809051,
        blcksz_offset: 124,
        xlog_seg_size_offset: Some(132),
        data_checksum_offset: Some(188),
    },
    VersionSpec {
        major: PgMajorVersion::V120,
        pg_control_version: 1201,
        catalog_version: 201909212,
        blcksz_offset: 124,
        xlog_seg_size_offset: Some(132),
        data_checksum_offset: Some(188),
    },
    VersionSpec {
        major: PgMajorVersion::V130,
        pg_control_version: 1300,
        catalog_version: 202007201,
        blcksz_offset: 124,
        xlog_seg_size_offset: Some(132),
        data_checksum_offset: Some(188),
    },
];
