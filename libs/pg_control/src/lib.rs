//! Parses `global/pg_control` and WAL segment headers across the
//! PostgreSQL major versions this backup core supports (8.3 through 13).
//! `ControlFileData`'s on-disk layout is not ABI-stable across majors, so
//! this crate embeds, per major, the `(pg_control_version, catalog_version)`
//! magic pair and the field offsets it reads. No PostgreSQL headers or
//! source are linked.

mod control;
mod versions;
mod wal;

pub use control::{
    parse_control_file, ControlFileError, PgControl, PgMajorVersion, DEFAULT_PAGE_SIZE,
    PG_CONTROL_FILE_SIZE,
};
pub use wal::{parse_wal_header, WalHeader, WalHeaderError, WAL_LONG_HEADER_SIZE};
