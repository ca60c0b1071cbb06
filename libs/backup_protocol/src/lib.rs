//! PostgreSQL connection client for the backup-start/backup-stop protocol
//! and the catalog queries the orchestrator needs (database list,
//! tablespace list, standby replay wait). Socket/TLS setup and connection
//! string assembly are out of scope (§1); this takes a ready-to-dial
//! connection string.

mod client;
mod error;
mod version_num;

pub use client::{
    BackupStartOptions, BackupStartResult, BackupStopResult, DatabaseInfo, DbClient, TablespaceInfo,
};
pub use error::ProtocolError;
