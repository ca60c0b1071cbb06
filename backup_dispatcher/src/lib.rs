//! Parallel job dispatcher (§4.G): owns a fixed pool of worker processes,
//! keeps each one fed with at most one outstanding `backupFile` job, and
//! hands results back to the caller as they arrive rather than waiting for
//! the whole batch.

mod dispatcher;
mod error;
mod protocol;
mod worker_handle;

pub use dispatcher::{Job, JobDispatcher, JobResult};
pub use error::DispatchError;
pub use protocol::{
    BackupFileOutcome, BackupFileParams, CopyResult, PageChecksumWire, WireError, WireResponse,
    WireSuccess,
};
pub use worker_handle::WorkerHandle;
