//! File copy worker (§4.H): given one `backupFile` job, decides whether the
//! source needs copying at all and, if so, streams it through the filter
//! pipeline into the repository.

mod copy;
mod decision;
mod error;

pub use copy::execute_job;
pub use decision::{decide, Decision, DecisionFacts};
pub use error::WorkerError;
