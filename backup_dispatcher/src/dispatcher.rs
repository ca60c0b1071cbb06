//! Fans file-copy jobs out across a fixed pool of worker processes and
//! collects their results as they arrive, in no particular order (§5). The
//! pool is sized once at construction; a worker death is fatal to the run
//! rather than triggering an in-place respawn.

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::{select_all, BoxFuture};

use crate::error::DispatchError;
use crate::protocol::{BackupFileOutcome, BackupFileParams, JobRequest, WireResponse};
use crate::worker_handle::WorkerHandle;

/// One queued unit of work: the wire parameters plus an opaque key the
/// caller uses to correlate the eventual result back to its own bookkeeping
/// (a manifest path, typically).
pub struct Job {
    pub key: String,
    pub params: BackupFileParams,
}

pub struct JobResult {
    pub key: String,
    pub outcome: BackupFileOutcome,
}

pub struct JobDispatcher {
    workers: Vec<WorkerHandle>,
    queue: VecDeque<Job>,
    /// Worker index -> job key, for workers currently awaiting a response.
    in_flight: Vec<Option<String>>,
}

impl JobDispatcher {
    pub fn new(workers: Vec<WorkerHandle>) -> Self {
        let in_flight = workers.iter().map(|_| None).collect();
        JobDispatcher { workers, queue: VecDeque::new(), in_flight }
    }

    pub fn enqueue(&mut self, job: Job) {
        self.queue.push_back(job);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn idle_workers(&self) -> impl Iterator<Item = usize> + '_ {
        self.in_flight.iter().enumerate().filter(|(_, k)| k.is_none()).map(|(i, _)| i)
    }

    fn has_in_flight(&self) -> bool {
        self.in_flight.iter().any(Option::is_some)
    }

    /// Submits jobs to every currently-idle worker, draining the queue as
    /// far as it will go this round.
    async fn fill_idle(&mut self) -> Result<(), DispatchError> {
        let idle: Vec<usize> = self.idle_workers().collect();
        for worker_id in idle {
            let Some(job) = self.queue.pop_front() else { break };
            let request = JobRequest::backup_file(&job.params);
            self.workers[worker_id].submit(&request).await?;
            self.in_flight[worker_id] = Some(job.key);
        }
        Ok(())
    }

    /// Runs until the queue is empty and every in-flight job has answered,
    /// calling `on_result` as each response arrives. A job that comes back
    /// with a worker-reported failure is surfaced through `on_result`'s
    /// `Result` rather than aborting the whole run; a dead pipe (the worker
    /// process itself crashed) is fatal and stops the loop immediately,
    /// since no result for that job's key can ever arrive (§5).
    pub async fn run<F>(&mut self, mut on_result: F) -> Result<(), DispatchError>
    where
        F: FnMut(Result<JobResult, DispatchError>),
    {
        loop {
            self.fill_idle().await?;
            if !self.has_in_flight() {
                break;
            }

            let in_flight = &self.in_flight;
            let futures: Vec<BoxFuture<'_, (usize, Result<Option<String>, DispatchError>)>> = self
                .workers
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| in_flight[*i].is_some())
                .map(|(i, w)| Box::pin(async move { (i, w.read_line().await) }) as BoxFuture<'_, _>)
                .collect();

            let ((worker_id, line_result), _idx, _rest) = select_all(futures).await;
            let key = self.in_flight[worker_id].take().expect("selected future was in-flight");

            let result = match line_result {
                Err(e) => Err(e),
                Ok(None) => Err(DispatchError::WorkerClosed { worker_id }),
                Ok(Some(line)) => match WireResponse::parse(&line) {
                    Err(source) => Err(DispatchError::Protocol { worker_id, source }),
                    Ok(WireResponse::Error(e)) => {
                        Err(DispatchError::JobFailed { worker_id, code: e.err, message: e.message })
                    }
                    Ok(WireResponse::Success(s)) => BackupFileOutcome::from_out_array(s.out)
                        .map_err(|source| DispatchError::Protocol {
                            worker_id,
                            source: serde_json::Error::io(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                source,
                            )),
                        }),
                },
            };

            let fatal = matches!(result, Err(DispatchError::WorkerClosed { .. } | DispatchError::Io { .. }));
            on_result(result.map(|outcome| JobResult { key, outcome }));
            if fatal {
                return Err(DispatchError::WorkerClosed { worker_id });
            }
        }
        Ok(())
    }

    /// Sends a close request to every worker and waits up to `grace` each
    /// for it to exit, draining their pipes (§5 cancellation path).
    pub async fn shutdown_all(self, grace: Duration) {
        for worker in self.workers {
            worker.shutdown(grace).await;
        }
    }
}
