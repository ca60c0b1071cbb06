//! One worker process, represented as an owned handle: the child itself
//! plus its stdin sink and a buffered line reader over its stdout. Workers
//! outlive individual jobs but are owned by the dispatcher, stored in an
//! array indexed by worker id (§9 design note on worker lifetimes).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::DispatchError;
use crate::protocol::JobRequest;

pub struct WorkerHandle {
    pub id: usize,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerHandle {
    /// Spawns `program` (normally this crate's companion `backup_worker`
    /// binary) with piped stdin/stdout; stderr is inherited so worker
    /// panics and log lines still reach the operator's terminal.
    pub fn spawn(id: usize, program: &str, args: &[String]) -> std::io::Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        Ok(WorkerHandle { id, child, stdin, stdout: BufReader::new(stdout) })
    }

    pub async fn submit(&mut self, request: &JobRequest) -> Result<(), DispatchError> {
        let line = serde_json::to_string(request).expect("JobRequest always serializes");
        self.send_line(&line).await
    }

    async fn send_line(&mut self, line: &str) -> Result<(), DispatchError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|source| DispatchError::Io { worker_id: self.id, source })?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|source| DispatchError::Io { worker_id: self.id, source })?;
        self.stdin.flush().await.map_err(|source| DispatchError::Io { worker_id: self.id, source })
    }

    /// Reads one line of the worker's response. `Ok(None)` means the
    /// worker closed its stdout without answering (exited, crashed).
    pub async fn read_line(&mut self) -> Result<Option<String>, DispatchError> {
        let mut buf = String::new();
        let n = self
            .stdout
            .read_line(&mut buf)
            .await
            .map_err(|source| DispatchError::Io { worker_id: self.id, source })?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    /// Sends the close request and waits up to `grace` for the process to
    /// exit on its own before killing it (§5 cancellation).
    pub async fn shutdown(mut self, grace: Duration) {
        let _ = self.send_line(&serde_json::to_string(&JobRequest::close()).unwrap()).await;
        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            tracing::warn!(worker_id = self.id, "worker did not exit within grace period, killing it");
            let _ = self.child.kill().await;
        }
    }
}
