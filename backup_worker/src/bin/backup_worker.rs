//! Worker process entry point. Reads `backupFile`/`close` requests one line
//! at a time from stdin and writes one response line per request to stdout
//! (§6). Takes two positional arguments: the `pg_data` root and the
//! repository root the dispatcher spawned this worker to serve.

use std::sync::Arc;

use backup_dispatcher::{BackupFileParams, WireError, WireResponse, WireSuccess};
use backup_storage::{LocalRepository, Repository};
use camino::Utf8PathBuf;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use utils::error::Classify;

#[tokio::main]
async fn main() {
    utils::logging::init();

    let mut args = std::env::args().skip(1);
    let pg_root: Utf8PathBuf = args.next().expect("usage: backup_worker <pg_root> <repo_root>").into();
    let repo_root: Utf8PathBuf = args.next().expect("usage: backup_worker <pg_root> <repo_root>").into();
    let repo: Arc<dyn Repository> = Arc::new(LocalRepository::new(repo_root));

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await.expect("reading request line") {
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                write_response(&mut stdout, &error_response(&e.to_string(), 26)).await;
                continue;
            }
        };
        let cmd = request.get("cmd").and_then(Value::as_str).unwrap_or_default();

        match cmd {
            "close" => break,
            "backupFile" => {
                let param = request
                    .get("param")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let response = match BackupFileParams::from_param_array(&param) {
                    Err(msg) => error_response(&msg, 26),
                    Ok(params) => match backup_worker::execute_job(repo.as_ref(), &pg_root, &params).await {
                        Ok(outcome) => {
                            tracing::info!(
                                label = %params.backup_label,
                                pg_file = %params.pg_file,
                                result = ?outcome.copy_result,
                                "backupFile done"
                            );
                            WireResponse::Success(WireSuccess { out: outcome.to_out_array() })
                        }
                        Err(e) => {
                            tracing::warn!(
                                label = %params.backup_label,
                                pg_file = %params.pg_file,
                                error = %e,
                                "backupFile failed"
                            );
                            error_response(&e.to_string(), e.kind().exit_code())
                        }
                    },
                };
                write_response(&mut stdout, &response).await;
            }
            other => {
                write_response(&mut stdout, &error_response(&format!("unrecognized command: {other}"), 26)).await;
            }
        }
    }
}

fn error_response(message: &str, code: u8) -> WireResponse {
    WireResponse::Error(WireError { err: code as i64, message: message.to_string(), stack: None })
}

async fn write_response(stdout: &mut tokio::io::Stdout, response: &WireResponse) {
    let line = response.to_line();
    let _ = stdout.write_all(line.as_bytes()).await;
    let _ = stdout.write_all(b"\n").await;
    let _ = stdout.flush().await;
}
