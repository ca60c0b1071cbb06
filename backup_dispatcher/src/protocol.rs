//! Wire protocol for the worker pipe: one JSON value per line (§6). The
//! request carries a command name and a positional parameter array whose
//! order is fixed per command; the response is either a positional output
//! array or an error object. The receiver never assumes a line boundary
//! lines up with one OS `read()` — see [`crate::worker_handle::WorkerHandle`]
//! for the buffered line reader that enforces this.

use page_check::PageErrorEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CMD_BACKUP_FILE: &str = "backupFile";
/// Not named in §6's worker protocol table (only `backupFile` is), but
/// required to implement §5's "sends a close request to all workers"
/// cancellation path; the worker treats any request it doesn't recognize as
/// unsupported, so this still has to be a real command it understands.
pub const CMD_CLOSE: &str = "close";

#[derive(Debug, Serialize, Deserialize)]
pub struct JobRequest {
    pub cmd: String,
    pub param: Vec<Value>,
}

impl JobRequest {
    pub fn close() -> Self {
        JobRequest { cmd: CMD_CLOSE.to_string(), param: Vec::new() }
    }

    pub fn backup_file(params: &BackupFileParams) -> Self {
        JobRequest { cmd: CMD_BACKUP_FILE.to_string(), param: params.to_param_array() }
    }
}

/// The `backupFile` job's input, in the fixed parameter order §4.H/§6
/// document. Built by the orchestrator, carried opaquely by the dispatcher,
/// and consumed by the worker — none of the three need the struct's field
/// order to match the wire order except the (de)serializers below.
#[derive(Debug, Clone)]
pub struct BackupFileParams {
    pub pg_file: String,
    pub ignore_missing: bool,
    pub pg_file_size: u64,
    pub pg_file_copy_exact_size: bool,
    pub pg_file_checksum: Option<String>,
    pub pg_file_checksum_page: bool,
    pub pg_file_checksum_page_lsn_limit: u64,
    pub repo_file: String,
    pub repo_file_has_reference: bool,
    /// Compression codec suffix (`"gz"`, `"lz4"`, `"zst"`, `"bz2"`), or
    /// `None` for an uncompressed repo file.
    pub repo_file_compress: Option<String>,
    pub repo_file_compress_level: i32,
    pub backup_label: String,
    pub delta: bool,
    pub cipher_sub_pass: Option<String>,
    /// Overrides the worker's default `pg_root` for this file alone,
    /// used during a standby backup to pull a size/timestamp-mismatched
    /// file's bytes from the primary instead of the standby the worker
    /// was spawned against. `None` reads from the worker's own root.
    pub pg_file_source_root: Option<String>,
}

impl BackupFileParams {
    pub fn to_param_array(&self) -> Vec<Value> {
        vec![
            Value::from(self.pg_file.clone()),
            Value::from(self.ignore_missing),
            Value::from(self.pg_file_size),
            Value::from(self.pg_file_copy_exact_size),
            self.pg_file_checksum.clone().map(Value::from).unwrap_or(Value::Null),
            Value::from(self.pg_file_checksum_page),
            Value::from(self.pg_file_checksum_page_lsn_limit),
            Value::from(self.repo_file.clone()),
            Value::from(self.repo_file_has_reference),
            self.repo_file_compress.clone().map(Value::from).unwrap_or(Value::Null),
            Value::from(self.repo_file_compress_level),
            Value::from(self.backup_label.clone()),
            Value::from(self.delta),
            self.cipher_sub_pass.clone().map(Value::from).unwrap_or(Value::Null),
            self.pg_file_source_root.clone().map(Value::from).unwrap_or(Value::Null),
        ]
    }

    pub fn from_param_array(param: &[Value]) -> Result<Self, String> {
        if param.len() != 15 {
            return Err(format!("expected 15 parameters, got {}", param.len()));
        }
        let str_at = |i: usize| -> Result<String, String> {
            param[i].as_str().map(str::to_string).ok_or_else(|| format!("param[{i}] must be a string"))
        };
        let bool_at = |i: usize| -> Result<bool, String> {
            param[i].as_bool().ok_or_else(|| format!("param[{i}] must be a bool"))
        };
        let u64_at = |i: usize| -> Result<u64, String> {
            param[i].as_u64().ok_or_else(|| format!("param[{i}] must be a non-negative integer"))
        };
        let opt_str_at = |i: usize| -> Result<Option<String>, String> {
            match &param[i] {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(s.clone())),
                _ => Err(format!("param[{i}] must be a string or null")),
            }
        };

        Ok(BackupFileParams {
            pg_file: str_at(0)?,
            ignore_missing: bool_at(1)?,
            pg_file_size: u64_at(2)?,
            pg_file_copy_exact_size: bool_at(3)?,
            pg_file_checksum: opt_str_at(4)?,
            pg_file_checksum_page: bool_at(5)?,
            pg_file_checksum_page_lsn_limit: u64_at(6)?,
            repo_file: str_at(7)?,
            repo_file_has_reference: bool_at(8)?,
            repo_file_compress: opt_str_at(9)?,
            repo_file_compress_level: param[10]
                .as_i64()
                .ok_or("param[10] must be an integer")? as i32,
            backup_label: str_at(11)?,
            delta: bool_at(12)?,
            cipher_sub_pass: opt_str_at(13)?,
            pg_file_source_root: opt_str_at(14)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyResult {
    Copy,
    Checksum,
    ReCopy,
    Skip,
    NoOp,
}

impl CopyResult {
    pub fn to_wire(self) -> i64 {
        match self {
            CopyResult::Copy => 0,
            CopyResult::Checksum => 1,
            CopyResult::ReCopy => 2,
            CopyResult::Skip => 3,
            CopyResult::NoOp => 4,
        }
    }

    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(CopyResult::Copy),
            1 => Some(CopyResult::Checksum),
            2 => Some(CopyResult::ReCopy),
            3 => Some(CopyResult::Skip),
            4 => Some(CopyResult::NoOp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageChecksumWire {
    pub valid: bool,
    pub errors: Vec<PageErrorEntry>,
}

/// The five-element `out` array a successful `backupFile` job returns
/// (§6): `[copyResultInt, copySize, repoSize, copyChecksumOrNull,
/// pageChecksumResultOrNull]`.
#[derive(Debug, Clone)]
pub struct BackupFileOutcome {
    pub copy_result: CopyResult,
    pub copy_size: u64,
    pub repo_size: u64,
    pub copy_checksum: Option<String>,
    pub page_checksum_result: Option<PageChecksumWire>,
}

impl BackupFileOutcome {
    pub fn to_out_array(&self) -> Vec<Value> {
        let page_checksum = self.page_checksum_result.as_ref().map(|p| {
            serde_json::json!({
                "valid": p.valid,
                "errors": p.errors,
            })
        });
        vec![
            Value::from(self.copy_result.to_wire()),
            Value::from(self.copy_size),
            Value::from(self.repo_size),
            self.copy_checksum.clone().map(Value::from).unwrap_or(Value::Null),
            page_checksum.unwrap_or(Value::Null),
        ]
    }

    pub fn from_out_array(mut out: Vec<Value>) -> Result<Self, String> {
        if out.len() != 5 {
            return Err(format!("expected 5 output values, got {}", out.len()));
        }
        let page_checksum_result = match out.remove(4) {
            Value::Null => None,
            v => {
                let valid = v.get("valid").and_then(Value::as_bool).ok_or("missing valid")?;
                let errors: Vec<PageErrorEntry> = serde_json::from_value(
                    v.get("errors").cloned().ok_or("missing errors")?,
                )
                .map_err(|e| e.to_string())?;
                Some(PageChecksumWire { valid, errors })
            }
        };
        let copy_checksum = match out.remove(3) {
            Value::Null => None,
            Value::String(s) => Some(s),
            _ => return Err("copyChecksum must be a string or null".to_string()),
        };
        let repo_size = out.remove(2).as_u64().ok_or("repoSize must be a non-negative integer")?;
        let copy_size = out.remove(1).as_u64().ok_or("copySize must be a non-negative integer")?;
        let copy_result_int = out.remove(0).as_i64().ok_or("copyResult must be an integer")?;
        let copy_result = CopyResult::from_wire(copy_result_int)
            .ok_or_else(|| format!("unrecognized copyResult {copy_result_int}"))?;

        Ok(BackupFileOutcome { copy_result, copy_size, repo_size, copy_checksum, page_checksum_result })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireSuccess {
    pub out: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireError {
    pub err: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug)]
pub enum WireResponse {
    Success(WireSuccess),
    Error(WireError),
}

impl WireResponse {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(line)?;
        if value.get("err").is_some() {
            Ok(WireResponse::Error(serde_json::from_value(value)?))
        } else {
            Ok(WireResponse::Success(serde_json::from_value(value)?))
        }
    }

    pub fn to_line(&self) -> String {
        let value = match self {
            WireResponse::Success(s) => serde_json::to_value(s),
            WireResponse::Error(e) => serde_json::to_value(e),
        }
        .expect("wire types always serialize");
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_round_trips_through_the_out_array() {
        let outcome = BackupFileOutcome {
            copy_result: CopyResult::Copy,
            copy_size: 8192,
            repo_size: 4096,
            copy_checksum: Some("deadbeef".to_string()),
            page_checksum_result: Some(PageChecksumWire {
                valid: false,
                errors: vec![PageErrorEntry::Index(0), PageErrorEntry::Range(2, 3)],
            }),
        };
        let array = outcome.to_out_array();
        let parsed = BackupFileOutcome::from_out_array(array).unwrap();
        assert_eq!(parsed.copy_result, CopyResult::Copy);
        assert_eq!(parsed.copy_size, 8192);
        assert_eq!(parsed.copy_checksum.as_deref(), Some("deadbeef"));
        assert_eq!(parsed.page_checksum_result.unwrap().errors.len(), 2);
    }

    #[test]
    fn no_op_outcome_has_null_checksum_and_page_result() {
        let outcome = BackupFileOutcome {
            copy_result: CopyResult::NoOp,
            copy_size: 0,
            repo_size: 0,
            copy_checksum: None,
            page_checksum_result: None,
        };
        let line = WireResponse::Success(WireSuccess { out: outcome.to_out_array() }).to_line();
        assert!(line.contains("null"));
    }

    #[test]
    fn backup_file_params_round_trip_through_the_param_array() {
        let params = BackupFileParams {
            pg_file: "base/16384/16385".to_string(),
            ignore_missing: false,
            pg_file_size: 8192 * 4,
            pg_file_copy_exact_size: true,
            pg_file_checksum: Some("abc123".to_string()),
            pg_file_checksum_page: true,
            pg_file_checksum_page_lsn_limit: 0x1_6E24_08,
            repo_file: "pg_data/base/16384/16385".to_string(),
            repo_file_has_reference: false,
            repo_file_compress: Some("zst".to_string()),
            repo_file_compress_level: 3,
            backup_label: "20260730-120000F".to_string(),
            delta: false,
            cipher_sub_pass: None,
            pg_file_source_root: Some("/primary/pgdata".to_string()),
        };
        let array = params.to_param_array();
        let parsed = BackupFileParams::from_param_array(&array).unwrap();
        assert_eq!(parsed.pg_file, params.pg_file);
        assert_eq!(parsed.pg_file_checksum, params.pg_file_checksum);
        assert_eq!(parsed.repo_file_compress, params.repo_file_compress);
        assert_eq!(parsed.cipher_sub_pass, None);
        assert_eq!(parsed.pg_file_source_root, params.pg_file_source_root);
    }

    #[test]
    fn wire_response_distinguishes_success_from_error() {
        let ok = WireResponse::parse(r#"{"out":[4,0,0,null,null]}"#).unwrap();
        assert!(matches!(ok, WireResponse::Success(_)));
        let err = WireResponse::parse(r#"{"err":28,"message":"file missing"}"#).unwrap();
        assert!(matches!(err, WireResponse::Error(_)));
    }
}
