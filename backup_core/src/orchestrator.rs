//! Drives one full/diff/incr backup end to end (§4.I): assigns a label,
//! starts the backup against the live cluster (or confirms it's safely
//! offline), builds the manifest, fans file-copy jobs out across a worker
//! pool, stops the backup, and writes the finished manifest plus the
//! stanza-wide backup-set index.
//!
//! `INIT -> VERIFY_PG -> RESUME_SCAN -> LABEL_ASSIGN -> BACKUP_START ->
//! BUILD_MANIFEST -> ENQUEUE_LOOP <-> APPLY_RESULT -> BACKUP_STOP ->
//! WRITE_LABEL -> ARCHIVE_CHECK -> FINALIZE`, implemented as one sequential
//! `run()` rather than an explicit state enum — nothing here runs out of
//! order or needs to be resumed mid-step; only the whole attempt resumes
//! (component J handles that).

use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::fs::MetadataExt;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use sha1::{Digest, Sha1};
use tracing::Instrument;

use backup_dispatcher::{BackupFileParams, CopyResult, Job, JobDispatcher, JobResult, WorkerHandle};
use backup_manifest::{
    build_live, classify, info, BackupType, BuildOptions, FileClassification, FileInfo, Manifest,
    Target,
};
use backup_protocol::client::{BackupStartOptions, DbClient};
use backup_storage::{ListOptions, Repository, WriteOptions};

use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::label::{assign_label, BackupLabel};
use crate::resume::{check_compatibility, plan_resume};

/// Grace period a worker gets to exit cleanly after `close` before it's killed (§5).
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct BackupOutcome {
    pub label: String,
    pub backup_type: BackupType,
    pub files_copied: u64,
    pub files_referenced: u64,
    pub bytes_copied: u64,
    pub warnings: Vec<String>,
}

pub struct Orchestrator {
    config: BackupConfig,
    repo: Arc<dyn Repository>,
    worker_program: Utf8PathBuf,
}

impl Orchestrator {
    pub fn new(config: BackupConfig, repo: Arc<dyn Repository>, worker_program: impl Into<Utf8PathBuf>) -> Self {
        Orchestrator { config, repo, worker_program: worker_program.into() }
    }

    fn stanza_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("backup").join(&self.config.stanza)
    }

    fn label_dir(&self, label: &str) -> Utf8PathBuf {
        self.stanza_root().join(label)
    }

    fn archive_root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from("archive").join(&self.config.stanza)
    }

    pub async fn run(&self) -> Result<BackupOutcome, BackupError> {
        let mut warnings = Vec::new();

        // INIT
        let primary = self
            .config
            .primary()
            .ok_or_else(|| BackupError::Config("no pg1 host configured".to_string()))?;
        let primary_root = Utf8PathBuf::from(primary.path.as_str());

        // VERIFY_PG
        let control_bytes = std::fs::read(primary_root.join("global/pg_control"))?;
        let control = pg_control::parse_control_file(&control_bytes)?;

        let db = if self.config.online {
            let conn_string = format!("host={} dbname=postgres", primary.host);
            Some(DbClient::open(&conn_string, control.version, false).await?)
        } else {
            let pid_file = primary_root.join("postmaster.pid");
            if pid_file.exists() {
                if !self.config.force {
                    return Err(BackupError::PostmasterRunning);
                }
                warnings.push("postmaster.pid exists but force is set; proceeding with an offline backup".to_string());
            }
            None
        };

        let info_path = self.stanza_root().join("backup.info");
        let mut backup_set = if self.repo.exists(&info_path).await? {
            info::load(&read_to_string(self.repo.as_ref(), &info_path).await?)?
        } else {
            info::BackupSetInfo::default()
        };

        // RESUME_SCAN
        let resume_candidate = self.find_partial(&backup_set).await?;

        let (label, backup_type, prior_full_label, resumed_manifest) = match resume_candidate {
            Some((label_text, partial_dir, resumed)) => {
                let current_prior_label = backup_set.latest_full().map(|e| e.label.as_str());
                let compat = check_compatibility(
                    &resumed,
                    control.version.as_str(),
                    current_prior_label,
                    self.config.compress_type.as_deref(),
                    self.config.resume,
                );
                match compat {
                    Ok(()) => {
                        let backup_type = resumed.data.backup_type;
                        let prior_full = resumed.data.backup_label_prior.clone();
                        let label = BackupLabel::parse(&label_text)?;
                        (label, backup_type, prior_full, Some((partial_dir, resumed)))
                    }
                    Err(e) => {
                        warnings.push(format!("discarding partial backup {label_text}: {e}"));
                        self.repo
                            .remove(&partial_dir, backup_storage::RemoveOptions { recurse: true, ..Default::default() })
                            .await?;
                        self.assign_fresh_label(&backup_set, &mut warnings).await?
                    }
                }
            }
            None => self.assign_fresh_label(&backup_set, &mut warnings).await?,
        };

        // Option inheritance: a diff/incr backup can't change compress type,
        // hardlink, or page-checksum settings from the backup it references,
        // since the reference chain assumes those stayed fixed (§4.I).
        let diff_base_label: Option<String> = match backup_type {
            BackupType::Full => None,
            BackupType::Diff => prior_full_label.clone(),
            BackupType::Incr => backup_set.latest().map(|e| e.label.clone()),
        };

        let mut compress_type = self.config.compress_type.clone();
        let mut hardlink = self.config.repo_hardlink;
        let mut checksum_page = self.config.checksum_page;
        let diff_base_manifest = if let Some(base_label) = &diff_base_label {
            let path = self.label_dir(base_label).join("backup.manifest");
            let text = read_to_string(self.repo.as_ref(), &path).await?;
            let base = backup_manifest::load(&text)?;
            if base.data.compress_type != compress_type {
                warnings.push(format!(
                    "compress-type changed from {:?} to {:?}; reverting to match {base_label}",
                    compress_type, base.data.compress_type
                ));
                compress_type = base.data.compress_type.clone();
            }
            if base.data.hardlink != hardlink {
                warnings.push(format!("hardlink changed since {base_label}; reverting to match it"));
                hardlink = base.data.hardlink;
            }
            if base.data.checksum_page != checksum_page {
                warnings.push(format!("checksum-page changed since {base_label}; reverting to match it"));
                checksum_page = base.data.checksum_page;
            }
            Some(base)
        } else {
            None
        };

        // BACKUP_START
        let (lsn_start, wal_segment_start) = if let Some(client) = &db {
            let result = client
                .backup_start(&label.text, &BackupStartOptions { fast: self.config.start_fast, non_exclusive: true })
                .await?;
            (Some(result.lsn_start), Some(result.wal_segment_start))
        } else {
            (None, None)
        };

        // Timeline-switch detection derives both timelines from the WAL
        // segment name's own 8-hex-char timeline prefix rather than a
        // separate stored field — the name already carries it.
        let mut delta = self.config.delta;
        if let (Some(start_name), Some(base)) = (&wal_segment_start, &diff_base_manifest) {
            if let (Some(current_tli), Some(prior_tli)) =
                (timeline_of(start_name), base.data.wal_start.as_deref().and_then(timeline_of))
            {
                if current_tli != prior_tli {
                    warnings.push(format!(
                        "timeline changed ({prior_tli} -> {current_tli}) since {}; forcing a delta backup",
                        diff_base_label.as_deref().unwrap_or("")
                    ));
                    delta = true;
                }
            }
        }

        // BUILD_MANIFEST
        let mut extra_targets = BTreeMap::new();
        if let Some(client) = &db {
            for ts in client.tablespace_list().await? {
                extra_targets.insert(
                    format!("pg_tblspc/{}", ts.oid),
                    Target { path: ts.location, tablespace_id: Some(ts.oid), tablespace_name: Some(ts.name) },
                );
            }
        }

        let source_root = if self.config.backup_standby {
            let standby = self
                .config
                .pg_hosts
                .get(&2)
                .ok_or_else(|| BackupError::Config("backup-standby requires a pg2 host".to_string()))?;
            Utf8PathBuf::from(standby.path.as_str())
        } else {
            primary_root.clone()
        };

        let build_opts = BuildOptions {
            page_size: control.page_size,
            include_wal: self.config.archive_copy,
            expected_pg_version: control.version.as_str().to_string(),
        };
        let mut manifest = build_live(&source_root, &extra_targets, &build_opts)?;

        manifest.data.backup_label = label.text.clone();
        manifest.data.backup_type = backup_type;
        manifest.data.backup_label_prior = prior_full_label.clone();
        manifest.data.pg_version = control.version.as_str().to_string();
        manifest.data.system_id = control.system_id;
        manifest.data.wal_start = wal_segment_start.clone();
        manifest.data.lsn_start = lsn_start.map(|l| l.0);
        manifest.data.timestamp_start = label.epoch_seconds;
        manifest.data.compress_type = compress_type.clone();
        manifest.data.hardlink = hardlink;
        manifest.data.checksum_page = checksum_page;

        if self.config.backup_standby {
            self.reconcile_standby_sizes(&mut manifest, &primary_root, &mut warnings);
        }

        // Diff/incr classification against the referenced backup. In delta
        // mode this only catches files the resume plan below already knows a
        // checksum for, since a freshly-walked live file has no sha1 yet —
        // build_live can't read file contents and classify runs before any
        // copying happens. A size+timestamp classification (non-delta) is
        // unaffected; accepted as-is rather than restructuring the build/
        // classify/copy ordering around it.
        if let Some(base) = &diff_base_manifest {
            for (_, file) in manifest.files.iter_mut() {
                if let FileClassification::Reference = classify(base, file, delta) {
                    let reference = base
                        .files
                        .get(&file.name)
                        .and_then(|f| f.reference.clone())
                        .or_else(|| diff_base_label.clone());
                    file.reference = reference;
                    file.size_repo = 0;
                }
            }

            let nothing_to_copy = manifest.files.values().all(|f| f.reference.is_some());
            if nothing_to_copy {
                return Err(BackupError::NothingToBackup);
            }
        }

        // Resume: overlay checksum hints for files the partial attempt
        // already wrote, letting the worker confirm them without a fresh
        // read rather than re-copying everything from scratch.
        let mut checksum_hints: BTreeMap<String, String> = BTreeMap::new();
        if let Some((partial_dir, resumed)) = &resumed_manifest {
            let symlinks: BTreeSet<String> = manifest.links.keys().cloned().collect();
            let copy_candidates: BTreeMap<String, FileInfo> = manifest
                .files
                .iter()
                .filter(|(_, f)| f.reference.is_none())
                .map(|(name, f)| (name.clone(), f.clone()))
                .collect();
            let suffix = compress_type.clone();
            let plan = plan_resume(
                self.repo.as_ref(),
                partial_dir,
                resumed,
                &copy_candidates,
                &symlinks,
                |_name| suffix.clone(),
                label.epoch_seconds,
            )
            .await?;
            if plan.force_delta && !delta {
                warnings.push("a live file's timestamp is ahead of the backup start time; forcing a delta backup".to_string());
                delta = true;
            }
            checksum_hints = plan.keep_checksum;
        }
        manifest.data.delta = delta;

        // ENQUEUE_LOOP / APPLY_RESULT
        let cipher_sub_pass = match self.config.repo_cipher_type {
            crate::config::CipherType::None => None,
            crate::config::CipherType::Aes256Cbc => self.config.repo_cipher_pass.clone(),
        };

        let repo_base = Utf8PathBuf::from(self.config.repo_path.as_str());
        let label_filesystem_root = repo_base.join(self.label_dir(&label.text));
        let worker_count = self.config.process_max.max(1) as usize;
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let handle = WorkerHandle::spawn(
                id,
                self.worker_program.as_str(),
                &[source_root.to_string(), label_filesystem_root.to_string()],
            )
            .map_err(backup_dispatcher::DispatchError::Spawn)?;
            workers.push(handle);
        }
        let mut dispatcher = JobDispatcher::new(workers);

        let lsn_limit = lsn_start.map(|l| l.0).unwrap_or(0);
        let mut queued = 0u64;
        for (name, file) in manifest.files.iter().filter(|(_, f)| f.reference.is_none()) {
            let params = BackupFileParams {
                pg_file: pg_relative_path(name).to_string(),
                ignore_missing: true,
                pg_file_size: file.size,
                pg_file_copy_exact_size: true,
                pg_file_checksum: checksum_hints.get(name).cloned(),
                pg_file_checksum_page: checksum_page && file.checksum_page.is_some(),
                pg_file_checksum_page_lsn_limit: lsn_limit,
                repo_file: name.clone(),
                repo_file_has_reference: false,
                repo_file_compress: compress_type.clone(),
                repo_file_compress_level: self.config.compress_level,
                backup_label: label.text.clone(),
                delta,
                cipher_sub_pass: cipher_sub_pass.clone(),
                pg_file_source_root: (self.config.backup_standby && file.master)
                    .then(|| primary_root.to_string()),
            };
            dispatcher.enqueue(Job { key: name.clone(), params });
            queued += 1;
        }

        let mut results: Vec<JobResult> = Vec::with_capacity(queued as usize);
        let mut first_job_error: Option<backup_dispatcher::DispatchError> = None;

        let backup_span = tracing::info_span!("backup", label = %label.text);
        let dispatch_result = async {
            dispatcher
                .run(|result: Result<JobResult, backup_dispatcher::DispatchError>| match result {
                    Ok(job_result) => results.push(job_result),
                    Err(e) => {
                        if first_job_error.is_none() {
                            first_job_error = Some(e);
                        }
                    }
                })
                .await
        }
        .instrument(backup_span)
        .await;

        dispatcher.shutdown_all(WORKER_SHUTDOWN_GRACE).await;
        dispatch_result?;
        if let Some(e) = first_job_error {
            return Err(BackupError::Dispatch(e));
        }

        let mut files_copied = 0u64;
        let mut bytes_copied = 0u64;
        for JobResult { key, outcome } in results {
            match outcome.copy_result {
                CopyResult::Skip => {
                    manifest.files.remove(&key);
                    continue;
                }
                CopyResult::Copy | CopyResult::ReCopy => {
                    files_copied += 1;
                    bytes_copied += outcome.repo_size;
                }
                CopyResult::Checksum | CopyResult::NoOp => {}
            }
            if let Some(file) = manifest.files.get_mut(&key) {
                file.size_repo = outcome.repo_size;
                if let Some(sha1) = outcome.copy_checksum {
                    file.sha1 = Some(sha1);
                }
                if let Some(page_result) = outcome.page_checksum_result {
                    file.checksum_page = Some(page_result.valid);
                    file.checksum_page_error_list = Some(page_result.errors);
                }
            }
        }

        tracing::info!(queued, files_copied, bytes_copied, "file copy phase complete");

        // BACKUP_STOP
        if let Some(client) = db {
            let stop = client.backup_stop(true).await?;
            manifest.data.wal_stop = Some(stop.wal_segment_stop.clone());
            manifest.data.lsn_stop = Some(stop.lsn_stop.0);
            manifest.data.timestamp_stop = Some(Utc::now().timestamp());

            // WRITE_LABEL: the backup_label file pg_start/stop_backup hand
            // back never existed on the live cluster to be walked by
            // build_live; it has to be written into the backup copy itself.
            if let Some(label_file) = &stop.backup_label {
                let path = self.label_dir(&label.text).join("pg_data/backup_label");
                let mut sink = self.repo.new_write(&path, WriteOptions { create_path: true, ..Default::default() }).await?;
                use tokio::io::AsyncWriteExt;
                sink.write_all(label_file.as_bytes()).await.map_err(|source| {
                    backup_storage::StorageError::Io { path: path.to_string(), source }
                })?;
                sink.shutdown().await.map_err(|source| backup_storage::StorageError::Io {
                    path: path.to_string(),
                    source,
                })?;
                let sha1_hex = hex::encode(Sha1::digest(label_file.as_bytes()));
                manifest.files.insert(
                    "pg_data/backup_label".to_string(),
                    FileInfo {
                        name: "pg_data/backup_label".to_string(),
                        size: label_file.len() as u64,
                        size_repo: label_file.len() as u64,
                        timestamp: Utc::now().timestamp(),
                        mode: None,
                        user: None,
                        group: None,
                        sha1: Some(sha1_hex),
                        checksum_page: None,
                        checksum_page_error_list: None,
                        reference: None,
                        master: true,
                        primary: true,
                    },
                );
            }
            client.close();
        } else {
            manifest.data.timestamp_stop = Some(Utc::now().timestamp());
        }

        // ARCHIVE_CHECK
        if self.config.archive_check {
            if let (Some(start), Some(stop)) = (&manifest.data.wal_start, &manifest.data.wal_stop) {
                let segs_per_log = segs_per_log(control.wal_segment_size);
                let segments = wal_segments_between(start, stop, segs_per_log)?;
                self.wait_for_archive(&segments, self.config.archive_timeout).await?;
                if self.config.archive_copy {
                    let wal_dir = self.label_dir(&label.text).join("pg_data/pg_wal");
                    for segment in &segments {
                        let src = self.archive_root().join(segment);
                        let dst = wal_dir.join(segment);
                        self.repo.copy(&src, &dst).await?;
                    }
                    // repo.copy() doesn't hand back the bytes it moved, so
                    // the copied segments' sizes/modes come from a listing
                    // rather than from the copy call itself.
                    let entries = self.repo.list(&wal_dir, ListOptions { recurse: false, sort: false }).await?;
                    for info in entries {
                        if !segments.contains(&info.name) {
                            continue;
                        }
                        let name = format!("pg_data/pg_wal/{}", info.name);
                        manifest.files.insert(
                            name.clone(),
                            FileInfo {
                                name,
                                size: info.size,
                                size_repo: info.size,
                                timestamp: info.modify_time,
                                mode: Some(info.mode_bits & 0o7777),
                                user: Some(info.user),
                                group: Some(info.group),
                                sha1: None,
                                checksum_page: None,
                                checksum_page_error_list: None,
                                reference: None,
                                master: true,
                                primary: true,
                            },
                        );
                    }
                }
            }
        }

        // FINALIZE
        let manifest_text = backup_manifest::save(&manifest);
        let manifest_path = self.label_dir(&label.text).join("backup.manifest");
        let manifest_copy_path = self.label_dir(&label.text).join("backup.manifest.copy");
        write_text(self.repo.as_ref(), &manifest_path, &manifest_text).await?;
        write_text(self.repo.as_ref(), &manifest_copy_path, &manifest_text).await?;

        backup_set.insert(info::BackupSetEntry {
            label: label.text.clone(),
            backup_type,
            prior_label: prior_full_label,
            pg_version: control.version.as_str().to_string(),
            timestamp_start: manifest.data.timestamp_start,
            timestamp_stop: manifest.data.timestamp_stop.unwrap_or(manifest.data.timestamp_start),
        });
        let info_text = info::save(&backup_set);
        write_text(self.repo.as_ref(), &info_path, &info_text).await?;

        let files_referenced = manifest.files.values().filter(|f| f.reference.is_some()).count() as u64;

        Ok(BackupOutcome {
            label: label.text,
            backup_type,
            files_copied,
            files_referenced,
            bytes_copied,
            warnings,
        })
    }

    /// Picks a fresh label for a backup with no usable partial attempt:
    /// coerces diff/incr to full when there's no prior full to reference,
    /// then assigns a monotonic label (§4.I `LABEL_ASSIGN`).
    async fn assign_fresh_label(
        &self,
        backup_set: &info::BackupSetInfo,
        warnings: &mut Vec<String>,
    ) -> Result<(BackupLabel, BackupType, Option<String>, Option<(Utf8PathBuf, Manifest)>), BackupError> {
        let mut backup_type = self.config.backup_type;
        let prior_full_label = backup_set.latest_full().map(|e| e.label.clone());
        if backup_type != BackupType::Full && prior_full_label.is_none() {
            warnings.push("no prior full backup exists; coercing to a full backup".to_string());
            backup_type = BackupType::Full;
        }

        let label = assign_label(Utc::now(), backup_set.latest().map(|e| e.timestamp_start), backup_type, prior_full_label.as_deref())
            .await?;
        let resolved_prior = if backup_type == BackupType::Full { None } else { prior_full_label };
        Ok((label, backup_type, resolved_prior, None))
    }

    /// Finds an in-progress backup directory of the requested type left
    /// behind by a prior, interrupted run: a `backup.manifest.copy` under
    /// the stanza that hasn't yet been folded into `backup.info` (§4.J).
    async fn find_partial(
        &self,
        backup_set: &info::BackupSetInfo,
    ) -> Result<Option<(String, Utf8PathBuf, Manifest)>, BackupError> {
        let suffix = match self.config.backup_type {
            BackupType::Full => 'F',
            BackupType::Diff => 'D',
            BackupType::Incr => 'I',
        };
        let stanza_root = self.stanza_root();
        if !self.repo.exists(&stanza_root).await? {
            return Ok(None);
        }
        let entries = self.repo.list(&stanza_root, ListOptions { recurse: false, sort: true }).await?;
        for entry in entries {
            if entry.kind != backup_storage::EntryType::Path {
                continue;
            }
            if backup_set.backups.contains_key(&entry.name) {
                continue;
            }
            if !entry.name.ends_with(suffix) {
                continue;
            }
            let partial_dir = self.label_dir(&entry.name);
            let manifest_copy = partial_dir.join("backup.manifest.copy");
            if !self.repo.exists(&manifest_copy).await? {
                continue;
            }
            let text = read_to_string(self.repo.as_ref(), &manifest_copy).await?;
            let manifest = backup_manifest::load(&text)?;
            return Ok(Some((entry.name, partial_dir, manifest)));
        }
        Ok(None)
    }

    /// `backup-standby` reads file contents from the standby, but a file
    /// whose size disagrees between the two hosts is read from the primary
    /// instead, with the primary's size: if the standby is smaller it simply
    /// hasn't replayed the growth yet, and if the standby is larger the
    /// primary has already truncated the relation, so either way the
    /// primary's copy is the one that'll still be correct once the backup
    /// finishes (§9 design note).
    fn reconcile_standby_sizes(&self, manifest: &mut Manifest, primary_root: &Utf8Path, warnings: &mut Vec<String>) {
        for (name, file) in manifest.files.iter_mut() {
            let Some(rel) = name.strip_prefix("pg_data/") else { continue };
            match std::fs::metadata(primary_root.join(rel)) {
                Ok(meta) if meta.len() != file.size => {
                    warnings.push(format!(
                        "{name}: size differs between standby ({}) and primary ({}); copying from the primary",
                        file.size,
                        meta.len()
                    ));
                    file.size = meta.len();
                    file.timestamp = meta.mtime();
                    file.master = true;
                }
                Ok(_) => file.master = false,
                Err(_) => {
                    warnings.push(format!("{name}: missing on the primary during a backup-standby run; keeping the standby copy"));
                    file.master = false;
                }
            }
        }
    }

    /// Polls the archive for every segment in `segments` to show up, up to
    /// `timeout` total (§4.I `ARCHIVE_CHECK`).
    async fn wait_for_archive(&self, segments: &[String], timeout: Duration) -> Result<(), BackupError> {
        let deadline = tokio::time::Instant::now() + timeout;
        for segment in segments {
            let path = self.archive_root().join(segment);
            loop {
                if self.repo.exists(&path).await? {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(BackupError::ArchiveTimeout(segment.clone()));
                }
                tokio::time::sleep(Duration::from_millis(500).min(timeout)).await;
            }
        }
        Ok(())
    }
}

/// Strips the `pg_data/` prefix a manifest name always carries for
/// cluster-root files; a tablespace file's name already starts with
/// `pg_tblspc/<id>/...`, which resolves correctly against the cluster root
/// too since `pg_tblspc/<id>` is itself a symlink living inside `pg_data`.
fn pg_relative_path(name: &str) -> &str {
    name.strip_prefix("pg_data/").unwrap_or(name)
}

/// The timeline a WAL segment belongs to is the first 8 hex characters of
/// its 24-character name; no separate stored field is needed to compare
/// timelines across backups; the wal_start/wal_stop names already carry it.
fn timeline_of(wal_segment_name: &str) -> Option<u32> {
    if wal_segment_name.len() != 24 {
        return None;
    }
    u32::from_str_radix(&wal_segment_name[0..8], 16).ok()
}

fn segs_per_log(wal_segment_size: u32) -> u64 {
    0x1_0000_0000u64 / wal_segment_size as u64
}

fn wal_segment_number(name: &str, segs_per_log: u64) -> Option<(u32, u64)> {
    if name.len() != 24 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let tli = u32::from_str_radix(&name[0..8], 16).ok()?;
    let log_id = u64::from_str_radix(&name[8..16], 16).ok()?;
    let seg = u64::from_str_radix(&name[16..24], 16).ok()?;
    Some((tli, log_id * segs_per_log + seg))
}

fn wal_segment_name(tli: u32, abs_seg: u64, segs_per_log: u64) -> String {
    let log_id = abs_seg / segs_per_log;
    let seg = abs_seg % segs_per_log;
    format!("{tli:08X}{log_id:08X}{seg:08X}")
}

/// Enumerates every WAL segment name between `start` and `stop`, inclusive,
/// relying on segment names sorting lexicographically within one timeline.
fn wal_segments_between(start: &str, stop: &str, segs_per_log: u64) -> Result<Vec<String>, BackupError> {
    let (tli_start, start_n) = wal_segment_number(start, segs_per_log)
        .ok_or_else(|| BackupError::Config(format!("malformed WAL segment name: {start}")))?;
    let (tli_stop, stop_n) = wal_segment_number(stop, segs_per_log)
        .ok_or_else(|| BackupError::Config(format!("malformed WAL segment name: {stop}")))?;
    if tli_start != tli_stop {
        return Err(BackupError::Config("archive check spans a timeline switch".to_string()));
    }
    Ok((start_n..=stop_n).map(|n| wal_segment_name(tli_start, n, segs_per_log)).collect())
}

async fn read_to_string(repo: &dyn Repository, path: &Utf8Path) -> Result<String, backup_storage::StorageError> {
    use tokio::io::AsyncReadExt;
    let mut stream = repo.new_read(path).await?;
    let mut buf = Vec::new();
    stream
        .read_to_end(&mut buf)
        .await
        .map_err(|source| backup_storage::StorageError::Io { path: path.to_string(), source })?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn write_text(repo: &dyn Repository, path: &Utf8Path, text: &str) -> Result<(), backup_storage::StorageError> {
    use tokio::io::AsyncWriteExt;
    let mut sink = repo.new_write(path, WriteOptions { create_path: true, ..Default::default() }).await?;
    sink.write_all(text.as_bytes())
        .await
        .map_err(|source| backup_storage::StorageError::Io { path: path.to_string(), source })?;
    sink.shutdown()
        .await
        .map_err(|source| backup_storage::StorageError::Io { path: path.to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_relative_path_strips_pg_data_prefix() {
        assert_eq!(pg_relative_path("pg_data/base/1/3"), "base/1/3");
        assert_eq!(pg_relative_path("pg_tblspc/16401/PG_13_201909212/1/3"), "pg_tblspc/16401/PG_13_201909212/1/3");
    }

    #[test]
    fn timeline_of_reads_the_first_eight_hex_chars() {
        assert_eq!(timeline_of("00000002000000170000004A"), Some(2));
        assert_eq!(timeline_of("short"), None);
    }

    #[test]
    fn wal_segments_between_is_inclusive_and_ordered() {
        let segs_per_log = segs_per_log(16 * 1024 * 1024);
        let segments = wal_segments_between(
            "000000010000000000000001",
            "000000010000000000000003",
            segs_per_log,
        )
        .unwrap();
        assert_eq!(
            segments,
            vec![
                "000000010000000000000001".to_string(),
                "000000010000000000000002".to_string(),
                "000000010000000000000003".to_string(),
            ]
        );
    }

    #[test]
    fn wal_segments_between_rejects_a_timeline_switch() {
        let segs_per_log = segs_per_log(16 * 1024 * 1024);
        let err = wal_segments_between("000000010000000000000001", "000000020000000000000001", segs_per_log).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn wal_segment_number_round_trips_through_wal_segment_name() {
        let segs_per_log = segs_per_log(16 * 1024 * 1024);
        let name = wal_segment_name(1, 300, segs_per_log);
        let (tli, n) = wal_segment_number(&name, segs_per_log).unwrap();
        assert_eq!(tli, 1);
        assert_eq!(n, 300);
    }
}
