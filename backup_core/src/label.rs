//! Backup label parsing and generation (§3 `BackupLabel`, §4.I
//! `LABEL_ASSIGN`). Canonical form: `YYYYMMDD-HHMMSS[F|_YYYYMMDD-HHMMSS{D|I}]`
//! — a full backup's label is just its own timestamp; a diff/incr label
//! embeds the full backup it references as a prefix.

use chrono::{DateTime, Duration, TimeZone, Utc};

use backup_manifest::BackupType;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("malformed backup label: {0}")]
    Malformed(String),
    #[error("new label's timestamp does not strictly exceed the latest existing label")]
    NotMonotonic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLabel {
    pub text: String,
    pub backup_type: BackupType,
    /// The full backup's label this one is chained to, for `diff`/`incr`.
    pub prior_full: Option<String>,
    pub epoch_seconds: i64,
}

impl BackupLabel {
    pub fn parse(text: &str) -> Result<Self, LabelError> {
        if let Some(rest) = text.strip_suffix('F') {
            if rest.contains('_') {
                return Err(LabelError::Malformed(text.to_string()));
            }
            let epoch_seconds = parse_timestamp(rest)?;
            return Ok(BackupLabel {
                text: text.to_string(),
                backup_type: BackupType::Full,
                prior_full: None,
                epoch_seconds,
            });
        }

        let (suffix, backup_type) = match text.chars().last() {
            Some('D') => ('D', BackupType::Diff),
            Some('I') => ('I', BackupType::Incr),
            _ => return Err(LabelError::Malformed(text.to_string())),
        };
        let body = &text[..text.len() - 1];
        let (prior_full, own_ts) = body
            .split_once('_')
            .ok_or_else(|| LabelError::Malformed(text.to_string()))?;
        if !prior_full.ends_with('F') {
            return Err(LabelError::Malformed(text.to_string()));
        }
        let _ = parse_timestamp(&prior_full[..prior_full.len() - 1])?;
        let epoch_seconds = parse_timestamp(own_ts)?;
        let _ = suffix;

        Ok(BackupLabel {
            text: text.to_string(),
            backup_type,
            prior_full: Some(prior_full.to_string()),
            epoch_seconds,
        })
    }

    /// Builds a full backup's label from a timestamp.
    pub fn full(at: DateTime<Utc>) -> Self {
        let text = format!("{}F", at.format(TIMESTAMP_FORMAT));
        BackupLabel { text, backup_type: BackupType::Full, prior_full: None, epoch_seconds: at.timestamp() }
    }

    /// Builds a diff/incr label chained to `prior_full` (itself a full
    /// backup's label text, including its trailing `F`).
    pub fn chained(at: DateTime<Utc>, backup_type: BackupType, prior_full: &str) -> Self {
        assert_ne!(backup_type, BackupType::Full, "chained() is only for diff/incr labels");
        let suffix = if backup_type == BackupType::Diff { 'D' } else { 'I' };
        let text = format!("{}_{}{suffix}", prior_full, at.format(TIMESTAMP_FORMAT));
        BackupLabel { text, backup_type, prior_full: Some(prior_full.to_string()), epoch_seconds: at.timestamp() }
    }
}

fn parse_timestamp(s: &str) -> Result<i64, LabelError> {
    let naive = chrono::NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|_| LabelError::Malformed(s.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive).timestamp())
}

/// Generates a new label whose timestamp strictly exceeds `latest_epoch`
/// (the newest existing label in the repository, if any). If the current
/// second is already taken this sleeps to the next second once; if the
/// clock still hasn't advanced past `latest_epoch` after that, it gives up
/// rather than looping (§3 invariant).
pub async fn assign_label(
    now: DateTime<Utc>,
    latest_epoch: Option<i64>,
    backup_type: BackupType,
    prior_full: Option<&str>,
) -> Result<BackupLabel, LabelError> {
    let mut at = now;
    if let Some(latest) = latest_epoch {
        if at.timestamp() <= latest {
            tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
            at = now + Duration::seconds(1);
            if at.timestamp() <= latest {
                return Err(LabelError::NotMonotonic);
            }
        }
    }

    match backup_type {
        BackupType::Full => Ok(BackupLabel::full(at)),
        _ => {
            let prior_full = prior_full.ok_or_else(|| {
                LabelError::Malformed("diff/incr label requires a prior full backup".to_string())
            })?;
            Ok(BackupLabel::chained(at, backup_type, prior_full))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_label() {
        let label = BackupLabel::parse("20260701-000000F").unwrap();
        assert_eq!(label.backup_type, BackupType::Full);
        assert!(label.prior_full.is_none());
    }

    #[test]
    fn parses_a_chained_incr_label() {
        let label = BackupLabel::parse("20260701-000000F_20260702-010000I").unwrap();
        assert_eq!(label.backup_type, BackupType::Incr);
        assert_eq!(label.prior_full.as_deref(), Some("20260701-000000F"));
    }

    #[test]
    fn rejects_a_malformed_label() {
        assert!(BackupLabel::parse("not-a-label").is_err());
        assert!(BackupLabel::parse("20260701-000000X").is_err());
    }

    #[test]
    fn chained_label_round_trips_through_parse() {
        let at = Utc.with_ymd_and_hms(2026, 7, 2, 1, 0, 0).unwrap();
        let built = BackupLabel::chained(at, BackupType::Diff, "20260701-000000F");
        let parsed = BackupLabel::parse(&built.text).unwrap();
        assert_eq!(parsed, built);
    }

    #[tokio::test]
    async fn assign_label_errors_when_clock_cannot_advance() {
        let now = Utc.with_ymd_and_hms(2026, 7, 2, 1, 0, 0).unwrap();
        let err = assign_label(now, Some(now.timestamp() + 10), BackupType::Full, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LabelError::NotMonotonic));
    }

    #[tokio::test]
    async fn assign_label_accepts_a_strictly_later_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 7, 2, 1, 0, 0).unwrap();
        let label = assign_label(now, Some(now.timestamp() - 1), BackupType::Full, None)
            .await
            .unwrap();
        assert_eq!(label.epoch_seconds, now.timestamp());
    }
}
