//! The `copyResult` branch table (§4.H, pinned down by the supplemented
//! `backupTest.c`-derived matrix), factored out of the I/O so it can be
//! exercised without a filesystem.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    NoOp,
    Checksum,
    Copy,
    ReCopy,
}

/// Facts the worker has already gathered before consulting the table.
/// Fields that require I/O to compute are `Option` so the caller can skip
/// work the table turns out not to need — `unchanged_since_manifest` is
/// only evaluated when `delta` or a prior checksum was supplied, and
/// `readback_checksum_matches` only when that first check passed.
#[derive(Debug, Clone, Copy)]
pub struct DecisionFacts {
    pub pg_exists: bool,
    pub ignore_missing: bool,
    pub delta: bool,
    pub has_checksum_param: bool,
    pub repo_file_has_reference: bool,
    pub repo_file_exists: bool,
    pub unchanged_since_manifest: Option<bool>,
    pub readback_checksum_matches: Option<bool>,
}

/// `pg_exists == false && ignore_missing == false` is rejected by the
/// caller (as `FileMissingError`) before this is ever consulted.
pub fn decide(facts: &DecisionFacts) -> Decision {
    if !facts.pg_exists {
        debug_assert!(facts.ignore_missing);
        return Decision::Skip;
    }

    if (facts.delta || facts.has_checksum_param) && facts.unchanged_since_manifest == Some(true) {
        if facts.repo_file_has_reference {
            return Decision::NoOp;
        }
        return match facts.readback_checksum_matches {
            Some(true) => Decision::Checksum,
            _ => Decision::ReCopy,
        };
    }

    if facts.repo_file_exists {
        Decision::ReCopy
    } else {
        Decision::Copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DecisionFacts {
        DecisionFacts {
            pg_exists: true,
            ignore_missing: false,
            delta: false,
            has_checksum_param: false,
            repo_file_has_reference: false,
            repo_file_exists: false,
            unchanged_since_manifest: None,
            readback_checksum_matches: None,
        }
    }

    #[test]
    fn missing_with_ignore_missing_is_skip() {
        let facts = DecisionFacts { pg_exists: false, ignore_missing: true, ..base() };
        assert_eq!(decide(&facts), Decision::Skip);
    }

    #[test]
    fn unchanged_with_reference_is_noop() {
        let facts = DecisionFacts {
            has_checksum_param: true,
            repo_file_has_reference: true,
            unchanged_since_manifest: Some(true),
            ..base()
        };
        assert_eq!(decide(&facts), Decision::NoOp);
    }

    #[test]
    fn unchanged_without_reference_and_matching_readback_is_checksum() {
        let facts = DecisionFacts {
            has_checksum_param: true,
            unchanged_since_manifest: Some(true),
            readback_checksum_matches: Some(true),
            ..base()
        };
        assert_eq!(decide(&facts), Decision::Checksum);
    }

    #[test]
    fn unchanged_but_readback_mismatch_is_recopy() {
        let facts = DecisionFacts {
            has_checksum_param: true,
            unchanged_since_manifest: Some(true),
            readback_checksum_matches: Some(false),
            ..base()
        };
        assert_eq!(decide(&facts), Decision::ReCopy);
    }

    #[test]
    fn changed_file_with_no_prior_repo_copy_is_copy() {
        let facts = DecisionFacts { has_checksum_param: true, unchanged_since_manifest: Some(false), ..base() };
        assert_eq!(decide(&facts), Decision::Copy);
    }

    #[test]
    fn changed_file_replacing_a_prior_repo_copy_is_recopy() {
        let facts = DecisionFacts {
            has_checksum_param: true,
            unchanged_since_manifest: Some(false),
            repo_file_exists: true,
            ..base()
        };
        assert_eq!(decide(&facts), Decision::ReCopy);
    }

    #[test]
    fn full_backup_with_no_delta_or_checksum_is_plain_copy() {
        assert_eq!(decide(&base()), Decision::Copy);
    }
}
