//! Decodes PostgreSQL's `server_version_num` integer (`SHOW server_version_num`)
//! into the same [`PgMajorVersion`] the control-file parser reports, so
//! [`crate::DbClient::open`] can compare the two without parsing version
//! strings. Before PG10, `version_num` encodes `major*10000 + minor*100 +
//! patch` (e.g. `90605` for 9.6.5); from PG10 on, the minor digits are the
//! point release and the major alone is the ABI-relevant number (e.g.
//! `130005` for 13.5).

use pg_control::PgMajorVersion;

pub fn decode(version_num: i32) -> Option<PgMajorVersion> {
    if version_num < 0 {
        return None;
    }
    let n = version_num as u32;
    let major = n / 10000;

    if major >= 10 {
        return match major {
            10 => Some(PgMajorVersion::V100),
            11 => Some(PgMajorVersion::V110),
            12 => Some(PgMajorVersion::V120),
            13 => Some(PgMajorVersion::V130),
            _ => None,
        };
    }

    let minor = (n / 100) % 100;
    match (major, minor) {
        (8, 3) => Some(PgMajorVersion::V83),
        (8, 4) => Some(PgMajorVersion::V84),
        (9, 0) => Some(PgMajorVersion::V90),
        (9, 1) => Some(PgMajorVersion::V91),
        (9, 2) => Some(PgMajorVersion::V92),
        (9, 3) => Some(PgMajorVersion::V93),
        (9, 4) => Some(PgMajorVersion::V94),
        (9, 5) => Some(PgMajorVersion::V95),
        (9, 6) => Some(PgMajorVersion::V96),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_post_pg10_majors() {
        assert_eq!(decode(130005), Some(PgMajorVersion::V130));
        assert_eq!(decode(100000), Some(PgMajorVersion::V100));
    }

    #[test]
    fn decodes_pre_pg10_majors() {
        assert_eq!(decode(90605), Some(PgMajorVersion::V96));
        assert_eq!(decode(80300), Some(PgMajorVersion::V83));
    }

    #[test]
    fn rejects_unknown_majors() {
        assert_eq!(decode(140001), None);
        assert_eq!(decode(70400), None);
    }
}
