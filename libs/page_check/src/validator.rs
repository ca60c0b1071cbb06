use std::io::Read;

use serde::{Deserialize, Serialize};
use utils::lsn::Lsn;

use crate::checksum::{compute_page_checksum, PD_CHECKSUM_OFFSET, PD_LSN_OFFSET, PD_UPPER_OFFSET};

/// A contiguous run of bad page indices collapses to a `Range`; an isolated
/// bad page stays an `Index`. Matches the manifest's
/// `checksum-page-error` list encoding (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageErrorEntry {
    Index(u32),
    Range(u32, u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageCheckResult {
    /// `pd_upper == 0` (new/empty page) or `pd_lsn` beyond the backup-start
    /// LSN limit: not a real corruption, just skipped.
    pub errors: Vec<PageErrorEntry>,
    /// False if the file's length wasn't a whole number of pages.
    pub aligned: bool,
    pub pages_checked: u32,
}

impl PageCheckResult {
    pub fn valid(&self) -> bool {
        self.errors.is_empty() && self.aligned
    }
}

fn is_exempt(page: &[u8], lsn_limit: Lsn) -> bool {
    let pd_upper = u16::from_le_bytes([page[PD_UPPER_OFFSET], page[PD_UPPER_OFFSET + 1]]);
    if pd_upper == 0 {
        return true;
    }
    let pd_lsn = u64::from_le_bytes(page[PD_LSN_OFFSET..PD_LSN_OFFSET + 8].try_into().unwrap());
    Lsn(pd_lsn) > lsn_limit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// `pd_upper == 0` or `pd_lsn` beyond the backup-start LSN limit.
    Exempt,
    Valid,
    Bad,
}

/// Checks a single full page. Shared by the file-level [`validate_pages`]
/// and the streaming page-checksum filter in `backup_filter`, so both see
/// the same exemption rules.
pub fn check_one_page(page: &[u8], block_number: u32, lsn_limit: Lsn) -> PageStatus {
    if is_exempt(page, lsn_limit) {
        return PageStatus::Exempt;
    }
    let stored = u16::from_le_bytes([buf_at(page, PD_CHECKSUM_OFFSET), buf_at(page, PD_CHECKSUM_OFFSET + 1)]);
    let expected = compute_page_checksum(page, block_number);
    if stored == expected {
        PageStatus::Valid
    } else {
        PageStatus::Bad
    }
}

fn buf_at(page: &[u8], offset: usize) -> u8 {
    page[offset]
}

fn coalesce(mut bad: Vec<u32>) -> Vec<PageErrorEntry> {
    bad.sort_unstable();
    bad.dedup();

    let mut out = Vec::new();
    let mut i = 0;
    while i < bad.len() {
        let start = bad[i];
        let mut end = start;
        let mut j = i + 1;
        while j < bad.len() && bad[j] == end + 1 {
            end = bad[j];
            j += 1;
        }
        if end > start {
            out.push(PageErrorEntry::Range(start, end));
        } else {
            out.push(PageErrorEntry::Index(start));
        }
        i = j;
    }
    out
}

/// Validates page checksums for an entire relation file, reading it through
/// in page-sized blocks. `lsn_limit` is the backup-start LSN: pages written
/// after that point will be replayed from WAL and are not flagged.
pub fn validate_pages<R: Read>(
    mut reader: R,
    page_size: u32,
    lsn_limit: Lsn,
) -> std::io::Result<PageCheckResult> {
    let page_size = page_size as usize;
    let mut buf = vec![0u8; page_size];
    let mut bad = Vec::new();
    let mut block_number = 0u32;
    let mut aligned = true;

    loop {
        let mut read = 0;
        while read < page_size {
            let n = reader.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }

        if read == 0 {
            break;
        }
        if read < page_size {
            aligned = false;
            break;
        }

        if !is_exempt(&buf, lsn_limit) {
            let stored = u16::from_le_bytes([
                buf[PD_CHECKSUM_OFFSET],
                buf[PD_CHECKSUM_OFFSET + 1],
            ]);
            let expected = compute_page_checksum(&buf, block_number);
            if stored != expected {
                bad.push(block_number);
            }
        }

        block_number += 1;
    }

    Ok(PageCheckResult {
        errors: coalesce(bad),
        aligned,
        pages_checked: block_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::compute_page_checksum;
    use std::io::Cursor;

    fn page_with_checksum(block_number: u32, upper: u16, lsn: u64) -> Vec<u8> {
        let mut page = vec![0u8; 8192];
        page[PD_LSN_OFFSET..PD_LSN_OFFSET + 8].copy_from_slice(&lsn.to_le_bytes());
        page[PD_UPPER_OFFSET..PD_UPPER_OFFSET + 2].copy_from_slice(&upper.to_le_bytes());
        let checksum = compute_page_checksum(&page, block_number);
        page[PD_CHECKSUM_OFFSET..PD_CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_le_bytes());
        page
    }

    #[test]
    fn all_valid_pages_round_trip() {
        let mut data = Vec::new();
        for i in 0..4 {
            data.extend(page_with_checksum(i, 100, 0));
        }
        let result = validate_pages(Cursor::new(data), 8192, Lsn(0)).unwrap();
        assert!(result.valid());
        assert_eq!(result.pages_checked, 4);
    }

    #[test]
    fn bad_checksum_flagged_and_coalesced() {
        let mut data = Vec::new();
        for i in 0..4u32 {
            let mut page = page_with_checksum(i, 100, 0);
            if i == 0 || i == 2 || i == 3 {
                // corrupt the stored checksum for pages 0, 2, 3
                page[PD_CHECKSUM_OFFSET] ^= 0xFF;
            }
            data.extend(page);
        }
        let result = validate_pages(Cursor::new(data), 8192, Lsn(0)).unwrap();
        assert!(!result.valid());
        assert_eq!(
            result.errors,
            vec![PageErrorEntry::Index(0), PageErrorEntry::Range(2, 3)]
        );
    }

    #[test]
    fn new_empty_page_is_exempt() {
        let mut data = page_with_checksum(0, 0, 0);
        data[PD_CHECKSUM_OFFSET] ^= 0xFF; // would be bad, but pd_upper==0 exempts it
        let result = validate_pages(Cursor::new(data), 8192, Lsn(0)).unwrap();
        assert!(result.valid());
    }

    #[test]
    fn page_written_after_backup_start_is_exempt() {
        let mut data = page_with_checksum(0, 100, 5000);
        data[PD_CHECKSUM_OFFSET] ^= 0xFF;
        let result = validate_pages(Cursor::new(data), 8192, Lsn(1000)).unwrap();
        assert!(result.valid());
    }

    #[test]
    fn misaligned_trailing_bytes_invalidate_without_losing_prior_pages() {
        let mut data = page_with_checksum(0, 100, 0);
        data.extend(vec![0u8; 100]); // trailing partial page
        let result = validate_pages(Cursor::new(data), 8192, Lsn(0)).unwrap();
        assert!(!result.aligned);
        assert!(result.errors.is_empty());
        assert_eq!(result.pages_checked, 1);
    }
}
