//! Streaming page-checksum filter: validates pages as they flow through the
//! pipeline instead of re-reading the source file afterward. Feeds the same
//! [`page_check::check_one_page`] logic the standalone validator uses, so
//! both paths agree on exemptions.

use page_check::{check_one_page, PageErrorEntry, PageStatus};
use utils::lsn::Lsn;

pub struct IncrementalPageChecker {
    page_size: usize,
    lsn_limit: Lsn,
    buf: Vec<u8>,
    block_number: u32,
    bad: Vec<u32>,
    aligned: bool,
}

impl IncrementalPageChecker {
    pub fn new(page_size: u32, lsn_limit: Lsn) -> Self {
        IncrementalPageChecker {
            page_size: page_size as usize,
            lsn_limit,
            buf: Vec::with_capacity(page_size as usize),
            block_number: 0,
            bad: Vec::new(),
            aligned: true,
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        while self.buf.len() >= self.page_size {
            let page: Vec<u8> = self.buf.drain(0..self.page_size).collect();
            if let PageStatus::Bad = check_one_page(&page, self.block_number, self.lsn_limit) {
                self.bad.push(self.block_number);
            }
            self.block_number += 1;
        }
    }

    /// Any bytes left over that don't make up a whole page mean the file
    /// wasn't page-aligned; that's recorded, not treated as a bad page.
    pub fn finish(self) -> (Vec<PageErrorEntry>, bool) {
        let aligned = self.aligned && self.buf.is_empty();
        (coalesce(self.bad), aligned)
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use page_check::compute_page_checksum;

    fn good_page(block_number: u32) -> Vec<u8> {
        let mut page = vec![0u8; 8192];
        page[14..16].copy_from_slice(&100u16.to_le_bytes()); // pd_upper
        let checksum = compute_page_checksum(&page, block_number);
        page[8..10].copy_from_slice(&checksum.to_le_bytes());
        page
    }

    #[test]
    fn feeding_byte_at_a_time_still_detects_bad_checksum() {
        let mut checker = IncrementalPageChecker::new(8192, Lsn(0));
        let mut data = good_page(0);
        data.extend(good_page(1));
        data[8] ^= 0xFF; // corrupt page 0's stored checksum
        for byte in &data {
            checker.feed(std::slice::from_ref(byte));
        }
        let (errors, aligned) = checker.finish();
        assert!(aligned);
        assert_eq!(errors, vec![PageErrorEntry::Index(0)]);
    }

    #[test]
    fn trailing_partial_page_is_unaligned() {
        let mut checker = IncrementalPageChecker::new(8192, Lsn(0));
        checker.feed(&good_page(0));
        checker.feed(&[0u8; 50]);
        let (errors, aligned) = checker.finish();
        assert!(!aligned);
        assert!(errors.is_empty());
    }
}
