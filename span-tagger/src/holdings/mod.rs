//! Holdings files and coverage
//!
//! A holdings file (KBART) lists, per serial, the range of issues an
//! institution is entitled to. It is parsed into a [`CoverageIndex`] mapping
//! ISSN to [`Entry`] values; [`HoldingsCache`] downloads, persists and
//! memoizes those indexes; the coverage check itself lives in `coverage`.

use span_common::time::{Delay, PartialDate};
use span_common::Record;
use std::collections::HashMap;

mod coverage;
pub mod cache;
pub mod fetch;
pub mod kbart;

pub use cache::{cache_key, HoldingsCache, RefreshPolicy};
pub use fetch::{Fetch, HttpFetcher};

/// One end of a coverage range; fields are only meaningful when `year` is set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bound {
    pub year: Option<i32>,
    pub volume: Option<u32>,
    pub issue: Option<u32>,
}

impl Bound {
    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: u32) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_issue(mut self, issue: u32) -> Self {
        self.issue = Some(issue);
        self
    }
}

/// Entitlement entry: a single holdings row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub print_identifier: Option<String>,
    pub online_identifier: Option<String>,
    /// Inclusive lower bound; unbounded when the year is absent
    pub from: Bound,
    /// Inclusive upper bound; unbounded when the year is absent
    pub to: Bound,
    /// Moving wall on the newest content: only records older than
    /// `today + from_delay` are covered
    pub from_delay: Option<Delay>,
    /// Rolling window: only records newer than `today + to_delay` are covered
    pub to_delay: Option<Delay>,
}

/// Record side of a coverage check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Issuance {
    pub date: Option<PartialDate>,
    pub volume: Option<u32>,
    pub issue: Option<u32>,
}

impl Issuance {
    pub fn new(raw_date: &str, volume: &str, issue: &str) -> Self {
        Self {
            date: PartialDate::parse(raw_date),
            volume: coerce_number(volume),
            issue: coerce_number(issue),
        }
    }

    pub fn from_record(record: &Record) -> Self {
        Self::new(&record.raw_date, &record.volume, &record.issue)
    }

    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year)
    }
}

/// Leading digit run of a free-text volume or issue, e.g. `"12a"` is 12.
pub fn coerce_number(value: &str) -> Option<u32> {
    let value = value.trim();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

/// Normalize an ISSN to `NNNN-NNNC`, rejecting anything else.
pub fn normalize_issn(value: &str) -> Option<String> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.len() != 8 {
        return None;
    }
    let (body, check) = compact.split_at(7);
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !check.bytes().all(|b| b.is_ascii_digit() || b == b'X') {
        return None;
    }
    Some(format!("{}-{}", &compact[..4], &compact[4..]))
}

/// ISSN to entitlement entries, derived from one holdings file
#[derive(Debug, Default)]
pub struct CoverageIndex {
    entries: HashMap<String, Vec<Entry>>,
    rows: usize,
}

impl CoverageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an entry under its print and online ISSN.
    ///
    /// Returns false when the entry carries no usable ISSN.
    pub fn insert(&mut self, entry: Entry) -> bool {
        let mut keys: Vec<String> = [&entry.print_identifier, &entry.online_identifier]
            .into_iter()
            .flatten()
            .filter_map(|issn| normalize_issn(issn))
            .collect();
        keys.dedup();

        if keys.is_empty() {
            return false;
        }

        self.rows += 1;
        for key in keys {
            self.entries.entry(key).or_default().push(entry.clone());
        }
        true
    }

    /// Entries listed for a serial number
    pub fn get(&self, issn: &str) -> &[Entry] {
        normalize_issn(issn)
            .and_then(|key| self.entries.get(&key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of distinct serial numbers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of indexed holdings rows
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Merge another index (e.g. a further member of the same archive)
    pub fn extend(&mut self, other: CoverageIndex) {
        self.rows += other.rows;
        for (issn, entries) in other.entries {
            self.entries.entry(issn).or_default().extend(entries);
        }
    }
}
