//! Coverage evaluation
//!
//! A record is compared with each bound as the tuple (year, volume, issue),
//! truncated at the finest level present on both sides. Missing record-side
//! detail falls back to the coarser level: a record without a volume is
//! judged by its year alone, even against a year+volume bound. A record
//! without a year cannot be placed against any dated bound or moving wall.

use chrono::NaiveDate;
use span_common::Record;
use std::cmp::Ordering;

use super::{normalize_issn, Bound, CoverageIndex, Entry, Issuance};

/// Position of a record relative to one bound
enum Placement {
    /// The bound has no year, so it does not constrain
    Unbounded,
    /// The record has no year, so it cannot be placed
    Undetermined,
    At(Ordering),
}

fn place(issuance: &Issuance, bound: &Bound) -> Placement {
    let Some(bound_year) = bound.year else {
        return Placement::Unbounded;
    };
    let Some(year) = issuance.year() else {
        return Placement::Undetermined;
    };

    let mut ordering = year.cmp(&bound_year);
    if ordering == Ordering::Equal {
        if let (Some(volume), Some(bound_volume)) = (issuance.volume, bound.volume) {
            ordering = volume.cmp(&bound_volume);
            if ordering == Ordering::Equal {
                if let (Some(issue), Some(bound_issue)) = (issuance.issue, bound.issue) {
                    ordering = issue.cmp(&bound_issue);
                }
            }
        }
    }
    Placement::At(ordering)
}

impl Entry {
    /// Whether this entry covers the issuance, with moving walls resolved
    /// against `today`.
    pub fn covers(&self, issuance: &Issuance, today: NaiveDate) -> bool {
        let above_lower = match place(issuance, &self.from) {
            Placement::Unbounded => true,
            Placement::Undetermined => false,
            Placement::At(ordering) => ordering != Ordering::Less,
        };
        if !above_lower {
            return false;
        }

        let below_upper = match place(issuance, &self.to) {
            Placement::Unbounded => true,
            Placement::Undetermined => false,
            Placement::At(ordering) => ordering != Ordering::Greater,
        };
        if !below_upper {
            return false;
        }

        self.within_moving_walls(issuance, today)
    }

    fn within_moving_walls(&self, issuance: &Issuance, today: NaiveDate) -> bool {
        if self.from_delay.is_none() && self.to_delay.is_none() {
            return true;
        }
        let Some(date) = issuance.date else {
            return false;
        };

        if let Some(delay) = self.from_delay {
            // Embargo: nothing newer than the wall
            if date.cmp_date(delay.apply(today)) == Ordering::Greater {
                return false;
            }
        }
        if let Some(delay) = self.to_delay {
            // Rolling window: nothing older than the wall
            if date.cmp_date(delay.apply(today)) == Ordering::Less {
                return false;
            }
        }
        true
    }
}

impl CoverageIndex {
    /// True if any entry listed under any of the serial numbers covers the
    /// issuance. Stops at the first covering entry.
    pub fn covers<'a, I>(&self, serial_numbers: I, issuance: &Issuance, today: NaiveDate) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        serial_numbers
            .into_iter()
            .filter_map(normalize_issn)
            .filter_map(|issn| self.entries.get(&issn))
            .flatten()
            .any(|entry| entry.covers(issuance, today))
    }

    /// Coverage check for a record's ISSN/EISSN, date, volume and issue
    pub fn covers_record(&self, record: &Record, today: NaiveDate) -> bool {
        self.covers(record.serial_numbers(), &Issuance::from_record(record), today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use span_common::time::{Delay, DelayUnit};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn entry(from: Bound, to: Bound) -> Entry {
        Entry {
            print_identifier: Some("1234-5678".to_string()),
            from,
            to,
            ..Default::default()
        }
    }

    #[test]
    fn test_year_range_inclusive() {
        let e = entry(Bound::year(1999), Bound::year(2001));
        assert!(e.covers(&Issuance::new("1999", "", ""), today()));
        assert!(e.covers(&Issuance::new("2000", "", ""), today()));
        assert!(e.covers(&Issuance::new("2001-12-31", "", ""), today()));
        assert!(!e.covers(&Issuance::new("2002", "", ""), today()));
        assert!(!e.covers(&Issuance::new("1998-12-31", "", ""), today()));
    }

    #[test]
    fn test_year_only_entry_ignores_volume_and_issue() {
        let e = entry(Bound::year(2000), Bound::year(2010));
        for (volume, issue) in [("1", "1"), ("999", "999"), ("", ""), ("abc", "x")] {
            assert!(e.covers(&Issuance::new("2004-06-01", volume, issue), today()));
            assert!(!e.covers(&Issuance::new("2011-01-01", volume, issue), today()));
        }
    }

    #[test]
    fn test_unbounded_sides() {
        let open_end = entry(Bound::year(2000), Bound::default());
        assert!(open_end.covers(&Issuance::new("2026", "", ""), today()));
        assert!(!open_end.covers(&Issuance::new("1999", "", ""), today()));

        let open_start = entry(Bound::default(), Bound::year(2000));
        assert!(open_start.covers(&Issuance::new("1850", "", ""), today()));

        let unbounded = entry(Bound::default(), Bound::default());
        assert!(unbounded.covers(&Issuance::new("", "", ""), today()));
    }

    #[test]
    fn test_volume_compared_only_in_boundary_year() {
        let e = entry(Bound::year(2000).with_volume(5), Bound::year(2010).with_volume(15));

        assert!(!e.covers(&Issuance::new("2000", "4", ""), today()));
        assert!(e.covers(&Issuance::new("2000", "5", ""), today()));
        // Inner years are not constrained by volume
        assert!(e.covers(&Issuance::new("2005", "1", ""), today()));
        assert!(e.covers(&Issuance::new("2010", "15", ""), today()));
        assert!(!e.covers(&Issuance::new("2010", "16", ""), today()));
    }

    #[test]
    fn test_issue_compared_only_in_boundary_volume() {
        let e = entry(
            Bound::year(2000).with_volume(5).with_issue(3),
            Bound::year(2010).with_volume(15).with_issue(2),
        );

        assert!(!e.covers(&Issuance::new("2000", "5", "2"), today()));
        assert!(e.covers(&Issuance::new("2000", "5", "3"), today()));
        assert!(e.covers(&Issuance::new("2000", "6", "1"), today()));
        assert!(e.covers(&Issuance::new("2010", "15", "2"), today()));
        assert!(!e.covers(&Issuance::new("2010", "15", "3"), today()));
    }

    #[test]
    fn test_missing_record_detail_falls_back_to_coarser_level() {
        let e = entry(Bound::year(2000).with_volume(5).with_issue(3), Bound::default());

        // No volume: judged by year alone
        assert!(e.covers(&Issuance::new("2000", "", ""), today()));
        // Non-numeric volume behaves like a missing one
        assert!(e.covers(&Issuance::new("2000", "Suppl.", ""), today()));
        // Volume but no issue: judged by year and volume
        assert!(e.covers(&Issuance::new("2000", "5", ""), today()));
        assert!(!e.covers(&Issuance::new("2000", "4", ""), today()));
    }

    #[test]
    fn test_record_without_year_is_not_covered_by_dated_entry() {
        let e = entry(Bound::year(2000), Bound::default());
        assert!(!e.covers(&Issuance::new("", "3", "4"), today()));
        assert!(!e.covers(&Issuance::new("undated", "", ""), today()));
    }

    #[test]
    fn test_embargo_excludes_recent_records() {
        let mut e = entry(Bound::year(2000), Bound::default());
        e.from_delay = Some(Delay::new(-1, DelayUnit::Year));

        // Wall is 2025-10-18
        assert!(e.covers(&Issuance::new("2025-10-18", "", ""), today()));
        assert!(e.covers(&Issuance::new("2024-01-01", "", ""), today()));
        assert!(!e.covers(&Issuance::new("2025-10-19", "", ""), today()));
        assert!(!e.covers(&Issuance::new("2026-10-18", "", ""), today()));
        // Year granularity: same year as the wall is not after it
        assert!(e.covers(&Issuance::new("2025", "", ""), today()));
        assert!(!e.covers(&Issuance::new("2026", "", ""), today()));
    }

    #[test]
    fn test_embargo_overrides_static_range() {
        let mut e = entry(Bound::year(2000), Bound::year(2030));
        e.from_delay = Some(Delay::new(-1, DelayUnit::Year));

        let recent = Issuance::new("2026-06-01", "", "");
        assert!(!e.covers(&recent, today()));

        e.from_delay = None;
        assert!(e.covers(&recent, today()));
    }

    #[test]
    fn test_rolling_window_excludes_old_records() {
        let mut e = entry(Bound::default(), Bound::default());
        e.to_delay = Some(Delay::new(-5, DelayUnit::Year));

        assert!(e.covers(&Issuance::new("2022-03-01", "", ""), today()));
        assert!(e.covers(&Issuance::new("2021", "", ""), today()));
        assert!(!e.covers(&Issuance::new("2021-10-17", "", ""), today()));
        assert!(!e.covers(&Issuance::new("2020", "", ""), today()));
        assert!(!e.covers(&Issuance::new("", "", ""), today()));
    }

    #[test]
    fn test_index_any_of_entries_and_issns() {
        let mut index = CoverageIndex::new();
        index.insert(entry(Bound::year(1990), Bound::year(1995)));
        index.insert(Entry {
            online_identifier: Some("8765-4321".to_string()),
            from: Bound::year(2000),
            to: Bound::year(2010),
            ..Default::default()
        });

        let issuance = Issuance::new("2004-06-01", "3", "4");
        // Only the EISSN entry covers 2004
        assert!(index.covers(["1234-5678", "8765-4321"], &issuance, today()));
        assert!(!index.covers(["1234-5678"], &issuance, today()));
        assert!(!index.covers(["0000-0000", "not an issn"], &issuance, today()));
    }

    #[test]
    fn test_contradicting_entries_one_is_enough() {
        let mut index = CoverageIndex::new();
        index.insert(entry(Bound::year(1990), Bound::year(1995)));
        index.insert(entry(Bound::year(2000), Bound::year(2010)));

        assert!(index.covers(["1234-5678"], &Issuance::new("2004", "", ""), today()));
    }

    #[test]
    fn test_covers_record() {
        let mut index = CoverageIndex::new();
        index.insert(entry(Bound::year(2000), Bound::year(2010)));

        let record = Record {
            eissn: vec!["12345678".to_string()],
            raw_date: "2004-06-01".to_string(),
            volume: "3".to_string(),
            issue: "4".to_string(),
            ..Default::default()
        };
        assert!(index.covers_record(&record, today()));
    }
}
