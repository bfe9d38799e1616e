//! Date utilities for coverage checks
//!
//! Record dates arrive with varying granularity ("2004", "2004-06",
//! "2004-06-01", sometimes with a time suffix). [`PartialDate`] keeps exactly
//! the precision that was given so comparisons against calendar boundaries
//! happen at the record's own granularity.
//!
//! [`Delay`] is a signed calendar offset used for moving walls, e.g. `-1Y`.

use chrono::{Datelike, Months, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Current UTC calendar date
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A date known to year, year-month or full-day precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartialDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl PartialDate {
    /// Parse the leading `YYYY[-MM[-DD]]` part of a raw date string.
    ///
    /// Returns `None` when no four digit year leads the string. Month and day
    /// are dropped (precision reduced) when they are out of range.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let year_part = raw.get(..4)?;
        if !year_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: i32 = year_part.parse().ok()?;

        let mut rest = raw[4..].split(['-', 'T', ' ']);
        // Empty leading segment from the separator after the year
        let _ = rest.next();

        let month = rest
            .next()
            .filter(|m| m.len() == 2)
            .and_then(|m| m.parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m));
        let day = month.and_then(|m| {
            rest.next()
                .filter(|d| d.len() == 2)
                .and_then(|d| d.parse::<u32>().ok())
                .filter(|d| NaiveDate::from_ymd_opt(year, m, *d).is_some())
        });

        Some(Self { year, month, day })
    }

    /// Compare with a calendar date, truncating the date to our precision.
    ///
    /// `2025` vs `2025-10-18` is `Equal`, `2025-11` vs `2025-10-18` is
    /// `Greater`.
    pub fn cmp_date(&self, date: NaiveDate) -> Ordering {
        self.year.cmp(&date.year()).then_with(|| match self.month {
            None => Ordering::Equal,
            Some(month) => month.cmp(&date.month()).then_with(|| match self.day {
                None => Ordering::Equal,
                Some(day) => day.cmp(&date.day()),
            }),
        })
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(month) = self.month {
            write!(f, "-{:02}", month)?;
            if let Some(day) = self.day {
                write!(f, "-{:02}", day)?;
            }
        }
        Ok(())
    }
}

/// Calendar unit of a [`Delay`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelayUnit {
    Day,
    Month,
    Year,
}

/// Signed calendar offset, e.g. `-1 year`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Delay {
    pub amount: i32,
    pub unit: DelayUnit,
}

impl Delay {
    pub fn new(amount: i32, unit: DelayUnit) -> Self {
        Self { amount, unit }
    }

    /// Resolve the offset against a reference date.
    ///
    /// Month arithmetic clamps to the end of shorter months
    /// (`2024-03-31 - 1M` is `2024-02-29`). Out of range results saturate to
    /// the reference date.
    pub fn apply(&self, reference: NaiveDate) -> NaiveDate {
        let magnitude = self.amount.unsigned_abs();
        let shifted = match self.unit {
            DelayUnit::Day => {
                reference.checked_add_signed(chrono::Duration::days(i64::from(self.amount)))
            }
            DelayUnit::Month | DelayUnit::Year => {
                let months = if self.unit == DelayUnit::Year {
                    magnitude.saturating_mul(12)
                } else {
                    magnitude
                };
                if self.amount < 0 {
                    reference.checked_sub_months(Months::new(months))
                } else {
                    reference.checked_add_months(Months::new(months))
                }
            }
        };
        shifted.unwrap_or(reference)
    }
}

impl FromStr for Delay {
    type Err = Error;

    /// Accepts `-1Y`, `-6M`, `-30D`, `-1 year`, `-2 years`, `+3 months`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid delay expression: {:?}", s));

        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (sign, body) = match compact.strip_prefix('-') {
            Some(body) => (-1, body),
            None => (1, compact.strip_prefix('+').unwrap_or(&compact)),
        };

        let digits_end = body
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        if digits_end == 0 {
            return Err(invalid());
        }
        let amount: i32 = body[..digits_end].parse().map_err(|_| invalid())?;

        let unit = match body[digits_end..].to_ascii_lowercase().as_str() {
            "d" | "day" | "days" => DelayUnit::Day,
            "m" | "month" | "months" => DelayUnit::Month,
            "y" | "year" | "years" => DelayUnit::Year,
            _ => return Err(invalid()),
        };

        Ok(Delay::new(sign * amount, unit))
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            DelayUnit::Day => 'D',
            DelayUnit::Month => 'M',
            DelayUnit::Year => 'Y',
        };
        write!(f, "{}{}", self.amount, unit)
    }
}
