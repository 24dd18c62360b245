//! Period labels, kinds and chronological keys.
//!
//! This module defines [`PeriodKind`] (annual or quarterly series), [`Horizon`]
//! (historical or forecast), [`Metric`] (EPS or revenue) and [`PeriodKey`], the
//! sortable key parsed from a period label.
//!
//! Two label formats are supported and nothing else:
//!
//! - annual: four digit year, e.g. `2024`
//! - quarterly: `Q<1-4>'<yy>` with optional whitespace before the apostrophe,
//!   e.g. `Q3'24` or `Q3 '24`. Two digit years below 70 map to 20xx, the rest to 19xx.
//!
//! Any other label is rejected with [`FeedError::InvalidPeriodLabel`] rather
//! than guessed at.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};

/// Granularity of an estimate series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    /// Fiscal or calendar years.
    #[default]
    Annual,
    /// Quarters.
    Quarterly,
}

impl PeriodKind {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a period has been reported yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Horizon {
    /// A reported value exists for the period.
    Historical,
    /// Only analyst estimates exist for the period.
    Forecast,
}

impl Horizon {
    /// Returns the lowercase name of this horizon.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Historical => "historical",
            Self::Forecast => "forecast",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric carried by an estimate series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Earnings per share.
    Eps,
    /// Total revenue.
    Revenue,
}

impl Metric {
    /// Returns the lowercase name of this metric.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eps => "eps",
            Self::Revenue => "revenue",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chronological key of a period.
///
/// Keys order by year, then quarter. Annual keys have no quarter; annual and
/// quarterly keys never share a series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    year: i32,
    quarter: Option<u8>,
}

impl PeriodKey {
    /// Creates an annual key.
    #[must_use]
    pub const fn annual(year: i32) -> Self {
        Self {
            year,
            quarter: None,
        }
    }

    /// Creates a quarterly key.
    ///
    /// # Errors
    /// Returns [`FeedError::InvalidParameter`] if `quarter` is not in `1..=4`.
    pub fn quarterly(year: i32, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(FeedError::InvalidParameter(format!(
                "quarter must be 1-4, got {quarter}"
            )));
        }
        Ok(Self {
            year,
            quarter: Some(quarter),
        })
    }

    /// Derives the calendar period containing `date`.
    #[must_use]
    pub fn from_date(date: NaiveDate, kind: PeriodKind) -> Self {
        match kind {
            PeriodKind::Annual => Self::annual(date.year()),
            PeriodKind::Quarterly => Self {
                year: date.year(),
                quarter: Some(((date.month() - 1) / 3 + 1) as u8),
            },
        }
    }

    /// Parses a period label of the given kind.
    ///
    /// # Errors
    /// Returns [`FeedError::InvalidPeriodLabel`] for any unsupported format.
    pub fn parse(label: &str, kind: PeriodKind) -> Result<Self> {
        let parsed = match kind {
            PeriodKind::Annual => parse_annual(label.trim()),
            PeriodKind::Quarterly => parse_quarterly(label.trim()),
        };
        parsed.ok_or_else(|| FeedError::InvalidPeriodLabel(label.to_string()))
    }

    /// Returns the year of this period.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Returns the quarter (1-4) for quarterly keys.
    #[must_use]
    pub const fn quarter(&self) -> Option<u8> {
        self.quarter
    }

    /// Returns the kind this key belongs to.
    #[must_use]
    pub const fn kind(&self) -> PeriodKind {
        match self.quarter {
            Some(_) => PeriodKind::Quarterly,
            None => PeriodKind::Annual,
        }
    }

    /// Returns the same period one year earlier.
    #[must_use]
    pub const fn previous_year(&self) -> Self {
        Self {
            year: self.year - 1,
            quarter: self.quarter,
        }
    }

    /// Formats the canonical label, `2024` or `Q3 '24`.
    #[must_use]
    pub fn label(&self) -> String {
        match self.quarter {
            Some(q) => format!("Q{q} '{:02}", self.year.rem_euclid(100)),
            None => self.year.to_string(),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn parse_annual(s: &str) -> Option<PeriodKey> {
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().map(PeriodKey::annual);
    }
    None
}

fn parse_quarterly(s: &str) -> Option<PeriodKey> {
    let rest = s.strip_prefix('Q')?;
    let mut chars = rest.chars();
    let quarter = chars.next()?.to_digit(10)?;
    if !(1..=4).contains(&quarter) {
        return None;
    }
    let rest = chars.as_str().trim_start();
    let rest = rest
        .strip_prefix('\'')
        .or_else(|| rest.strip_prefix('\u{2019}'))?;
    if rest.len() != 2 || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = rest.parse().ok()?;
    let year = if yy < 70 { 2000 + yy } else { 1900 + yy };
    Some(PeriodKey {
        year,
        quarter: Some(quarter as u8),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quarter_labels() {
        let a = PeriodKey::parse("Q3'24", PeriodKind::Quarterly).unwrap();
        let b = PeriodKey::parse("Q3 '24", PeriodKind::Quarterly).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.year(), 2024);
        assert_eq!(a.quarter(), Some(3));
    }

    #[test]
    fn test_two_digit_year_pivot() {
        let k = PeriodKey::parse("Q1 '69", PeriodKind::Quarterly).unwrap();
        assert_eq!(k.year(), 2069);
        let k = PeriodKey::parse("Q1 '70", PeriodKind::Quarterly).unwrap();
        assert_eq!(k.year(), 1970);
    }

    #[test]
    fn test_rejects_unsupported_labels() {
        for label in ["2024Q3", "Q5'24", "Q3 2024", "FY24", "Q3'2024", ""] {
            assert!(
                matches!(
                    PeriodKey::parse(label, PeriodKind::Quarterly),
                    Err(FeedError::InvalidPeriodLabel(_))
                ),
                "{label} should be rejected"
            );
        }
        assert!(PeriodKey::parse("24", PeriodKind::Annual).is_err());
        assert!(PeriodKey::parse("Q3'24", PeriodKind::Annual).is_err());
    }

    #[test]
    fn test_ordering() {
        let q3_24 = PeriodKey::parse("Q3'24", PeriodKind::Quarterly).unwrap();
        let q2_26 = PeriodKey::parse("Q2'26", PeriodKind::Quarterly).unwrap();
        let q4_24 = PeriodKey::parse("Q4 '24", PeriodKind::Quarterly).unwrap();
        assert!(q3_24 < q4_24);
        assert!(q4_24 < q2_26);
        assert!(PeriodKey::annual(2023) < PeriodKey::annual(2024));
    }

    #[test]
    fn test_from_date_and_label() {
        let d = NaiveDate::from_ymd_opt(2024, 9, 30).unwrap();
        let key = PeriodKey::from_date(d, PeriodKind::Quarterly);
        assert_eq!(key.label(), "Q3 '24");
        assert_eq!(PeriodKey::parse(&key.label(), PeriodKind::Quarterly).unwrap(), key);
        assert_eq!(PeriodKey::from_date(d, PeriodKind::Annual).label(), "2024");
    }

    #[test]
    fn test_previous_year() {
        let key = PeriodKey::quarterly(2025, 2).unwrap();
        assert_eq!(key.previous_year(), PeriodKey::quarterly(2024, 2).unwrap());
    }
}
