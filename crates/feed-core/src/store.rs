//! Tabular store trait for cell-addressable persistence.
//!
//! This module defines the [`TabularStore`] trait the daemon reads tickers from
//! and writes quote cells to, together with the addressing types it uses.
//! Rows are 1-indexed and columns are spreadsheet letters (`A`, `B`, ..., `AA`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::str::FromStr;

use crate::error::{FeedError, Result};

/// A spreadsheet column letter, stored as a 0-based index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnLetter(u32);

impl ColumnLetter {
    /// Creates a column from a 0-based index (`0` is `A`).
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Parses a column letter such as `C` or `AB`.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] for anything but ASCII letters.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.len() > 3 || !s.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(FeedError::Configuration(format!(
                "invalid column letter {s:?}"
            )));
        }
        let n = s
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1));
        Ok(Self(n - 1))
    }

    /// Returns the 0-based index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.0
    }

    /// Returns the column `n` places to the right.
    #[must_use]
    pub const fn offset(&self, n: u32) -> Self {
        Self(self.0 + n)
    }
}

impl fmt::Display for ColumnLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut n = self.0 + 1;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(char::from(b'A' + rem as u8));
            n = (n - 1) / 26;
        }
        letters.iter().rev().try_for_each(|c| write!(f, "{c}"))
    }
}

impl FromStr for ColumnLetter {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ColumnLetter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ColumnLetter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Address of one cell: 1-indexed row plus column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    /// Row, starting at 1.
    pub row: u32,
    /// Column.
    pub column: ColumnLetter,
}

impl CellRef {
    /// Creates a cell reference.
    #[must_use]
    pub const fn new(row: u32, column: ColumnLetter) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.row)
    }
}

/// A value written to a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
    /// Blank cell.
    Empty,
}

impl CellValue {
    /// The marker written where a value is not available.
    pub const NOT_AVAILABLE: &'static str = "N/A";

    /// Returns the `N/A` marker.
    #[must_use]
    pub fn not_available() -> Self {
        Self::Text(Self::NOT_AVAILABLE.to_string())
    }

    /// Wraps an optional number, writing `N/A` when absent or not finite.
    #[must_use]
    pub fn number_or_na(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Self::Number(v),
            _ => Self::not_available(),
        }
    }

    /// Wraps an optional percentage rounded to two decimals, `N/A` when absent.
    #[must_use]
    pub fn percent_or_na(value: Option<f64>) -> Self {
        Self::number_or_na(value.map(|v| (v * 100.0).round() / 100.0))
    }

    /// Renders the value as stored text.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(v) => v.to_string(),
            Self::Text(s) => s.clone(),
            Self::Empty => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

/// One pending cell write.
#[derive(Clone, Debug, PartialEq)]
pub struct CellWrite {
    /// Target cell.
    pub cell: CellRef,
    /// Value to write.
    pub value: CellValue,
}

impl CellWrite {
    /// Creates a cell write.
    #[must_use]
    pub fn new(cell: CellRef, value: impl Into<CellValue>) -> Self {
        Self {
            cell,
            value: value.into(),
        }
    }
}

/// Cell-addressable spreadsheet-like storage.
///
/// Implementations report every backend failure as
/// [`FeedError::StoreUnreachable`].
#[async_trait]
pub trait TabularStore: Send + Sync + Debug {
    /// Creates the tab if it does not exist.
    async fn ensure_tab(&self, tab: &str) -> Result<()>;

    /// Reads a column from `start_row` down to the last non-empty cell.
    ///
    /// Blank cells inside that range are returned as empty strings so that
    /// positions map back to rows.
    async fn read_column(&self, tab: &str, column: ColumnLetter, start_row: u32) -> Result<Vec<String>>;

    /// Writes one cell.
    async fn write_cell(&self, tab: &str, cell: CellRef, value: CellValue) -> Result<()>;

    /// Writes a batch of cells.
    ///
    /// The default writes them one by one, in order.
    async fn write_cells(&self, tab: &str, writes: &[CellWrite]) -> Result<usize> {
        for write in writes {
            self.write_cell(tab, write.cell, write.value.clone()).await?;
        }
        Ok(writes.len())
    }

    /// Reads a header row as a mapping of header text to column.
    ///
    /// Blank header cells are omitted.
    async fn read_header_row(&self, tab: &str, row: u32) -> Result<HashMap<String, ColumnLetter>>;
}
