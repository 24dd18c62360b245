//! Daemon configuration, validated once at startup.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use feed_core::{ColumnLetter, ExtendedSession, FeedError, Result, Symbol};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::trigger::TriggerConfig;

/// How tickers are laid out in the tab.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// One ticker per row.
    #[default]
    Vertical,
    /// One ticker per column, all on the start row.
    Horizontal,
}

/// Where the tracked ticker set comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickerSource {
    /// Re-read the ticker column from the store every cycle.
    Store,
    /// A fixed list given at startup.
    List(Vec<Symbol>),
}

/// Target columns. Only `extended` is required.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    /// Ticker symbols. Read from when tickers come from the store, written
    /// to when they come from a list.
    pub ticker: Option<ColumnLetter>,
    /// Extended hours price, falling back to the regular price.
    pub extended: Option<ColumnLetter>,
    /// Today's regular close, `N/A` while the regular or pre session runs.
    pub close: Option<ColumnLetter>,
    /// Previous day's close.
    pub previous_close: Option<ColumnLetter>,
    /// Percent change of the extended price against the regular price.
    pub diff: Option<ColumnLetter>,
    /// Current market price, extended if available.
    pub market_price: Option<ColumnLetter>,
    /// Percent change of the market price against the previous close.
    pub pct_change: Option<ColumnLetter>,
}

fn default_tab() -> String {
    "Sheet1".to_string()
}

const fn default_start_row() -> u32 {
    2
}

/// Accepted interval and ticker timeout, in seconds.
const SECONDS_RANGE: RangeInclusive<f64> = 0.01..=86_400.0;

const fn default_interval_secs() -> f64 {
    5.0
}

const fn default_max_concurrency() -> usize {
    8
}

const fn default_ticker_timeout_secs() -> f64 {
    15.0
}

/// Everything the daemon needs, fixed for its lifetime.
///
/// ```toml
/// tab = "Prices"
/// start_row = 2
/// tickers = "store"
/// session = "both"
/// interval_secs = 10
///
/// [columns]
/// ticker = "A"
/// extended = "D"
/// pct_change = "G"
///
/// [trigger]
/// command = "./earnings.sh --tickers-file {tickers_file} --date {date}"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Tab to read from and write to.
    #[serde(default = "default_tab")]
    pub tab: String,
    /// First data row (1-based).
    #[serde(default = "default_start_row")]
    pub start_row: u32,
    /// Row or column layout.
    #[serde(default)]
    pub orientation: Orientation,
    /// Target columns.
    #[serde(default)]
    pub columns: ColumnMap,
    /// Where tickers come from.
    pub tickers: TickerSource,
    /// Which extended session price to report.
    #[serde(default)]
    pub session: ExtendedSession,
    /// Write header labels in the row above `start_row` on the first cycle.
    #[serde(default)]
    pub include_headers: bool,
    /// Write the change against the regular price next to the extended price.
    #[serde(default)]
    pub include_change: bool,
    /// Seconds between cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    /// Upper bound on concurrent quote fetches within a cycle.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Seconds allowed for one ticker's fetch.
    #[serde(default = "default_ticker_timeout_secs")]
    pub ticker_timeout_secs: f64,
    /// Command to run when new tickers appear.
    #[serde(default)]
    pub trigger: Option<TriggerConfig>,
}

impl DaemonConfig {
    /// Creates a config with defaults for everything but the ticker source
    /// and the extended price column.
    #[must_use]
    pub fn new(tickers: TickerSource, extended: ColumnLetter) -> Self {
        Self {
            tab: default_tab(),
            start_row: default_start_row(),
            orientation: Orientation::default(),
            columns: ColumnMap {
                extended: Some(extended),
                ..ColumnMap::default()
            },
            tickers,
            session: ExtendedSession::default(),
            include_headers: false,
            include_change: false,
            interval_secs: default_interval_secs(),
            max_concurrency: default_max_concurrency(),
            ticker_timeout_secs: default_ticker_timeout_secs(),
            trigger: None,
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if the document does not parse.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedError::Configuration(e.to_string()))
    }

    /// Reads a TOML file.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks the config once before the daemon starts.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] for a missing extended price
    /// column, a store ticker source without a ticker column, an empty ticker
    /// list, or out of range numbers.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(FeedError::Configuration(msg.to_string()));

        if self.tab.trim().is_empty() {
            return fail("tab name is empty");
        }
        if self.columns.extended.is_none() {
            return fail("extended price column is required");
        }
        match &self.tickers {
            TickerSource::Store if self.columns.ticker.is_none() => {
                return fail("reading tickers from the store requires a ticker column");
            }
            TickerSource::List(list) if list.is_empty() => return fail("ticker list is empty"),
            _ => {}
        }
        if self.start_row == 0 {
            return fail("start row is 1-based");
        }
        if !SECONDS_RANGE.contains(&self.interval_secs) {
            return fail("interval must be between 0.01 and 86400 seconds");
        }
        if !SECONDS_RANGE.contains(&self.ticker_timeout_secs) {
            return fail("ticker timeout must be between 0.01 and 86400 seconds");
        }
        if self.max_concurrency == 0 {
            return fail("max concurrency must be at least 1");
        }
        if let Some(trigger) = &self.trigger {
            trigger.validate()?;
        }
        Ok(())
    }

    /// Time between cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    /// Time allowed for one ticker's fetch.
    #[must_use]
    pub fn ticker_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ticker_timeout_secs)
    }

    /// The ticker column, when the daemon should write symbols into it.
    #[must_use]
    pub fn writable_ticker_column(&self) -> Option<ColumnLetter> {
        match self.tickers {
            TickerSource::List(_) => self.columns.ticker,
            TickerSource::Store => None,
        }
    }
}

/// Loads tickers from a file path or a comma separated list.
///
/// If `source` names an existing file, each non-blank line is a ticker.
/// Otherwise `source` is split on commas. Tickers are trimmed and upper-cased;
/// blanks are dropped.
///
/// # Errors
/// Returns [`FeedError::Configuration`] if the file exists but cannot be read.
pub fn load_tickers(source: &str) -> Result<Vec<Symbol>> {
    let path = PathBuf::from(source);
    if path.is_file() {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| FeedError::Configuration(format!("{}: {e}", path.display())))?;
        let tickers = parse_list(text.lines());
        info!(count = tickers.len(), path = %path.display(), "Loaded tickers from file");
        return Ok(tickers);
    }
    let tickers = parse_list(source.split(','));
    info!(count = tickers.len(), "Parsed tickers from input");
    Ok(tickers)
}

fn parse_list<'a>(items: impl Iterator<Item = &'a str>) -> Vec<Symbol> {
    items
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Symbol::new)
        .collect()
}
