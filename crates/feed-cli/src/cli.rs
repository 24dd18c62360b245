use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use feed::daemon::{Orientation, TickerSource, load_tickers};
use feed::{ColumnLetter, DaemonConfig, ExtendedSession, FeedError, TriggerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "feeds",
    version,
    about = "Multi-source quote tracking and estimate reconciliation"
)]
pub(crate) struct Cli {
    /// Log at debug level.
    #[arg(long, short, global = true, default_value_t = false)]
    pub(crate) verbose: bool,

    /// Log JSON lines instead of text.
    #[arg(long, global = true, default_value_t = false)]
    pub(crate) log_json: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Write quote cells into a tab, once or on an interval.
    Quotes(QuotesArgs),
    /// Print the merged EPS and revenue estimates for one ticker.
    Estimates {
        /// Ticker symbol.
        ticker: String,

        /// Seconds allowed for each source attempt.
        #[arg(long, default_value_t = 20)]
        timeout: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum OrientationArg {
    Vertical,
    Horizontal,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Vertical => Self::Vertical,
            OrientationArg::Horizontal => Self::Horizontal,
        }
    }
}

#[derive(Debug, Args)]
pub(crate) struct QuotesArgs {
    /// TOML daemon config. Flags below override it.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// SQLite file backing the tabular store.
    #[arg(long, default_value = "feeds.db")]
    pub(crate) store: PathBuf,

    /// Comma separated tickers or a file with one per line. Without it,
    /// tickers are read from --ticker-col.
    #[arg(long)]
    pub(crate) tickers: Option<String>,

    /// Tab to read and write.
    #[arg(long)]
    pub(crate) tab_name: Option<String>,

    /// First data row.
    #[arg(long)]
    pub(crate) row: Option<u32>,

    /// Extended hours price column.
    #[arg(long)]
    pub(crate) col: Option<ColumnLetter>,

    /// Ticker column.
    #[arg(long)]
    pub(crate) ticker_col: Option<ColumnLetter>,

    /// Previous close column.
    #[arg(long)]
    pub(crate) prev_close_col: Option<ColumnLetter>,

    /// Close price column.
    #[arg(long)]
    pub(crate) close_col: Option<ColumnLetter>,

    /// Market price column.
    #[arg(long)]
    pub(crate) market_price_col: Option<ColumnLetter>,

    /// Percent change since last close column.
    #[arg(long)]
    pub(crate) pct_change_col: Option<ColumnLetter>,

    /// Percent change against the regular price column.
    #[arg(long)]
    pub(crate) diff_col: Option<ColumnLetter>,

    /// Extended session to report: pre, post or both.
    #[arg(long)]
    pub(crate) price_type: Option<ExtendedSession>,

    /// Ticker layout.
    #[arg(long, value_enum)]
    pub(crate) orientation: Option<OrientationArg>,

    /// Write header labels above the first data row.
    #[arg(long, default_value_t = false)]
    pub(crate) include_headers: bool,

    /// Write the change next to the extended price.
    #[arg(long, default_value_t = false)]
    pub(crate) include_change: bool,

    /// Keep polling until interrupted.
    #[arg(long, default_value_t = false)]
    pub(crate) daemon: bool,

    /// Seconds between cycles in daemon mode.
    #[arg(long)]
    pub(crate) interval: Option<f64>,

    /// Command run when new tickers appear. Supports {date}, {tickers} and {tickers_file}.
    #[arg(long)]
    pub(crate) on_new_tickers_cmd: Option<String>,

    /// Directory for trigger command logs.
    #[arg(long)]
    pub(crate) trigger_log_dir: Option<PathBuf>,

    /// Seconds the in-flight cycle may take after a shutdown signal.
    #[arg(long, default_value_t = 30)]
    pub(crate) grace: u64,
}

impl QuotesArgs {
    /// Loads `--config` if given and applies the flags on top.
    pub(crate) fn daemon_config(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)?,
            None => {
                let extended = self.col.ok_or_else(|| {
                    FeedError::Configuration("--col is required without --config".to_string())
                })?;
                DaemonConfig::new(TickerSource::Store, extended)
            }
        };

        if let Some(tickers) = &self.tickers {
            config.tickers = TickerSource::List(load_tickers(tickers)?);
        }
        if let Some(tab) = &self.tab_name {
            config.tab.clone_from(tab);
        }
        if let Some(row) = self.row {
            config.start_row = row;
        }
        if let Some(session) = self.price_type {
            config.session = session;
        }
        if let Some(orientation) = self.orientation {
            config.orientation = orientation.into();
        }
        if let Some(interval) = self.interval {
            config.interval_secs = interval;
        }
        config.include_headers |= self.include_headers;
        config.include_change |= self.include_change;

        let columns = &mut config.columns;
        for (flag, target) in [
            (self.col, &mut columns.extended),
            (self.ticker_col, &mut columns.ticker),
            (self.prev_close_col, &mut columns.previous_close),
            (self.close_col, &mut columns.close),
            (self.market_price_col, &mut columns.market_price),
            (self.pct_change_col, &mut columns.pct_change),
            (self.diff_col, &mut columns.diff),
        ] {
            if flag.is_some() {
                *target = flag;
            }
        }

        if let Some(command) = &self.on_new_tickers_cmd {
            let mut trigger = config
                .trigger
                .take()
                .unwrap_or_else(|| TriggerConfig::new(command.as_str()));
            trigger.command.clone_from(command);
            config.trigger = Some(trigger);
        }
        if let (Some(dir), Some(trigger)) = (&self.trigger_log_dir, config.trigger.as_mut()) {
            trigger.log_dir.clone_from(dir);
        }

        config.validate().context("invalid quotes configuration")?;
        Ok(config)
    }
}
