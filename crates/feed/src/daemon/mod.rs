//! The price tracking daemon.
//!
//! Each cycle reads the tracked ticker set, fetches a quote per ticker through
//! the [`SourceRegistry`], writes the configured cells in one batch and, when
//! tickers appeared since the previous cycle, queues the trigger command once.
//!
//! Cycles never overlap. A ticker whose fetch fails gets `N/A` cells and the
//! cycle carries on; a store failure aborts the cycle, which is retried on the
//! next tick.

mod cells;
mod config;
mod trigger;

pub use config::{ColumnMap, DaemonConfig, Orientation, TickerSource, load_tickers};
pub use trigger::{DEFAULT_TRIGGER_TIMEOUT, TriggerConfig, TriggerRunner};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use feed_core::{FeedError, Quote, Result, Symbol, TabularStore};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::registry::{SourceRegistry, Sourced};
use cells::{Layout, TickerSlot};

/// What one cycle did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: u64,
    /// Tickers in this cycle's set.
    pub tickers: usize,
    /// Tickers written with a fresh quote.
    pub updated: usize,
    /// Tickers whose fetch failed and were written as `N/A`.
    pub skipped: usize,
    /// Tickers present now but absent from the previous cycle.
    pub new_tickers: Vec<Symbol>,
    /// Tickers present in the previous cycle but absent now.
    pub removed_tickers: Vec<Symbol>,
    /// Cells written, headers included.
    pub cells_written: usize,
    /// Whether the trigger command was queued.
    pub triggered: bool,
}

/// Polls the store, refreshes quote cells and reacts to new tickers.
///
/// Only one daemon may run against a given tab at a time; nothing here locks
/// the store against another instance.
#[derive(Debug)]
pub struct TrackerDaemon {
    config: DaemonConfig,
    registry: Arc<SourceRegistry>,
    store: Arc<dyn TabularStore>,
    trigger: Option<TriggerRunner>,
    previous: Option<BTreeSet<Symbol>>,
    cycle: u64,
    tab_ready: bool,
    headers_written: bool,
}

impl TrackerDaemon {
    /// Validates `config` and builds the daemon.
    ///
    /// A configured trigger starts its worker immediately, so this must be
    /// called from inside a Tokio runtime when a trigger is set.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if the config is invalid.
    pub fn new(config: DaemonConfig, registry: Arc<SourceRegistry>, store: Arc<dyn TabularStore>) -> Result<Self> {
        config.validate()?;
        let trigger = config.trigger.clone().map(TriggerRunner::spawn).transpose()?;
        Ok(Self {
            config,
            registry,
            store,
            trigger,
            previous: None,
            cycle: 0,
            tab_ready: false,
            headers_written: false,
        })
    }

    /// Seeds the previous ticker set, so the first cycle already reports
    /// tickers outside it as new.
    #[must_use]
    pub fn with_baseline(mut self, tickers: impl IntoIterator<Item = Symbol>) -> Self {
        self.previous = Some(tickers.into_iter().collect());
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Returns the number of cycles started so far.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Runs cycles on the configured interval until `shutdown` turns true or
    /// its sender is dropped, then stops the trigger worker.
    ///
    /// A failed cycle is logged and retried on the next tick. The in-flight
    /// cycle always finishes before shutdown is observed; callers that need a
    /// hard deadline wrap this future in a timeout.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.interval();
        info!(
            tab = %self.config.tab,
            interval = ?interval,
            session = ?self.config.session,
            "Starting daemon"
        );

        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticks.tick() => {}
            }
            if let Err(e) = self.run_once().await {
                error!(cycle = self.cycle, error = %e, "Cycle failed, retrying next interval");
            }
        }

        info!(cycles = self.cycle, "Stopping daemon");
        self.close().await;
    }

    /// Stops the trigger worker, dropping queued commands.
    pub async fn close(self) {
        if let Some(trigger) = self.trigger {
            trigger.shutdown().await;
        }
    }

    /// Runs one cycle.
    ///
    /// # Errors
    /// Returns [`FeedError::StoreUnreachable`] if the store cannot be read or
    /// written. Per-ticker failures are not errors.
    #[instrument(skip(self), fields(cycle = self.cycle + 1))]
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        let slots = self.read_tickers().await?;
        let current: BTreeSet<Symbol> = slots.iter().map(|s| s.symbol.clone()).collect();
        report.tickers = current.len();

        if let Some(previous) = &self.previous {
            report.new_tickers = current.difference(previous).cloned().collect();
            report.removed_tickers = previous.difference(&current).cloned().collect();
            if !report.new_tickers.is_empty() {
                info!(tickers = %join(&report.new_tickers), "New tickers detected");
            }
            if !report.removed_tickers.is_empty() {
                info!(tickers = %join(&report.removed_tickers), "Tickers removed");
            }
        } else {
            debug!(tickers = current.len(), "Recorded initial ticker set");
        }

        if slots.is_empty() {
            warn!("No tickers to update, skipping");
            self.previous = Some(current);
            return Ok(report);
        }

        let layout = Layout::new(&self.config);
        let mut writes = Vec::new();
        if self.config.include_headers && !self.headers_written {
            let existing = if self.config.start_row > 1 {
                self.store
                    .read_header_row(&self.config.tab, self.config.start_row - 1)
                    .await?
            } else {
                Default::default()
            };
            writes.extend(layout.header_writes(&existing));
        }

        let timeout = self.config.ticker_timeout();
        let fetches: Vec<_> = slots
            .iter()
            .map(|slot| fetch(&self.registry, &slot.symbol, timeout))
            .collect();
        let outcomes: Vec<Result<Sourced<Quote>>> = stream::iter(fetches)
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        for (slot, outcome) in slots.iter().zip(outcomes) {
            match outcome {
                Ok(sourced) => {
                    let quote = &sourced.value;
                    if quote.extended_hours_price(self.config.session).is_none() {
                        warn!(symbol = %slot.symbol, "No extended hours price, using regular market price");
                    }
                    info!(
                        symbol = %slot.symbol,
                        source = %sourced.source,
                        price = quote.market_price(self.config.session),
                        outcome = "updated",
                        "Updated quote"
                    );
                    writes.extend(layout.quote_writes(slot, Some(quote)));
                    report.updated += 1;
                }
                Err(e) => {
                    warn!(symbol = %slot.symbol, error = %e, outcome = "skipped", "Quote unavailable, writing N/A");
                    writes.extend(layout.quote_writes(slot, None));
                    report.skipped += 1;
                }
            }
        }

        report.cells_written = self.store.write_cells(&self.config.tab, &writes).await?;
        if self.config.include_headers {
            self.headers_written = true;
        }

        if !report.new_tickers.is_empty() {
            if let Some(trigger) = &self.trigger {
                trigger.submit(&report.new_tickers);
                report.triggered = true;
            }
        }
        self.previous = Some(current);

        info!(
            tickers = report.tickers,
            updated = report.updated,
            skipped = report.skipped,
            new = report.new_tickers.len(),
            cells = report.cells_written,
            "Cycle complete"
        );
        Ok(report)
    }

    async fn read_tickers(&mut self) -> Result<Vec<TickerSlot>> {
        match &self.config.tickers {
            TickerSource::List(list) => {
                if !self.tab_ready {
                    self.store.ensure_tab(&self.config.tab).await?;
                    self.tab_ready = true;
                }
                Ok(list
                    .iter()
                    .zip(0u32..)
                    .map(|(symbol, position)| TickerSlot {
                        symbol: symbol.clone(),
                        position,
                    })
                    .collect())
            }
            TickerSource::Store => {
                let column = self.config.columns.ticker.ok_or_else(|| {
                    FeedError::Configuration("reading tickers from the store requires a ticker column".to_string())
                })?;
                let cells = self
                    .store
                    .read_column(&self.config.tab, column, self.config.start_row)
                    .await?;
                Ok(cells
                    .iter()
                    .zip(0u32..)
                    .filter(|(cell, _)| !cell.trim().is_empty())
                    .map(|(cell, position)| TickerSlot {
                        symbol: Symbol::new(cell.as_str()),
                        position,
                    })
                    .collect())
            }
        }
    }
}

async fn fetch(registry: &SourceRegistry, symbol: &Symbol, timeout: Duration) -> Result<Sourced<Quote>> {
    tokio::time::timeout(timeout, registry.fetch_quote(symbol))
        .await
        .unwrap_or_else(|_| Err(FeedError::Other(format!("quote for {symbol} timed out after {timeout:?}"))))
}

fn join(tickers: &[Symbol]) -> String {
    tickers
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use feed_core::{
        Capability, CellRef, CellValue, ColumnLetter, MarketState, Source, SourceDescriptor, SourceId,
        SourceResult, SourceUnavailable, UnavailableKind,
    };
    use feed_store::InMemoryStore;

    #[derive(Debug)]
    struct Prices {
        id: SourceId,
    }

    #[async_trait]
    impl Source for Prices {
        fn id(&self) -> &SourceId {
            &self.id
        }

        fn description(&self) -> &str {
            "fixed prices"
        }

        async fn fetch_quote(&self, symbol: &Symbol) -> SourceResult<Quote> {
            if symbol.as_str() == "BAD" {
                return Err(SourceUnavailable::new("prices", UnavailableKind::NotFound, "unknown"));
            }
            Ok(Quote::new(symbol.clone(), 10.0, Utc::now())
                .with_previous_close(Some(8.0))
                .with_post_market_price(Some(11.0))
                .with_market_state(MarketState::Post))
        }
    }

    fn registry() -> Arc<SourceRegistry> {
        let mut registry = SourceRegistry::default();
        registry.register_ready(
            SourceDescriptor::new("prices", 10).with_capabilities(&[Capability::Prices]),
            Arc::new(Prices {
                id: SourceId::new("prices"),
            }),
        );
        Arc::new(registry)
    }

    fn col(s: &str) -> ColumnLetter {
        ColumnLetter::parse(s).unwrap()
    }

    fn cell(s: &str) -> CellRef {
        let split = s.find(|c: char| c.is_ascii_digit()).unwrap();
        CellRef::new(s[split..].parse().unwrap(), col(&s[..split]))
    }

    fn store_config() -> DaemonConfig {
        let mut config = DaemonConfig::new(TickerSource::Store, col("B"));
        config.columns.ticker = Some(col("A"));
        config
    }

    #[tokio::test]
    async fn test_blank_rows_keep_their_position() {
        let store = Arc::new(InMemoryStore::new());
        store.set_column("Sheet1", col("A"), 2, &["AAPL", "", "BAD"]).await;

        let mut daemon = TrackerDaemon::new(store_config(), registry(), store.clone()).unwrap();
        let report = daemon.run_once().await.unwrap();

        assert_eq!(report.tickers, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.new_tickers.is_empty());
        assert_eq!(store.cell("Sheet1", cell("B2")).await, Some(CellValue::Number(11.0)));
        assert_eq!(store.cell("Sheet1", cell("B3")).await, None);
        assert_eq!(store.cell("Sheet1", cell("B4")).await, Some(CellValue::not_available()));
    }

    #[tokio::test]
    async fn test_headers_written_once() {
        let store = Arc::new(InMemoryStore::new());
        let mut config = DaemonConfig::new(TickerSource::List(vec![Symbol::new("AAPL")]), col("C"));
        config.columns.ticker = Some(col("A"));
        config.include_headers = true;

        let mut daemon = TrackerDaemon::new(config, registry(), store.clone()).unwrap();
        let first = daemon.run_once().await.unwrap();
        assert_eq!(store.cell("Sheet1", cell("A1")).await, Some(CellValue::Text("Ticker".into())));
        assert_eq!(store.cell("Sheet1", cell("A2")).await, Some(CellValue::Text("AAPL".into())));
        assert_eq!(first.cells_written, 4);

        let second = daemon.run_once().await.unwrap();
        assert_eq!(second.cells_written, 2);
    }

    #[tokio::test]
    async fn test_empty_ticker_set_skips_cycle() {
        let store = Arc::new(InMemoryStore::new());
        store.set_column("Sheet1", col("A"), 2, &[]).await;
        let mut daemon = TrackerDaemon::new(store_config(), registry(), store.clone()).unwrap();
        let report = daemon.run_once().await.unwrap();
        assert_eq!(report.tickers, 0);
        assert_eq!(report.cells_written, 0);
    }

    #[tokio::test]
    async fn test_store_failure_fails_cycle() {
        let store = Arc::new(InMemoryStore::new());
        let mut daemon = TrackerDaemon::new(store_config(), registry(), store.clone()).unwrap();
        let err = daemon.run_once().await.unwrap_err();
        assert!(matches!(err, FeedError::StoreUnreachable(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        store.set_column("Sheet1", col("A"), 2, &["AAPL"]).await;
        let mut config = store_config();
        config.interval_secs = 0.05;

        let daemon = TrackerDaemon::new(config, registry(), store.clone()).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(rx));
        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.cell("Sheet1", cell("B2")).await, Some(CellValue::Number(11.0)));
    }
}
