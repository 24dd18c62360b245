#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Multi-source estimate reconciliation and price tracking.
//!
//! This crate re-exports the core types, the store backends and every
//! compiled-in provider, and adds the pieces that tie them together.
//!
//! # Features
//!
//! - `fmp` - Financial Modeling Prep quotes and estimates
//! - `finnhub` - Finnhub quotes and estimates
//! - `yahoo` - Yahoo quotes (with pre/post market) and earnings trend
//! - `chart` - Estimates read off rendered bar charts
//!
//! # Example
//!
//! ```rust,ignore
//! use feed::{EstimateRecord, RegistryConfig, Settings, SourceRegistry, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> feed::Result<()> {
//!     let registry = SourceRegistry::from_settings(&Settings::from_env(), RegistryConfig::default());
//!
//!     let quote = registry.fetch_quote(&Symbol::new("AAPL")).await?;
//!     println!("{} via {}", quote.value.price, quote.source);
//!
//!     let record = EstimateRecord::build(&registry, &Symbol::new("MU")).await?;
//!     println!("{}", record.eps_quarterly.to_frame()?);
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use feed_core::*;

// Store backends
pub use feed_store::{InMemoryStore, SqliteStore};

// Providers
#[cfg(feature = "chart")]
pub use feed_chart::{ChartScale, ChartSource, ChartValueExtractor, ColorMapping, FileChartSession};
#[cfg(feature = "finnhub")]
pub use feed_finnhub::FinnhubSource;
#[cfg(feature = "fmp")]
pub use feed_fmp::FmpSource;
#[cfg(feature = "yahoo")]
pub use feed_yahoo::{YahooQuoteSource, YahooTrendSource};

pub mod daemon;
mod merge;
mod record;
mod registry;
mod settings;

pub use daemon::{CycleReport, DaemonConfig, TrackerDaemon, TriggerConfig};
pub use merge::{EstimateMerger, MergeOutcome, MergeWarning};
pub use record::{EstimateRecord, VIEWS};
pub use registry::{DEFAULT_ATTEMPT_TIMEOUT, RegistryConfig, SourceFactory, SourceRegistry, Sourced, factory};
pub use settings::{CHART_DIR, FINNHUB_API_KEY, FMP_API_KEY, Settings, default_price_policy};
