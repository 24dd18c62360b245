#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for estimate and quote feeds.
//!
//! This crate provides the foundational abstractions shared by every provider:
//!
//! - [`Source`](provider::Source) - Adapter trait implemented by every provider
//! - [`SourceDescriptor`](provider::SourceDescriptor) - Static capability and priority metadata
//! - [`EstimateSeries`](types::EstimateSeries) - Per-source or merged EPS/revenue series
//! - [`PeriodKey`](period::PeriodKey) - Chronological key parsed from period labels
//! - [`TabularStore`](store::TabularStore) - Cell-addressable storage abstraction

/// Error types for feed operations.
pub mod error;
/// Period labels, kinds and chronological keys.
pub mod period;
/// Provider adapter trait and source metadata.
pub mod provider;
/// Tabular store trait and cell addressing.
pub mod store;
/// Core data types (Symbol, Quote, EstimatePoint, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{FeedError, Result, SourceResult, SourceUnavailable, UnavailableKind};
pub use period::{Horizon, Metric, PeriodKey, PeriodKind};
pub use provider::{Capability, Source, SourceDescriptor, SourceId};
pub use store::{CellRef, CellValue, CellWrite, ColumnLetter, TabularStore};
pub use types::{EstimatePoint, EstimateSeries, ExtendedSession, MarketState, Quote, Symbol};
