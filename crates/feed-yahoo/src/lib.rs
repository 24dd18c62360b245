#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance sources.
//!
//! This crate provides two sources implementing the feed-core
//! [`Source`](feed_core::Source) trait:
//!
//! - [`YahooQuoteSource`] - Quotes with pre/post market prices and market state,
//!   plus reported earnings history
//! - [`YahooTrendSource`] - Forward EPS and revenue consensus
//!
//! # Example
//!
//! ```no_run
//! use feed_yahoo::YahooQuoteSource;
//! use feed_core::{ExtendedSession, Source, Symbol};
//!
//! # async fn example() -> feed_core::SourceResult<()> {
//! let source = YahooQuoteSource::new()?;
//! let quote = source.fetch_quote(&Symbol::new("AAPL")).await?;
//! println!("{:?}", quote.extended_hours_price(ExtendedSession::Both));
//! # Ok(())
//! # }
//! ```

mod client;
mod quote;
mod response;
mod trend;

pub use client::YahooClient;
pub use quote::{QUOTE_SOURCE_ID, YahooQuoteSource};
pub use trend::{TREND_SOURCE_ID, YahooTrendSource};
