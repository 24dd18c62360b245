#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Bar chart value extraction.
//!
//! - [`ChartScale`] - Axis bounds and height to value conversion
//! - [`ChartValueExtractor`] - Classifies bars by colour and produces estimate points
//! - [`ChartSource`] - [`Source`](feed_core::Source) backed by a rendering session
//!
//! # Example
//!
//! ```
//! use feed_chart::{Bar, BarBin, ChartScale, ChartValueExtractor, ColorMapping};
//! use feed_core::{PeriodKind, SourceId};
//!
//! let extractor = ChartValueExtractor::new(
//!     ColorMapping::new()
//!         .with("#3179F5", BarBin::Reported)
//!         .with("#EBEBEB", BarBin::Estimate),
//! );
//! let scale = ChartScale::new(0.0, 12.0).unwrap();
//! let bars = [Bar::new("Q3 '24", 50.0, "#3179F5")];
//! let points = extractor
//!     .extract(&scale, &bars, PeriodKind::Quarterly, &SourceId::new("chart"))
//!     .unwrap();
//! assert_eq!(points[0].reported, Some(6.0));
//! ```

mod extract;
mod scale;
mod session;
mod source;

pub use extract::{Bar, BarBin, ChartValueExtractor, ColorMapping, parse_bar_style};
pub use scale::{ChartScale, HEIGHT_TOLERANCE, parse_axis_label};
pub use session::{ChartSession, ChartView, FileChartSession, RenderedBar, RenderedChart};
pub use source::{CHART_SOURCE_ID, ChartSource};
