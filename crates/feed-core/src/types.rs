//! Core data types for quotes and estimates.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`Quote`] - Live quote with regular and extended-hours prices
//! - [`MarketState`] - Session the market is in when a quote was taken
//! - [`ExtendedSession`] - Which extended-hours price a caller wants
//! - [`EstimatePoint`] - One period of reported and/or estimated values
//! - [`EstimateSeries`] - Ordered points for one symbol, metric and period kind

use chrono::{DateTime, Utc};
use polars::prelude::{Column, DataFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{
    error::{FeedError, Result},
    period::{Horizon, Metric, PeriodKey, PeriodKind},
    provider::SourceId,
};

/// A trading symbol/ticker.
///
/// Symbols are automatically trimmed and uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Market session at the time a quote was taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketState {
    /// Pre-market session.
    Pre,
    /// Regular trading session.
    Regular,
    /// After-hours session.
    Post,
    /// Market closed.
    Closed,
    /// The provider did not report a state.
    #[default]
    Unknown,
}

impl MarketState {
    /// Parses a provider market state string such as `REGULAR` or `POSTPOST`.
    #[must_use]
    pub fn from_provider(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRE" | "PREPRE" => Self::Pre,
            "REGULAR" => Self::Regular,
            "POST" | "POSTPOST" => Self::Post,
            "CLOSED" => Self::Closed,
            _ => Self::Unknown,
        }
    }

    /// Returns true once the regular session is over for the day.
    ///
    /// Today's close is only meaningful outside the pre-market and regular sessions.
    #[must_use]
    pub const fn regular_session_closed(&self) -> bool {
        !matches!(self, Self::Pre | Self::Regular)
    }
}

/// Which extended-hours price to report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtendedSession {
    /// Pre-market only.
    Pre,
    /// After-hours only.
    #[default]
    Post,
    /// After-hours if present, otherwise pre-market.
    Both,
}

impl FromStr for ExtendedSession {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            "both" => Ok(Self::Both),
            other => Err(FeedError::InvalidParameter(format!(
                "unknown price type {other:?}, expected pre, post or both"
            ))),
        }
    }
}

/// A live quote.
///
/// Quotes are recreated every poll cycle. Derived values (`market_price`,
/// both percentage changes) are computed for a requested [`ExtendedSession`].
/// Percentages are in percent units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol quoted.
    pub symbol: Symbol,
    /// Regular-session price (today's close once the session is over).
    pub price: f64,
    /// Previous trading day's close.
    pub previous_close: Option<f64>,
    /// Pre-market price, if trading.
    pub pre_market_price: Option<f64>,
    /// After-hours price, if trading.
    pub post_market_price: Option<f64>,
    /// Session at the time of the quote.
    pub market_state: MarketState,
    /// When the quote was taken.
    pub as_of: DateTime<Utc>,
}

impl Quote {
    /// Creates a quote with only a regular price.
    #[must_use]
    pub fn new(symbol: Symbol, price: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            previous_close: None,
            pre_market_price: None,
            post_market_price: None,
            market_state: MarketState::Unknown,
            as_of,
        }
    }

    /// Sets the previous close.
    #[must_use]
    pub const fn with_previous_close(mut self, previous_close: Option<f64>) -> Self {
        self.previous_close = previous_close;
        self
    }

    /// Sets the pre-market price.
    #[must_use]
    pub const fn with_pre_market_price(mut self, price: Option<f64>) -> Self {
        self.pre_market_price = price;
        self
    }

    /// Sets the after-hours price.
    #[must_use]
    pub const fn with_post_market_price(mut self, price: Option<f64>) -> Self {
        self.post_market_price = price;
        self
    }

    /// Sets the market state.
    #[must_use]
    pub const fn with_market_state(mut self, state: MarketState) -> Self {
        self.market_state = state;
        self
    }

    /// Returns the extended-hours price for `session`, if one was traded.
    #[must_use]
    pub fn extended_hours_price(&self, session: ExtendedSession) -> Option<f64> {
        match session {
            ExtendedSession::Pre => self.pre_market_price,
            ExtendedSession::Post => self.post_market_price,
            ExtendedSession::Both => self.post_market_price.or(self.pre_market_price),
        }
    }

    /// Returns the extended-hours price if present, else the regular price.
    #[must_use]
    pub fn market_price(&self, session: ExtendedSession) -> f64 {
        self.extended_hours_price(session).unwrap_or(self.price)
    }

    /// Today's close, available only once the regular session is over.
    #[must_use]
    pub fn close(&self) -> Option<f64> {
        self.market_state
            .regular_session_closed()
            .then_some(self.price)
    }

    /// Percentage change of the market price against the previous day's close.
    #[must_use]
    pub fn pct_change_since_close(&self, session: ExtendedSession) -> Option<f64> {
        pct_change(self.market_price(session), self.previous_close?)
    }

    /// Percentage change of the market price against today's regular price.
    #[must_use]
    pub fn pct_change_vs_regular(&self, session: ExtendedSession) -> Option<f64> {
        pct_change(self.market_price(session), self.price)
    }
}

fn pct_change(value: f64, base: f64) -> Option<f64> {
    if base == 0.0 || !base.is_finite() || !value.is_finite() {
        return None;
    }
    Some((value - base) / base * 100.0)
}

/// One period of an estimate series.
///
/// A forecast point never carries a reported value; constructors derive the
/// horizon from `reported` so that holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatePoint {
    /// Period label, e.g. `2024` or `Q3 '24`.
    pub period_label: String,
    /// Granularity of the period.
    pub period_kind: PeriodKind,
    /// Historical if reported, forecast otherwise.
    pub horizon: Horizon,
    /// Reported (actual) value.
    pub reported: Option<f64>,
    /// Analyst estimate.
    pub estimate: Option<f64>,
    /// Source that supplied the point.
    pub source_id: SourceId,
}

impl EstimatePoint {
    /// Creates a point, classifying the horizon from `reported`.
    #[must_use]
    pub fn new(
        period_label: impl Into<String>,
        period_kind: PeriodKind,
        reported: Option<f64>,
        estimate: Option<f64>,
        source_id: impl Into<SourceId>,
    ) -> Self {
        let horizon = if reported.is_some() {
            Horizon::Historical
        } else {
            Horizon::Forecast
        };
        Self {
            period_label: period_label.into(),
            period_kind,
            horizon,
            reported,
            estimate,
            source_id: source_id.into(),
        }
    }

    /// Creates a forecast point.
    #[must_use]
    pub fn forecast(
        period_label: impl Into<String>,
        period_kind: PeriodKind,
        estimate: f64,
        source_id: impl Into<SourceId>,
    ) -> Self {
        Self::new(period_label, period_kind, None, Some(estimate), source_id)
    }

    /// Parses the chronological key of this point.
    ///
    /// # Errors
    /// Returns [`FeedError::InvalidPeriodLabel`] for unsupported labels.
    pub fn key(&self) -> Result<PeriodKey> {
        PeriodKey::parse(&self.period_label, self.period_kind)
    }

    /// Returns the reported value, falling back to the estimate.
    #[must_use]
    pub fn value(&self) -> Option<f64> {
        self.reported.or(self.estimate)
    }

    /// Beat/miss in percent: `(reported - estimate) / |estimate| * 100`.
    #[must_use]
    pub fn surprise_pct(&self) -> Option<f64> {
        let (reported, estimate) = (self.reported?, self.estimate?);
        if estimate == 0.0 {
            return None;
        }
        Some((reported - estimate) / estimate.abs() * 100.0)
    }
}

/// Ordered estimate points for one symbol, metric and period kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateSeries {
    /// Symbol the series describes.
    pub symbol: Symbol,
    /// Metric carried by the series.
    pub metric: Metric,
    /// Granularity of every point.
    pub period_kind: PeriodKind,
    /// Points in chronological order.
    pub points: Vec<EstimatePoint>,
}

impl EstimateSeries {
    /// Creates an empty series.
    #[must_use]
    pub const fn new(symbol: Symbol, metric: Metric, period_kind: PeriodKind) -> Self {
        Self {
            symbol,
            metric,
            period_kind,
            points: Vec::new(),
        }
    }

    /// Sets the points.
    #[must_use]
    pub fn with_points(mut self, points: Vec<EstimatePoint>) -> Self {
        self.points = points;
        self
    }

    /// Appends a point.
    pub fn push(&mut self, point: EstimatePoint) {
        self.points.push(point);
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if there are no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns an iterator over the points.
    pub fn iter(&self) -> impl Iterator<Item = &EstimatePoint> {
        self.points.iter()
    }

    /// Finds the point for a period key.
    #[must_use]
    pub fn get(&self, key: PeriodKey) -> Option<&EstimatePoint> {
        self.points
            .iter()
            .find(|p| p.key().is_ok_and(|k| k == key))
    }

    /// Points with a reported value.
    pub fn historical(&self) -> impl Iterator<Item = &EstimatePoint> {
        self.points
            .iter()
            .filter(|p| p.horizon == Horizon::Historical)
    }

    /// Points with only an estimate.
    pub fn forecast(&self) -> impl Iterator<Item = &EstimatePoint> {
        self.points.iter().filter(|p| p.horizon == Horizon::Forecast)
    }

    /// Year-over-year change in percent for the period labelled `label`.
    ///
    /// Compares the reported-or-estimated value with the same period a year
    /// earlier. Returns `None` when either value is missing or the base is zero.
    #[must_use]
    pub fn yoy_pct(&self, label: &str) -> Option<f64> {
        let key = PeriodKey::parse(label, self.period_kind).ok()?;
        let current = self.get(key)?.value()?;
        let last_year = self.get(key.previous_year())?.value()?;
        if last_year == 0.0 {
            return None;
        }
        Some((current - last_year) / last_year.abs() * 100.0)
    }

    /// Converts the series into a DataFrame.
    ///
    /// Columns: period, horizon, reported, estimate, surprise_pct, source.
    ///
    /// # Errors
    /// Returns [`FeedError::Other`] if the frame cannot be assembled.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let periods: Vec<&str> = self.points.iter().map(|p| p.period_label.as_str()).collect();
        let horizons: Vec<&str> = self.points.iter().map(|p| p.horizon.as_str()).collect();
        let reported: Vec<Option<f64>> = self.points.iter().map(|p| p.reported).collect();
        let estimate: Vec<Option<f64>> = self.points.iter().map(|p| p.estimate).collect();
        let surprise: Vec<Option<f64>> = self.points.iter().map(EstimatePoint::surprise_pct).collect();
        let sources: Vec<&str> = self.points.iter().map(|p| p.source_id.as_str()).collect();

        DataFrame::new(vec![
            Column::new("period".into(), periods),
            Column::new("horizon".into(), horizons),
            Column::new("reported".into(), reported),
            Column::new("estimate".into(), estimate),
            Column::new("surprise_pct".into(), surprise),
            Column::new("source".into(), sources),
        ])
        .map_err(|e| FeedError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> Quote {
        Quote::new(Symbol::new("aapl"), 200.0, Utc::now())
            .with_previous_close(Some(190.0))
            .with_post_market_price(Some(210.0))
            .with_market_state(MarketState::from_provider("POST"))
    }

    #[test]
    fn test_symbol_normalization() {
        assert_eq!(Symbol::new(" nvda ").as_str(), "NVDA");
    }

    #[test]
    fn test_quote_percentages_are_distinct() {
        let q = quote();
        let since_close = q.pct_change_since_close(ExtendedSession::Post).unwrap();
        let vs_regular = q.pct_change_vs_regular(ExtendedSession::Post).unwrap();
        assert!((since_close - (210.0 - 190.0) / 190.0 * 100.0).abs() < 1e-9);
        assert!((vs_regular - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_quote_session_fallback() {
        let q = quote();
        assert_eq!(q.extended_hours_price(ExtendedSession::Pre), None);
        assert_eq!(q.market_price(ExtendedSession::Pre), 200.0);
        assert_eq!(q.market_price(ExtendedSession::Both), 210.0);
        assert_eq!(q.pct_change_vs_regular(ExtendedSession::Pre), Some(0.0));
    }

    #[test]
    fn test_close_only_after_regular_session() {
        let q = quote();
        assert_eq!(q.close(), Some(200.0));
        let live = q.with_market_state(MarketState::Regular);
        assert_eq!(live.close(), None);
    }

    #[test]
    fn test_zero_previous_close() {
        let q = quote().with_previous_close(Some(0.0));
        assert_eq!(q.pct_change_since_close(ExtendedSession::Post), None);
    }

    #[test]
    fn test_point_horizon_invariant() {
        let p = EstimatePoint::new("Q3'24", PeriodKind::Quarterly, None, Some(0.48), "b");
        assert_eq!(p.horizon, Horizon::Forecast);
        let p = EstimatePoint::new("Q3'24", PeriodKind::Quarterly, Some(0.62), Some(0.48), "a");
        assert_eq!(p.horizon, Horizon::Historical);
        let surprise = p.surprise_pct().unwrap();
        assert!((surprise - (0.62 - 0.48) / 0.48 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_yoy_and_frame() {
        let series = EstimateSeries::new(Symbol::new("MU"), Metric::Eps, PeriodKind::Annual)
            .with_points(vec![
                EstimatePoint::new("2023", PeriodKind::Annual, Some(2.0), None, "a"),
                EstimatePoint::forecast("2024", PeriodKind::Annual, 3.0, "a"),
            ]);
        assert_eq!(series.yoy_pct("2024"), Some(50.0));
        assert_eq!(series.yoy_pct("2023"), None);
        assert_eq!(series.historical().count(), 1);
        assert_eq!(series.forecast().count(), 1);

        let df = series.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 6);
    }
}
