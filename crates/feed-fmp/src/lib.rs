#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial Modeling Prep (FMP) source.
//!
//! This crate implements the feed-core [`Source`] trait for the
//! [Financial Modeling Prep](https://financialmodelingprep.com/) API.
//!
//! # Usage
//!
//! ```rust,ignore
//! use feed_fmp::FmpSource;
//! use feed_core::{Metric, PeriodKind, Source, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = FmpSource::new("your_api_key");
//!
//!     let symbol = Symbol::new("MU");
//!     let quote = source.fetch_quote(&symbol).await?;
//!     let eps = source
//!         .fetch_estimates(&symbol, Metric::Eps, PeriodKind::Quarterly)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use feed_core::{
    Capability, EstimatePoint, EstimateSeries, Metric, PeriodKey, PeriodKind, Quote, Source,
    SourceDescriptor, SourceId, SourceResult, SourceUnavailable, Symbol, UnavailableKind,
};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Base URL for the FMP stable API.
const FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";

/// Identifier of this source.
pub const SOURCE_ID: &str = "fmp";

/// Number of periods requested from estimate and statement endpoints.
const PERIOD_LIMIT: usize = 16;

/// Financial Modeling Prep source.
///
/// Provides:
/// - Regular-session quotes (no extended hours)
/// - EPS and revenue analyst estimates, annual and quarterly
/// - Reported EPS and revenue from income statements
#[derive(Clone)]
pub struct FmpSource {
    id: SourceId,
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for FmpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmpSource")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FmpSource {
    /// Create a new FMP source with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    /// Create a new FMP source with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(SOURCE_ID),
            client,
            api_key: api_key.into(),
            base_url: FMP_BASE_URL.to_string(),
        }
    }

    /// Point the source at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Default descriptor for this source.
    #[must_use]
    pub fn descriptor() -> SourceDescriptor {
        SourceDescriptor::new(SOURCE_ID, 10)
            .with_capabilities(&[
                Capability::Prices,
                Capability::EpsEstimates,
                Capability::RevenueEstimates,
            ])
            .requiring_credential()
    }

    /// Build a URL with the API key appended.
    fn url(&self, endpoint: &str) -> String {
        let sep = if endpoint.contains('?') { '&' } else { '?' };
        format!("{}/{endpoint}{sep}apikey={}", self.base_url, self.api_key)
    }

    fn unavailable(&self, kind: UnavailableKind, detail: impl Into<String>) -> SourceUnavailable {
        SourceUnavailable::new(&self.id, kind, detail)
    }

    /// Make a GET request and parse the JSON response.
    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> SourceResult<T> {
        debug!("FMP request: {}", endpoint);

        let response = self.client.get(self.url(endpoint)).send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                UnavailableKind::Timeout
            } else {
                UnavailableKind::Network
            };
            self.unavailable(kind, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.unavailable(
                UnavailableKind::from_http_status(status.as_u16()),
                format!("HTTP {status}: {}", snippet(&text)),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.unavailable(UnavailableKind::Network, e.to_string()))?;

        // FMP reports some failures in a 200 body
        if text.contains("\"Error Message\"") {
            let kind = if text.to_ascii_lowercase().contains("api key") {
                UnavailableKind::Auth
            } else {
                UnavailableKind::Network
            };
            return Err(self.unavailable(kind, snippet(&text)));
        }

        serde_json::from_str(&text)
            .map_err(|e| self.unavailable(UnavailableKind::Parse, format!("{e}: {}", snippet(&text))))
    }

    /// Fetch analyst estimates from FMP API.
    async fn fetch_analyst_estimates(
        &self,
        symbol: &Symbol,
        period_kind: PeriodKind,
    ) -> SourceResult<Vec<FmpAnalystEstimate>> {
        let endpoint = format!(
            "analyst-estimates?symbol={}&period={}&limit={PERIOD_LIMIT}",
            symbol.as_str(),
            period_param(period_kind)
        );
        self.get(&endpoint).await
    }

    /// Fetch income statements from FMP API.
    async fn fetch_income_statements(
        &self,
        symbol: &Symbol,
        period_kind: PeriodKind,
    ) -> SourceResult<Vec<FmpIncomeStatement>> {
        let endpoint = format!(
            "income-statement?symbol={}&period={}&limit={PERIOD_LIMIT}",
            symbol.as_str(),
            period_param(period_kind)
        );
        self.get(&endpoint).await
    }
}

const fn period_param(period_kind: PeriodKind) -> &'static str {
    match period_kind {
        PeriodKind::Annual => "annual",
        PeriodKind::Quarterly => "quarter",
    }
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

#[async_trait]
impl Source for FmpSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        "Financial Modeling Prep - Quotes, analyst estimates and income statements"
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> SourceResult<Quote> {
        let endpoint = format!("quote?symbol={}", symbol.as_str());
        let quotes: Vec<FmpQuote> = self.get(&endpoint).await?;
        let quote = quotes
            .into_iter()
            .next()
            .ok_or_else(|| self.unavailable(UnavailableKind::NotFound, format!("no quote for {symbol}")))?;
        Ok(quote.into_quote(symbol))
    }

    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        let (estimates, statements) = tokio::join!(
            self.fetch_analyst_estimates(symbol, period_kind),
            self.fetch_income_statements(symbol, period_kind),
        );

        let (estimates, statements) = match (estimates, statements) {
            (Err(e), Err(_)) => return Err(e),
            (estimates, statements) => (
                estimates.unwrap_or_else(|e| {
                    debug!(error = %e, "FMP analyst estimates unavailable");
                    Vec::new()
                }),
                statements.unwrap_or_else(|e| {
                    debug!(error = %e, "FMP income statements unavailable");
                    Vec::new()
                }),
            ),
        };

        let series = build_series(symbol, metric, period_kind, &estimates, &statements);
        if series.is_empty() {
            return Err(SourceUnavailable::empty(
                &self.id,
                format!("no {metric} {period_kind} data for {symbol}"),
            ));
        }
        Ok(series)
    }
}

/// Joins estimates and reported values on the calendar period of their date.
fn build_series(
    symbol: &Symbol,
    metric: Metric,
    period_kind: PeriodKind,
    estimates: &[FmpAnalystEstimate],
    statements: &[FmpIncomeStatement],
) -> EstimateSeries {
    let mut periods: BTreeMap<PeriodKey, (Option<f64>, Option<f64>)> = BTreeMap::new();

    for statement in statements {
        let Some(key) = period_key(&statement.date, period_kind) else {
            continue;
        };
        let slot = periods.entry(key).or_default();
        if slot.0.is_none() {
            slot.0 = statement.value(metric);
        }
    }

    for estimate in estimates {
        let Some(key) = period_key(&estimate.date, period_kind) else {
            continue;
        };
        let slot = periods.entry(key).or_default();
        if slot.1.is_none() {
            slot.1 = estimate.value(metric);
        }
    }

    let points = periods
        .into_iter()
        .filter(|(_, (reported, estimate))| reported.is_some() || estimate.is_some())
        .map(|(key, (reported, estimate))| {
            EstimatePoint::new(key.label(), period_kind, reported, estimate, SOURCE_ID)
        })
        .collect();

    EstimateSeries::new(symbol.clone(), metric, period_kind).with_points(points)
}

fn period_key(date: &str, period_kind: PeriodKind) -> Option<PeriodKey> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|d| PeriodKey::from_date(d, period_kind))
}

// ============================================================================
// FMP API Response Types
// ============================================================================

/// FMP analyst estimate response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpAnalystEstimate {
    date: String,
    #[serde(default, alias = "estimatedEpsAvg")]
    eps_avg: Option<f64>,
    #[serde(default, alias = "estimatedRevenueAvg")]
    revenue_avg: Option<f64>,
}

impl FmpAnalystEstimate {
    const fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Eps => self.eps_avg,
            Metric::Revenue => self.revenue_avg,
        }
    }
}

/// FMP income statement response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpIncomeStatement {
    date: String,
    #[serde(default)]
    revenue: Option<f64>,
    #[serde(default)]
    eps: Option<f64>,
    #[serde(default)]
    eps_diluted: Option<f64>,
}

impl FmpIncomeStatement {
    fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Eps => self.eps_diluted.or(self.eps),
            Metric::Revenue => self.revenue,
        }
    }
}

/// FMP quote response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    price: f64,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl FmpQuote {
    fn into_quote(self, symbol: &Symbol) -> Quote {
        let as_of = self
            .timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);
        Quote::new(symbol.clone(), self.price, as_of).with_previous_close(self.previous_close)
    }
}
