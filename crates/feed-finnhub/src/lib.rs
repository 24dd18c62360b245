#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/feeds/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Finnhub source.
//!
//! Implements the feed-core [`Source`] trait on top of the
//! [Finnhub REST API](https://finnhub.io/docs/api).

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

/// Base URL for the Finnhub v1 API.
const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Identifier of this source.
pub const SOURCE_ID: &str = "finnhub";

/// Finnhub source.
#[derive(Clone)]
pub struct FinnhubSource {
    id: SourceId,
    client: Client,
    token: String,
    base_url: String,
}

impl fmt::Debug for FinnhubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinnhubSource")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl FinnhubSource {
    /// Create a new Finnhub source with the given API token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_client(Client::new(), token)
    }

    /// Create a new Finnhub source with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, token: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(SOURCE_ID),
            client,
            token: token.into(),
            base_url: FINNHUB_BASE_URL.to_string(),
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
        SourceDescriptor::new(SOURCE_ID, 20)
            .with_capabilities(&[
                Capability::Prices,
                Capability::EpsEstimates,
                Capability::RevenueEstimates,
            ])
            .requiring_credential()
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> SourceResult<T> {
        debug!(path, "Finnhub request");

        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    UnavailableKind::Timeout
                } else {
                    UnavailableKind::Network
                };
                SourceUnavailable::new(&self.id, kind, e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceUnavailable::new(
                &self.id,
                UnavailableKind::from_http_status(status.as_u16()),
                format!("HTTP {status} from {path}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| SourceUnavailable::new(&self.id, UnavailableKind::Parse, e.to_string()))
    }

    async fn estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<Vec<FinnhubEstimate>> {
        let path = match metric {
            Metric::Eps => "stock/eps-estimate",
            Metric::Revenue => "stock/revenue-estimate",
        };
        let freq = match period_kind {
            PeriodKind::Annual => "annual",
            PeriodKind::Quarterly => "quarterly",
        };
        let payload: FinnhubEstimates = self
            .get(path, &[("symbol", symbol.as_str()), ("freq", freq)])
            .await?;
        Ok(payload.data)
    }

    async fn earnings(&self, symbol: &Symbol) -> SourceResult<Vec<FinnhubEarnings>> {
        self.get("stock/earnings", &[("symbol", symbol.as_str())]).await
    }
}

#[async_trait]
impl Source for FinnhubSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        "Finnhub - Quotes, EPS and revenue estimates"
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> SourceResult<Quote> {
        let quote: FinnhubQuote = self.get("quote", &[("symbol", symbol.as_str())]).await?;
        quote.into_quote(symbol).ok_or_else(|| {
            SourceUnavailable::new(&self.id, UnavailableKind::NotFound, format!("no quote for {symbol}"))
        })
    }

    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        let estimates = self.estimates(symbol, metric, period_kind).await?;

        // Reported values exist only for quarterly EPS
        let earnings = if metric == Metric::Eps && period_kind == PeriodKind::Quarterly {
            self.earnings(symbol).await.unwrap_or_else(|e| {
                debug!(error = %e, "Finnhub earnings unavailable");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let series = build_series(symbol, metric, period_kind, &estimates, &earnings);
        if series.is_empty() {
            return Err(SourceUnavailable::empty(
                &self.id,
                format!("no {metric} {period_kind} estimates for {symbol}"),
            ));
        }
        Ok(series)
    }
}

fn build_series(
    symbol: &Symbol,
    metric: Metric,
    period_kind: PeriodKind,
    estimates: &[FinnhubEstimate],
    earnings: &[FinnhubEarnings],
) -> EstimateSeries {
    let mut periods: BTreeMap<PeriodKey, (Option<f64>, Option<f64>)> = BTreeMap::new();

    for e in estimates {
        if let Some(key) = period_key(&e.period, period_kind) {
            let value = match metric {
                Metric::Eps => e.eps_avg,
                Metric::Revenue => e.revenue_avg,
            };
            let slot = periods.entry(key).or_default();
            slot.1 = slot.1.or(value);
        }
    }

    // Earnings rows carry the consensus at report time, which wins over a
    // later revision for a reported quarter.
    for e in earnings {
        if let Some(key) = period_key(&e.period, period_kind) {
            let slot = periods.entry(key).or_default();
            slot.0 = slot.0.or(e.actual);
            if e.actual.is_some() && e.estimate.is_some() {
                slot.1 = e.estimate;
            }
        }
    }

    let points = periods
        .into_iter()
        .filter(|(_, (r, e))| r.is_some() || e.is_some())
        .map(|(key, (reported, estimate))| {
            EstimatePoint::new(key.label(), period_kind, reported, estimate, SOURCE_ID)
        })
        .collect();

    EstimateSeries::new(symbol.clone(), metric, period_kind).with_points(points)
}

fn period_key(period: &str, period_kind: PeriodKind) -> Option<PeriodKey> {
    let date = NaiveDate::parse_from_str(period, "%Y-%m-%d").ok()?;
    Some(PeriodKey::from_date(date, period_kind))
}

#[derive(Debug, Deserialize)]
struct FinnhubEstimates {
    #[serde(default)]
    data: Vec<FinnhubEstimate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinnhubEstimate {
    period: String,
    #[serde(default)]
    eps_avg: Option<f64>,
    #[serde(default)]
    revenue_avg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinnhubEarnings {
    period: String,
    #[serde(default)]
    actual: Option<f64>,
    #[serde(default)]
    estimate: Option<f64>,
}

/// Finnhub quote payload: current price, previous close, unix timestamp.
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(default)]
    c: f64,
    #[serde(default)]
    pc: Option<f64>,
    #[serde(default)]
    t: Option<i64>,
}

impl FinnhubQuote {
    /// Unknown symbols come back as all zeroes.
    fn into_quote(self, symbol: &Symbol) -> Option<Quote> {
        if self.c == 0.0 {
            return None;
        }
        let as_of = self
            .t
            .filter(|t| *t > 0)
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or_else(Utc::now);
        Some(
            Quote::new(symbol.clone(), self.c, as_of)
                .with_previous_close(self.pc.filter(|pc| *pc != 0.0)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::Horizon;

    #[test]
    fn test_debug_redacts_token() {
        let source = FinnhubSource::new("secret_token");
        let debug_str = format!("{source:?}");
        assert!(!debug_str.contains("secret_token"));
    }

    #[test]
    fn test_unknown_symbol_quote() {
        let quote: FinnhubQuote =
            serde_json::from_str(r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#)
                .unwrap();
        assert!(quote.into_quote(&Symbol::new("ZZZZ")).is_none());
    }

    #[test]
    fn test_quote_conversion() {
        let quote: FinnhubQuote =
            serde_json::from_str(r#"{"c":120.5,"pc":118.0,"t":1727985600}"#).unwrap();
        let quote = quote.into_quote(&Symbol::new("nvda")).unwrap();
        assert_eq!(quote.symbol.as_str(), "NVDA");
        assert_eq!(quote.previous_close, Some(118.0));
    }

    #[test]
    fn test_series_prefers_consensus_at_report() {
        let estimates: FinnhubEstimates = serde_json::from_str(
            r#"{"symbol":"MU","freq":"quarterly","data":[
                {"epsAvg":0.50,"period":"2024-08-31","quarter":4,"year":2024},
                {"epsAvg":1.90,"period":"2025-05-31","quarter":3,"year":2025}
            ]}"#,
        )
        .unwrap();
        let earnings: Vec<FinnhubEarnings> = serde_json::from_str(
            r#"[{"actual":0.62,"estimate":0.48,"period":"2024-08-31","quarter":4,"symbol":"MU","year":2024}]"#,
        )
        .unwrap();

        let series = build_series(
            &Symbol::new("MU"),
            Metric::Eps,
            PeriodKind::Quarterly,
            &estimates.data,
            &earnings,
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].reported, Some(0.62));
        assert_eq!(series.points[0].estimate, Some(0.48));
        assert_eq!(series.points[1].horizon, Horizon::Forecast);
    }

    #[test]
    fn test_missing_data_field() {
        let estimates: FinnhubEstimates = serde_json::from_str(r#"{"symbol":"MU"}"#).unwrap();
        assert!(estimates.data.is_empty());
    }
}
