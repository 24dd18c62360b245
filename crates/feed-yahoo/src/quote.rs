//! Quote source with extended hours and a history fallback for estimates.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use feed_core::{
    Capability, EstimatePoint, EstimateSeries, MarketState, Metric, PeriodKey, PeriodKind, Quote,
    Source, SourceDescriptor, SourceId, SourceResult, SourceUnavailable, Symbol, UnavailableKind,
};
use tracing::debug;

use crate::client::YahooClient;
use crate::response::{QuoteSummaryData, YahooQuote, raw};

/// Identifier of the quote source.
pub const QUOTE_SOURCE_ID: &str = "yahoo";

/// Yahoo Finance quotes, including pre and post market prices.
///
/// Also serves as the generic last-resort source for estimates: reported
/// quarterly EPS with the consensus at the time comes from `earningsHistory`,
/// reported revenue from the `earnings` financials chart.
#[derive(Debug, Clone)]
pub struct YahooQuoteSource {
    id: SourceId,
    client: Arc<YahooClient>,
}

impl YahooQuoteSource {
    /// Create a source with its own client.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> SourceResult<Self> {
        let client = YahooClient::new()
            .map_err(|e| SourceUnavailable::new(QUOTE_SOURCE_ID, UnavailableKind::Network, e.to_string()))?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create a source sharing an existing client.
    #[must_use]
    pub fn with_client(client: Arc<YahooClient>) -> Self {
        Self {
            id: SourceId::new(QUOTE_SOURCE_ID),
            client,
        }
    }

    /// Default descriptor for this source.
    #[must_use]
    pub fn descriptor() -> SourceDescriptor {
        SourceDescriptor::new(QUOTE_SOURCE_ID, 40).with_capabilities(&[
            Capability::Prices,
            Capability::ExtendedHours,
            Capability::EpsEstimates,
            Capability::RevenueEstimates,
        ])
    }
}

#[async_trait]
impl Source for YahooQuoteSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        "Yahoo Finance - Quotes with extended hours and reported earnings history"
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> SourceResult<Quote> {
        let quote = self.client.quote(&self.id, symbol).await?;
        into_quote(quote, symbol)
            .ok_or_else(|| SourceUnavailable::empty(&self.id, format!("no regular market price for {symbol}")))
    }

    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        if metric == Metric::Eps && period_kind == PeriodKind::Annual {
            return Err(SourceUnavailable::unsupported(&self.id, "annual eps history"));
        }

        let data = self
            .client
            .quote_summary(&self.id, symbol, &["earningsHistory", "earnings"])
            .await?;
        let series = history_series(symbol, metric, period_kind, &data);
        debug!(symbol = %symbol, points = series.len(), "Yahoo history series");

        if series.is_empty() {
            return Err(SourceUnavailable::empty(
                &self.id,
                format!("no {metric} {period_kind} history for {symbol}"),
            ));
        }
        Ok(series)
    }
}

fn into_quote(quote: YahooQuote, symbol: &Symbol) -> Option<Quote> {
    let price = quote.regular_market_price?;
    let as_of = quote
        .regular_market_time
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .unwrap_or_else(Utc::now);
    let market_state = quote
        .market_state
        .as_deref()
        .map_or(MarketState::Unknown, MarketState::from_provider);

    Some(
        Quote::new(symbol.clone(), price, as_of)
            .with_previous_close(quote.regular_market_previous_close)
            .with_pre_market_price(quote.pre_market_price)
            .with_post_market_price(quote.post_market_price)
            .with_market_state(market_state),
    )
}

fn history_series(
    symbol: &Symbol,
    metric: Metric,
    period_kind: PeriodKind,
    data: &QuoteSummaryData,
) -> EstimateSeries {
    let mut periods: BTreeMap<PeriodKey, (Option<f64>, Option<f64>)> = BTreeMap::new();

    match metric {
        Metric::Eps => {
            for row in data.earnings_history.iter().flat_map(|h| &h.history) {
                let key = row
                    .quarter
                    .as_ref()
                    .and_then(|q| q.fmt.as_deref())
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                    .map(|d| PeriodKey::from_date(d, PeriodKind::Quarterly));
                if let Some(key) = key {
                    periods.insert(key, (raw(row.eps_actual.as_ref()), raw(row.eps_estimate.as_ref())));
                }
            }
        }
        Metric::Revenue => {
            let chart = data.earnings.as_ref().and_then(|e| e.financials_chart.as_ref());
            let rows = chart.map_or(&[][..], |c| match period_kind {
                PeriodKind::Annual => &c.yearly[..],
                PeriodKind::Quarterly => &c.quarterly[..],
            });
            for row in rows {
                if let Some(key) = chart_period_key(&row.date, period_kind) {
                    periods.insert(key, (raw(row.revenue.as_ref()), None));
                }
            }
        }
    }

    let points = periods
        .into_iter()
        .filter(|(_, (r, e))| r.is_some() || e.is_some())
        .map(|(key, (reported, estimate))| {
            EstimatePoint::new(key.label(), period_kind, reported, estimate, QUOTE_SOURCE_ID)
        })
        .collect();

    EstimateSeries::new(symbol.clone(), metric, period_kind).with_points(points)
}

/// Parses a financials chart date: `2024` for years, `"3Q2024"` for quarters.
fn chart_period_key(date: &serde_json::Value, period_kind: PeriodKind) -> Option<PeriodKey> {
    match period_kind {
        PeriodKind::Annual => {
            let year = match date {
                serde_json::Value::Number(n) => n.as_i64()?,
                serde_json::Value::String(s) => s.trim().parse().ok()?,
                _ => return None,
            };
            Some(PeriodKey::annual(i32::try_from(year).ok()?))
        }
        PeriodKind::Quarterly => {
            let s = date.as_str()?;
            let (quarter, year) = s.split_once('Q')?;
            PeriodKey::quarterly(year.trim().parse().ok()?, quarter.trim().parse().ok()?).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::QuoteResponse;
    use feed_core::{ExtendedSession, Horizon};

    #[test]
    fn test_quote_with_extended_hours() {
        let response: QuoteResponse = serde_json::from_str(
            r#"{"quoteResponse":{"result":[{
                "symbol":"AAPL","regularMarketPrice":200.0,"regularMarketPreviousClose":190.0,
                "postMarketPrice":210.0,"marketState":"POSTPOST","regularMarketTime":1727985600
            }],"error":null}}"#,
        )
        .unwrap();
        let raw_quote = response.quote_response.result.unwrap().remove(0);
        let quote = into_quote(raw_quote, &Symbol::new("AAPL")).unwrap();

        assert_eq!(quote.market_state, MarketState::Post);
        assert_eq!(quote.close(), Some(200.0));
        assert_eq!(quote.extended_hours_price(ExtendedSession::Both), Some(210.0));
        assert_eq!(quote.extended_hours_price(ExtendedSession::Pre), None);
    }

    #[test]
    fn test_quote_without_price() {
        let response: QuoteResponse =
            serde_json::from_str(r#"{"quoteResponse":{"result":[{"symbol":"XYZ"}]}}"#).unwrap();
        let raw_quote = response.quote_response.result.unwrap().remove(0);
        assert!(into_quote(raw_quote, &Symbol::new("XYZ")).is_none());
    }

    #[test]
    fn test_eps_history_series() {
        let data: QuoteSummaryData = serde_json::from_str(
            r#"{"earningsHistory":{"history":[
                {"epsActual":{"raw":0.62,"fmt":"0.62"},"epsEstimate":{"raw":0.48,"fmt":"0.48"},
                 "quarter":{"raw":1725062400,"fmt":"2024-08-31"},"period":"-4q"},
                {"epsActual":{},"epsEstimate":{},"quarter":{"raw":1732924800,"fmt":"2024-11-30"}}
            ]}}"#,
        )
        .unwrap();
        let series = history_series(&Symbol::new("MU"), Metric::Eps, PeriodKind::Quarterly, &data);
        assert_eq!(series.len(), 1);
        assert_eq!(series.points[0].period_label, "Q3 '24");
        assert_eq!(series.points[0].horizon, Horizon::Historical);
    }

    #[test]
    fn test_revenue_chart_series() {
        let data: QuoteSummaryData = serde_json::from_str(
            r#"{"earnings":{"financialsChart":{
                "yearly":[{"date":2023,"revenue":{"raw":1.55e10}},{"date":2024,"revenue":{"raw":2.5e10}}],
                "quarterly":[{"date":"3Q2024","revenue":{"raw":7.75e9}}]
            }}}"#,
        )
        .unwrap();
        let annual = history_series(&Symbol::new("MU"), Metric::Revenue, PeriodKind::Annual, &data);
        assert_eq!(annual.len(), 2);
        assert_eq!(annual.yoy_pct("2024").map(|v| v.round()), Some(61.0));

        let quarterly =
            history_series(&Symbol::new("MU"), Metric::Revenue, PeriodKind::Quarterly, &data);
        assert_eq!(quarterly.points[0].period_label, "Q3 '24");
    }
}
