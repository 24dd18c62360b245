//! Forward estimates from the earnings trend module.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use feed_core::{
    Capability, EstimatePoint, EstimateSeries, Metric, PeriodKey, PeriodKind, Source,
    SourceDescriptor, SourceId, SourceResult, SourceUnavailable, Symbol, UnavailableKind,
};

use crate::client::YahooClient;
use crate::response::{EarningsTrend, TrendRow, raw};

/// Identifier of the earnings trend source.
pub const TREND_SOURCE_ID: &str = "yahooquery";

/// Yahoo Finance earnings trend: consensus for the current and next quarter
/// and fiscal year. Every point is a forecast.
#[derive(Debug, Clone)]
pub struct YahooTrendSource {
    id: SourceId,
    client: Arc<YahooClient>,
}

impl YahooTrendSource {
    /// Create a source with its own client.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new() -> SourceResult<Self> {
        let client = YahooClient::new()
            .map_err(|e| SourceUnavailable::new(TREND_SOURCE_ID, UnavailableKind::Network, e.to_string()))?;
        Ok(Self::with_client(Arc::new(client)))
    }

    /// Create a source sharing an existing client.
    #[must_use]
    pub fn with_client(client: Arc<YahooClient>) -> Self {
        Self {
            id: SourceId::new(TREND_SOURCE_ID),
            client,
        }
    }

    /// Default descriptor for this source.
    #[must_use]
    pub fn descriptor() -> SourceDescriptor {
        SourceDescriptor::new(TREND_SOURCE_ID, 30)
            .with_capabilities(&[Capability::EpsEstimates, Capability::RevenueEstimates])
    }
}

#[async_trait]
impl Source for YahooTrendSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        "Yahoo Finance earnings trend - Forward EPS and revenue consensus"
    }

    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        let data = self
            .client
            .quote_summary(&self.id, symbol, &["earningsTrend"])
            .await?;
        let trend = data.earnings_trend.unwrap_or_default();
        let series = trend_series(symbol, metric, period_kind, &trend);
        if series.is_empty() {
            return Err(SourceUnavailable::empty(
                &self.id,
                format!("no {metric} {period_kind} trend for {symbol}"),
            ));
        }
        Ok(series)
    }
}

/// Relative period codes are `0q`, `+1q`, `0y`, `+1y`; long-term growth rows
/// (`+5y`, `-5y`) carry no end date and are skipped.
fn matches_kind(row: &TrendRow, period_kind: PeriodKind) -> bool {
    let suffix = match period_kind {
        PeriodKind::Annual => 'y',
        PeriodKind::Quarterly => 'q',
    };
    row.period.ends_with(suffix) && !row.period.contains('5')
}

fn trend_series(
    symbol: &Symbol,
    metric: Metric,
    period_kind: PeriodKind,
    trend: &EarningsTrend,
) -> EstimateSeries {
    let mut points: Vec<EstimatePoint> = trend
        .trend
        .iter()
        .filter(|row| matches_kind(row, period_kind))
        .filter_map(|row| {
            let end = NaiveDate::parse_from_str(row.end_date.as_deref()?, "%Y-%m-%d").ok()?;
            let block = match metric {
                Metric::Eps => row.earnings_estimate.as_ref(),
                Metric::Revenue => row.revenue_estimate.as_ref(),
            };
            let estimate = raw(block?.avg.as_ref())?;
            let key = PeriodKey::from_date(end, period_kind);
            Some(EstimatePoint::forecast(key.label(), period_kind, estimate, TREND_SOURCE_ID))
        })
        .collect();
    points.sort_by_key(|p| p.key().ok());
    points.dedup_by(|a, b| a.period_label == b.period_label);

    EstimateSeries::new(symbol.clone(), metric, period_kind).with_points(points)
}
