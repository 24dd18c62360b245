//! Yahoo Finance API response types.

use serde::Deserialize;

// ============================================================================
// v7 quote
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteResponse {
    pub(crate) quote_response: QuoteResult,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteResult {
    #[serde(default)]
    pub(crate) result: Option<Vec<YahooQuote>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct YahooQuote {
    pub(crate) symbol: String,
    #[serde(default)]
    pub(crate) regular_market_price: Option<f64>,
    #[serde(default)]
    pub(crate) regular_market_previous_close: Option<f64>,
    #[serde(default)]
    pub(crate) pre_market_price: Option<f64>,
    #[serde(default)]
    pub(crate) post_market_price: Option<f64>,
    #[serde(default)]
    pub(crate) market_state: Option<String>,
    #[serde(default)]
    pub(crate) regular_market_time: Option<i64>,
}

// ============================================================================
// v10 quote summary
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteSummaryResponse {
    pub(crate) quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuoteSummaryResult {
    #[serde(default)]
    pub(crate) result: Option<Vec<QuoteSummaryData>>,
    #[serde(default)]
    pub(crate) error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteSummaryData {
    #[serde(default)]
    pub(crate) earnings_trend: Option<EarningsTrend>,
    #[serde(default)]
    pub(crate) earnings_history: Option<EarningsHistory>,
    #[serde(default)]
    pub(crate) earnings: Option<Earnings>,
}

/// A `{ "raw": 1.23, "fmt": "1.23" }` wrapper; Yahoo sends `{}` when unknown.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawValue {
    #[serde(default)]
    pub(crate) raw: Option<f64>,
    #[serde(default)]
    pub(crate) fmt: Option<String>,
}

pub(crate) fn raw(value: Option<&RawValue>) -> Option<f64> {
    value.and_then(|v| v.raw).filter(|v| v.is_finite())
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EarningsTrend {
    #[serde(default)]
    pub(crate) trend: Vec<TrendRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TrendRow {
    #[serde(default)]
    pub(crate) period: String,
    #[serde(default)]
    pub(crate) end_date: Option<String>,
    #[serde(default)]
    pub(crate) earnings_estimate: Option<EstimateBlock>,
    #[serde(default)]
    pub(crate) revenue_estimate: Option<EstimateBlock>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EstimateBlock {
    #[serde(default)]
    pub(crate) avg: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EarningsHistory {
    #[serde(default)]
    pub(crate) history: Vec<HistoryRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryRow {
    #[serde(default)]
    pub(crate) eps_actual: Option<RawValue>,
    #[serde(default)]
    pub(crate) eps_estimate: Option<RawValue>,
    #[serde(default)]
    pub(crate) quarter: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Earnings {
    #[serde(default)]
    pub(crate) financials_chart: Option<FinancialsChart>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FinancialsChart {
    #[serde(default)]
    pub(crate) yearly: Vec<FinancialsRow>,
    #[serde(default)]
    pub(crate) quarterly: Vec<FinancialsRow>,
}

/// Yearly rows carry an integer `date`, quarterly rows a `"3Q2024"` string.
#[derive(Debug, Deserialize)]
pub(crate) struct FinancialsRow {
    pub(crate) date: serde_json::Value,
    #[serde(default)]
    pub(crate) revenue: Option<RawValue>,
}
