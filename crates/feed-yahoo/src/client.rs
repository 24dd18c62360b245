//! Rate-limited HTTP client for Yahoo Finance endpoints.

use std::time::Duration;

use feed_core::{SourceId, SourceResult, SourceUnavailable, Symbol, UnavailableKind};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

use crate::response::{QuoteResponse, QuoteSummaryData, QuoteSummaryResponse, YahooQuote};

/// Yahoo Finance quote API base URL.
const QUOTE_API_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// HTTP client shared by the Yahoo sources.
///
/// Requests are spaced at least `rate_limit` apart.
#[derive(Debug)]
pub struct YahooClient {
    client: reqwest::Client,
    rate_limit: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl YahooClient {
    /// Create a client with the default one request per second limit.
    ///
    /// # Errors
    /// Fails if the underlying HTTP client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a client with a custom rate limit.
    ///
    /// # Errors
    /// Fails if the underlying HTTP client cannot be built.
    pub fn with_rate_limit(rate_limit: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client).rate_limited(rate_limit))
    }

    /// Wrap an existing HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit: Duration::from_millis(DEFAULT_RATE_LIMIT_MS),
            last_request: Mutex::new(None),
        }
    }

    /// Overrides the spacing between requests.
    #[must_use]
    pub fn rate_limited(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Waits for this request's slot. The lock is held through the wait, so
    /// concurrent callers queue up one `rate_limit` apart.
    async fn apply_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready = previous + self.rate_limit;
            if ready > Instant::now() {
                debug!("Rate limiting: waiting {:?}", ready.saturating_duration_since(Instant::now()));
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn get<T: DeserializeOwned>(&self, source: &SourceId, url: &str) -> SourceResult<T> {
        self.apply_rate_limit().await;
        debug!("Yahoo request: {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                UnavailableKind::Timeout
            } else {
                UnavailableKind::Network
            };
            SourceUnavailable::new(source, kind, e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceUnavailable::new(
                source,
                UnavailableKind::from_http_status(status.as_u16()),
                format!("HTTP {status}"),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceUnavailable::new(source, UnavailableKind::Parse, e.to_string()))
    }

    /// Fetches the v7 quote for one symbol.
    pub(crate) async fn quote(&self, source: &SourceId, symbol: &Symbol) -> SourceResult<YahooQuote> {
        let url = format!("{QUOTE_API_URL}?symbols={}", symbol.as_str());
        let response: QuoteResponse = self.get(source, &url).await?;
        response
            .quote_response
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|q| q.symbol.eq_ignore_ascii_case(symbol.as_str()))
            .ok_or_else(|| {
                SourceUnavailable::new(source, UnavailableKind::NotFound, format!("no quote for {symbol}"))
            })
    }

    /// Fetches quote summary modules for one symbol.
    pub(crate) async fn quote_summary(
        &self,
        source: &SourceId,
        symbol: &Symbol,
        modules: &[&str],
    ) -> SourceResult<QuoteSummaryData> {
        let url = format!(
            "{QUOTE_SUMMARY_URL}/{}?modules={}",
            symbol.as_str(),
            modules.join(",")
        );
        let response: QuoteSummaryResponse = self.get(source, &url).await?;
        if let Some(error) = response.quote_summary.error {
            let kind = if error.code == "Not Found" {
                UnavailableKind::NotFound
            } else {
                UnavailableKind::Network
            };
            return Err(SourceUnavailable::new(
                source,
                kind,
                format!("{}: {}", error.code, error.description),
            ));
        }
        response
            .quote_summary
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| SourceUnavailable::empty(source, format!("empty quote summary for {symbol}")))
    }
}
