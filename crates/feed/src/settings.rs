//! Process-wide settings and the default source set.

use std::fmt;
use std::path::PathBuf;
#[cfg(any(feature = "fmp", feature = "finnhub", feature = "yahoo", feature = "chart"))]
use std::sync::Arc;

#[cfg(any(feature = "fmp", feature = "finnhub", feature = "yahoo", feature = "chart"))]
use feed_core::{Source, SourceUnavailable};
use feed_core::{Capability, SourceId};
use tracing::debug;

#[cfg(any(feature = "fmp", feature = "finnhub", feature = "yahoo", feature = "chart"))]
use crate::registry::factory;
use crate::registry::{RegistryConfig, SourceRegistry};

/// Environment variable holding the Financial Modeling Prep key.
pub const FMP_API_KEY: &str = "FMP_API_KEY";
/// Environment variable holding the Finnhub token.
pub const FINNHUB_API_KEY: &str = "FINNHUB_API_KEY";
/// Environment variable pointing at captured chart renderings.
pub const CHART_DIR: &str = "FEEDS_CHART_DIR";

const DEFAULT_REPORTED_COLORS: &[&str] = &["#3179F5"];
const DEFAULT_ESTIMATE_COLORS: &[&str] = &["#EBEBEB"];

/// Credentials and locations fixed at process start.
///
/// Missing credentials are not an error here: the affected source reports
/// itself as not configured when first used and is skipped.
#[derive(Clone, Default)]
pub struct Settings {
    /// Financial Modeling Prep API key.
    pub fmp_api_key: Option<String>,
    /// Finnhub API token.
    pub finnhub_api_key: Option<String>,
    /// Directory of captured chart renderings for the chart source.
    pub chart_dir: Option<PathBuf>,
    /// Bar colours meaning "reported".
    pub chart_reported_colors: Vec<String>,
    /// Bar colours meaning "estimate".
    pub chart_estimate_colors: Vec<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("fmp_api_key", &self.fmp_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("finnhub_api_key", &self.finnhub_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("chart_dir", &self.chart_dir)
            .field("chart_reported_colors", &self.chart_reported_colors)
            .field("chart_estimate_colors", &self.chart_estimate_colors)
            .finish()
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`. Blank values count as missing.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let colors = |key: &str, default: &[&str]| -> Vec<String> {
            get(key).map_or_else(
                || default.iter().map(|c| (*c).to_string()).collect(),
                |v| v.split(',').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect(),
            )
        };

        let settings = Self {
            fmp_api_key: get(FMP_API_KEY),
            finnhub_api_key: get(FINNHUB_API_KEY),
            chart_dir: get(CHART_DIR).map(PathBuf::from),
            chart_reported_colors: colors("FEEDS_CHART_REPORTED_COLORS", DEFAULT_REPORTED_COLORS),
            chart_estimate_colors: colors("FEEDS_CHART_ESTIMATE_COLORS", DEFAULT_ESTIMATE_COLORS),
        };
        debug!(?settings, "Loaded settings");
        settings
    }
}

/// Default fallback order for prices: Yahoo carries extended hours, so it goes first.
#[must_use]
pub fn default_price_policy() -> Vec<SourceId> {
    ["yahoo", "finnhub", "fmp"].into_iter().map(SourceId::new).collect()
}

impl SourceRegistry {
    /// Registers every compiled-in source.
    ///
    /// Estimates follow descriptor ranks: FMP, Finnhub, the Yahoo earnings
    /// trend, the chart source, then the Yahoo history fallback. Prices use
    /// [`default_price_policy`] unless `config` overrides them. Sources whose
    /// credential is missing stay registered and are skipped on use.
    #[must_use]
    pub fn from_settings(settings: &Settings, mut config: RegistryConfig) -> Self {
        config
            .priorities
            .entry(Capability::Prices)
            .or_insert_with(default_price_policy);
        let mut registry = Self::new(config);

        #[cfg(feature = "fmp")]
        {
            let key = settings.fmp_api_key.clone();
            registry.register(
                feed_fmp::FmpSource::descriptor(),
                factory(move || match &key {
                    Some(key) => Ok(Arc::new(feed_fmp::FmpSource::new(key.as_str())) as Arc<dyn Source>),
                    None => Err(SourceUnavailable::not_configured(
                        feed_fmp::SOURCE_ID,
                        format!("{FMP_API_KEY} not set"),
                    )),
                }),
            );
        }

        #[cfg(feature = "finnhub")]
        {
            let key = settings.finnhub_api_key.clone();
            registry.register(
                feed_finnhub::FinnhubSource::descriptor(),
                factory(move || match &key {
                    Some(key) => {
                        Ok(Arc::new(feed_finnhub::FinnhubSource::new(key.as_str())) as Arc<dyn Source>)
                    }
                    None => Err(SourceUnavailable::not_configured(
                        feed_finnhub::SOURCE_ID,
                        format!("{FINNHUB_API_KEY} not set"),
                    )),
                }),
            );
        }

        #[cfg(feature = "yahoo")]
        {
            registry.register(
                feed_yahoo::YahooTrendSource::descriptor(),
                factory(|| Ok(Arc::new(feed_yahoo::YahooTrendSource::new()?) as Arc<dyn Source>)),
            );
            registry.register(
                feed_yahoo::YahooQuoteSource::descriptor(),
                factory(|| Ok(Arc::new(feed_yahoo::YahooQuoteSource::new()?) as Arc<dyn Source>)),
            );
        }

        #[cfg(feature = "chart")]
        {
            use feed_chart::{BarBin, CHART_SOURCE_ID, ChartSource, ColorMapping, FileChartSession};

            let dir = settings.chart_dir.clone();
            let mut mapping = ColorMapping::new();
            for color in &settings.chart_reported_colors {
                mapping.insert(color, BarBin::Reported);
            }
            for color in &settings.chart_estimate_colors {
                mapping.insert(color, BarBin::Estimate);
            }
            registry.register(
                ChartSource::descriptor(CHART_SOURCE_ID),
                factory(move || {
                    let dir = dir.clone().ok_or_else(|| {
                        SourceUnavailable::not_configured(CHART_SOURCE_ID, format!("{CHART_DIR} not set"))
                    })?;
                    let session = FileChartSession::new(CHART_SOURCE_ID, dir);
                    let source = ChartSource::spawn(CHART_SOURCE_ID, session, mapping.clone())?;
                    Ok(Arc::new(source) as Arc<dyn Source>)
                }),
            );
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_settings_from_lookup() {
        let settings = Settings::from_lookup(lookup(&[
            (FMP_API_KEY, " abc "),
            (FINNHUB_API_KEY, ""),
            ("FEEDS_CHART_ESTIMATE_COLORS", "#EBEBEB, #A8A8A8"),
        ]));
        assert_eq!(settings.fmp_api_key.as_deref(), Some("abc"));
        assert!(settings.finnhub_api_key.is_none());
        assert_eq!(settings.chart_reported_colors, vec!["#3179F5"]);
        assert_eq!(settings.chart_estimate_colors.len(), 2);
        assert!(!format!("{settings:?}").contains("abc"));
    }

    #[cfg(all(feature = "fmp", feature = "finnhub", feature = "yahoo", feature = "chart"))]
    #[test]
    fn test_default_order() {
        let registry = SourceRegistry::from_settings(&Settings::default(), RegistryConfig::default());
        let ids = |c| {
            registry
                .fallback_order(c)
                .into_iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(Capability::EpsEstimates), vec!["fmp", "finnhub", "yahooquery", "chart", "yahoo"]);
        assert_eq!(ids(Capability::Prices), vec!["yahoo", "finnhub", "fmp"]);
    }

    #[cfg(feature = "fmp")]
    #[tokio::test]
    async fn test_missing_key_is_skipped() {
        let registry = SourceRegistry::from_settings(
            &Settings::default(),
            RegistryConfig::default().with_priority(Capability::Prices, ["fmp"]),
        );
        let err = registry
            .fetch_with_fallback(&feed_core::Symbol::new("AAPL"), Capability::Prices, |s| {
                let id = s.id().clone();
                async move { Err::<(), _>(SourceUnavailable::new(id, feed_core::UnavailableKind::Empty, "probe")) }
            })
            .await
            .unwrap_err();
        match err {
            feed_core::FeedError::NoDataAvailable { attempts, .. } => {
                assert_eq!(attempts[0].source_id.as_str(), "fmp");
                assert_eq!(attempts[0].kind, feed_core::UnavailableKind::NotConfigured);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
