//! Bars, colour classification and the value extractor.

use std::collections::HashMap;
use std::sync::LazyLock;

use feed_core::{EstimatePoint, FeedError, PeriodKind, Result, SourceId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scale::ChartScale;

static HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[;\s])height\s*:\s*(?:max\(\s*)?(-?[0-9]*\.?[0-9]+)\s*%").expect("height regex")
});

static INNER_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)--inner-bar-color\s*:\s*(#[0-9a-f]{3,8})\b").expect("inner color regex")
});

static ANY_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#[0-9a-f]{6}\b").expect("color regex"));

/// Semantic class of a bar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarBin {
    /// Actual, reported value.
    Reported,
    /// Analyst estimate.
    Estimate,
}

/// Caller-supplied mapping from a colour token to a [`BarBin`].
///
/// Tokens are compared case-insensitively after trimming.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorMapping {
    bins: HashMap<String, BarBin>,
}

impl ColorMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `color` to `bin`.
    #[must_use]
    pub fn with(mut self, color: impl AsRef<str>, bin: BarBin) -> Self {
        self.insert(color, bin);
        self
    }

    /// Maps `color` to `bin`.
    pub fn insert(&mut self, color: impl AsRef<str>, bin: BarBin) {
        self.bins.insert(normalize_color(color.as_ref()), bin);
    }

    /// Looks up a colour token.
    #[must_use]
    pub fn classify(&self, color: &str) -> Option<BarBin> {
        self.bins.get(&normalize_color(color)).copied()
    }

    /// Returns true if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

fn normalize_color(color: &str) -> String {
    color.trim().to_ascii_uppercase()
}

/// One bar of one view, with its period label supplied by the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Period the bar belongs to, e.g. `Q3 '24`.
    pub period_label: String,
    /// Bar height as a percentage of the plot area.
    pub height_percent: f64,
    /// Colour token used for classification.
    pub color_class: String,
}

impl Bar {
    /// Creates a bar.
    #[must_use]
    pub fn new(period_label: impl Into<String>, height_percent: f64, color_class: impl Into<String>) -> Self {
        Self {
            period_label: period_label.into(),
            height_percent,
            color_class: color_class.into(),
        }
    }

    /// Builds a bar from an inline style attribute.
    ///
    /// # Errors
    /// Returns [`FeedError::MalformedChartInput`] if the style has no height
    /// percentage or no colour.
    pub fn from_style(period_label: impl Into<String>, style: &str) -> Result<Self> {
        let (height_percent, color_class) = parse_bar_style(style)?;
        Ok(Self::new(period_label, height_percent, color_class))
    }
}

/// Extracts the height percentage and colour token from an inline style.
///
/// The height may be plain (`height: 42%`) or wrapped (`height: max(42%, 2px)`).
/// The colour is taken from `--inner-bar-color` when present, otherwise the
/// first six-digit hex colour in the style.
///
/// # Errors
/// Returns [`FeedError::MalformedChartInput`] if either part is missing.
pub fn parse_bar_style(style: &str) -> Result<(f64, String)> {
    let height = HEIGHT_RE
        .captures(style)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| FeedError::MalformedChartInput(format!("no bar height in style {style:?}")))?;

    let color = INNER_COLOR_RE
        .captures(style)
        .and_then(|c| c.get(1))
        .or_else(|| ANY_COLOR_RE.find(style))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| FeedError::MalformedChartInput(format!("no bar colour in style {style:?}")))?;

    Ok((height, color))
}

/// Converts percentage-encoded bars into estimate points.
///
/// Extraction is pure: one call handles the bars of one view (one metric at
/// one period granularity). Any contract violation fails the whole chart.
#[derive(Clone, Debug)]
pub struct ChartValueExtractor {
    mapping: ColorMapping,
}

impl ChartValueExtractor {
    /// Creates an extractor with the given colour mapping.
    #[must_use]
    pub const fn new(mapping: ColorMapping) -> Self {
        Self { mapping }
    }

    /// Returns the colour mapping.
    #[must_use]
    pub const fn mapping(&self) -> &ColorMapping {
        &self.mapping
    }

    /// Extracts one point per period, in order of first appearance.
    ///
    /// A period's reported and estimate bars are combined into one point. If a
    /// period has two bars of the same class, the first one is kept.
    ///
    /// # Errors
    /// Returns [`FeedError::MalformedChartInput`] for a height outside
    /// `[0, 100]` or a colour missing from the mapping.
    pub fn extract(
        &self,
        scale: &ChartScale,
        bars: &[Bar],
        period_kind: PeriodKind,
        source_id: &SourceId,
    ) -> Result<Vec<EstimatePoint>> {
        let mut order: Vec<&str> = Vec::new();
        let mut values: HashMap<&str, (Option<f64>, Option<f64>)> = HashMap::new();

        for bar in bars {
            let bin = self.mapping.classify(&bar.color_class).ok_or_else(|| {
                FeedError::MalformedChartInput(format!(
                    "unmapped colour {:?} for period {}",
                    bar.color_class, bar.period_label
                ))
            })?;
            let value = scale.value_at(bar.height_percent)?;

            let label = bar.period_label.as_str();
            let slot = values.entry(label).or_insert_with(|| {
                order.push(label);
                (None, None)
            });
            let target = match bin {
                BarBin::Reported => &mut slot.0,
                BarBin::Estimate => &mut slot.1,
            };
            if target.is_some() {
                debug!(period = label, ?bin, "Duplicate bar ignored");
                continue;
            }
            *target = Some(value);
        }

        Ok(order
            .into_iter()
            .filter_map(|label| {
                let (reported, estimate) = values.get(label).copied()?;
                Some(EstimatePoint::new(label, period_kind, reported, estimate, source_id))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::Horizon;

    const REPORTED: &str = "#3179F5";
    const ESTIMATE: &str = "#EBEBEB";

    fn extractor() -> ChartValueExtractor {
        ChartValueExtractor::new(
            ColorMapping::new()
                .with(REPORTED, BarBin::Reported)
                .with(ESTIMATE, BarBin::Estimate)
                .with("#a8a8a8", BarBin::Estimate),
        )
    }

    fn source() -> SourceId {
        SourceId::new("chart")
    }

    #[test]
    fn test_parse_bar_style() {
        let (h, c) =
            parse_bar_style("--inner-bar-color: #3179F5; height: max(41.67%, 2px); width: 12px").unwrap();
        assert_eq!(h, 41.67);
        assert_eq!(c, "#3179F5");

        let (h, c) = parse_bar_style("background: #EBEBEB; height: 100%").unwrap();
        assert_eq!(h, 100.0);
        assert_eq!(c, "#EBEBEB");

        assert!(parse_bar_style("min-height: 4px; background: #EBEBEB").is_err());
        assert!(parse_bar_style("height: 40%").is_err());
    }

    #[test]
    fn test_combines_bars_per_period() {
        let scale = ChartScale::new(0.0, 12.0).unwrap();
        let bars = vec![
            Bar::new("Q3 '24", 50.0, REPORTED),
            Bar::new("Q3 '24", 25.0, ESTIMATE),
            Bar::new("Q2 '26", 75.0, "#a8a8a8"),
        ];
        let points = extractor()
            .extract(&scale, &bars, PeriodKind::Quarterly, &source())
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].period_label, "Q3 '24");
        assert_eq!(points[0].reported, Some(6.0));
        assert_eq!(points[0].estimate, Some(3.0));
        assert_eq!(points[0].horizon, Horizon::Historical);
        assert_eq!(points[1].reported, None);
        assert_eq!(points[1].estimate, Some(9.0));
        assert_eq!(points[1].horizon, Horizon::Forecast);
    }

    #[test]
    fn test_unmapped_colour_fails_chart() {
        let scale = ChartScale::new(0.0, 1.0).unwrap();
        let bars = vec![Bar::new("2024", 10.0, REPORTED), Bar::new("2025", 10.0, "#FF0000")];
        let err = extractor()
            .extract(&scale, &bars, PeriodKind::Annual, &source())
            .unwrap_err();
        assert!(matches!(err, FeedError::MalformedChartInput(_)));
    }

    #[test]
    fn test_out_of_range_height_fails_chart() {
        let scale = ChartScale::new(0.0, 1.0).unwrap();
        let bars = vec![Bar::new("2024", 120.0, REPORTED)];
        assert!(
            extractor()
                .extract(&scale, &bars, PeriodKind::Annual, &source())
                .is_err()
        );
    }

    #[test]
    fn test_duplicate_bar_keeps_first() {
        let scale = ChartScale::new(0.0, 10.0).unwrap();
        let bars = vec![Bar::new("2024", 10.0, REPORTED), Bar::new("2024", 90.0, REPORTED)];
        let points = extractor()
            .extract(&scale, &bars, PeriodKind::Annual, &source())
            .unwrap();
        assert_eq!(points[0].reported, Some(1.0));
    }

    #[test]
    fn test_colour_lookup_is_case_insensitive() {
        assert_eq!(extractor().mapping().classify(" #3179f5 "), Some(BarBin::Reported));
        assert!(ColorMapping::new().is_empty());
    }
}
