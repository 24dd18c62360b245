//! Axis scale and axis label parsing.

use feed_core::{FeedError, Result};
use serde::{Deserialize, Serialize};

/// Height values within this distance outside `[0, 100]` are accepted and
/// snapped to the boundary. Anything further out is malformed.
pub const HEIGHT_TOLERANCE: f64 = 0.01;

/// Numeric bounds of a chart's value axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartScale {
    min: f64,
    max: f64,
}

impl ChartScale {
    /// Creates a scale.
    ///
    /// # Errors
    /// Returns [`FeedError::MalformedChartInput`] unless both bounds are finite
    /// and `max > min`.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || max <= min {
            return Err(FeedError::MalformedChartInput(format!(
                "scale requires max > min, got min={min} max={max}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Builds a scale from the values printed on the axis.
    ///
    /// # Errors
    /// Returns [`FeedError::MalformedChartInput`] if fewer than two distinct
    /// values are present.
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let mut values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        match (values.first(), values.last()) {
            (Some(&min), Some(&max)) if values.len() >= 2 => Self::new(min, max),
            _ => Err(FeedError::MalformedChartInput(format!(
                "need at least 2 distinct scale values, got {}",
                values.len()
            ))),
        }
    }

    /// Builds a scale from raw axis label text.
    ///
    /// Labels that do not parse as numbers are ignored.
    ///
    /// # Errors
    /// Returns [`FeedError::MalformedChartInput`] if fewer than two distinct
    /// values parse.
    pub fn from_axis_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let values: Vec<f64> = labels
            .iter()
            .filter_map(|l| parse_axis_label(l.as_ref()))
            .collect();
        Self::from_values(&values)
    }

    /// Lower bound.
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Converts a bar height in percent to a value on this scale.
    ///
    /// # Errors
    /// Returns [`FeedError::MalformedChartInput`] if the height lies outside
    /// `[0, 100]` by more than [`HEIGHT_TOLERANCE`].
    pub fn value_at(&self, height_percent: f64) -> Result<f64> {
        if !height_percent.is_finite()
            || height_percent < -HEIGHT_TOLERANCE
            || height_percent > 100.0 + HEIGHT_TOLERANCE
        {
            return Err(FeedError::MalformedChartInput(format!(
                "bar height {height_percent}% outside [0, 100]"
            )));
        }
        let h = height_percent.clamp(0.0, 100.0);
        Ok(self.min + (h / 100.0) * (self.max - self.min))
    }
}

/// Parses one axis label such as `1.50`, `−0.25` wrapped in `\u{202a}`/`\u{202c}`,
/// `1,200` or `12.5B`.
///
/// Directional formatting marks are stripped, the Unicode minus sign is
/// accepted, thousands separators are dropped and `K`/`M`/`B`/`T` suffixes
/// are expanded.
#[must_use]
pub fn parse_axis_label(label: &str) -> Option<f64> {
    let cleaned: String = label
        .chars()
        .filter(|c| !matches!(c, '\u{202a}' | '\u{202b}' | '\u{202c}' | '\u{200e}' | '\u{200f}' | ','))
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    let (number, multiplier) = match cleaned.chars().last()? {
        'K' | 'k' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        'T' => (&cleaned[..cleaned.len() - 1], 1e12),
        _ => (cleaned.as_str(), 1.0),
    };
    let number = number.trim_start_matches('$');
    number.parse::<f64>().ok().map(|v| v * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_height_is_midpoint() {
        let scale = ChartScale::new(0.0, 12.0).unwrap();
        assert_eq!(scale.value_at(50.0).unwrap(), 6.0);
        assert_eq!(scale.value_at(0.0).unwrap(), 0.0);
        assert_eq!(scale.value_at(100.0).unwrap(), 12.0);
    }

    #[test]
    fn test_rejects_degenerate_scale() {
        assert!(ChartScale::new(3.0, 3.0).is_err());
        assert!(ChartScale::new(4.0, 3.0).is_err());
        assert!(ChartScale::from_values(&[1.5, 1.5, 1.5]).is_err());
        assert!(ChartScale::from_values(&[]).is_err());
    }

    #[test]
    fn test_height_tolerance() {
        let scale = ChartScale::new(-1.0, 1.0).unwrap();
        assert_eq!(scale.value_at(100.005).unwrap(), 1.0);
        assert_eq!(scale.value_at(-0.005).unwrap(), -1.0);
        assert!(matches!(
            scale.value_at(100.5),
            Err(FeedError::MalformedChartInput(_))
        ));
        assert!(scale.value_at(-3.0).is_err());
        assert!(scale.value_at(f64::NAN).is_err());
    }

    #[test]
    fn test_parse_axis_labels() {
        assert_eq!(parse_axis_label("\u{202a}1.50\u{202c}"), Some(1.5));
        assert_eq!(parse_axis_label("\u{2212}0.25"), Some(-0.25));
        assert_eq!(parse_axis_label("1,200"), Some(1200.0));
        assert_eq!(parse_axis_label("12.5B"), Some(12.5e9));
        assert_eq!(parse_axis_label("$3M"), Some(3e6));
        assert_eq!(parse_axis_label("USD"), None);
        assert_eq!(parse_axis_label(""), None);
    }

    #[test]
    fn test_scale_from_labels() {
        let scale = ChartScale::from_axis_labels(&["3.00", "0.00", "1.50", "", "EPS"]).unwrap();
        assert_eq!(scale.min(), 0.0);
        assert_eq!(scale.max(), 3.0);
    }
}
