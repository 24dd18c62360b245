//! Merging per-source estimate series into one canonical series.

use std::collections::BTreeMap;

use feed_core::{EstimatePoint, EstimateSeries, FeedError, PeriodKey, Result, SourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A point that was left out of a merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeWarning {
    /// Source that supplied the point.
    pub source_id: SourceId,
    /// Label as supplied.
    pub period_label: String,
    /// Why it was excluded.
    pub reason: String,
}

impl std::fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}: {}", self.source_id, self.period_label, self.reason)
    }
}

/// Result of a merge.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
    /// Canonical series, sorted by period.
    pub series: EstimateSeries,
    /// Points that could not be placed.
    pub warnings: Vec<MergeWarning>,
}

#[derive(Default)]
struct Resolved {
    reported: Option<(f64, SourceId)>,
    estimate: Option<(f64, SourceId)>,
}

/// Combines estimate series for one symbol, metric and period kind.
///
/// Inputs are given in priority order, highest first. For each period the
/// reported value and the estimate are resolved independently: each is the
/// first non-null value in priority order. Values are never averaged.
///
/// A period is historical iff some source reported it. Output periods are
/// unique and sorted by [`PeriodKey`], and labels are rewritten to their
/// canonical form (`2024`, `Q3 '24`). Points whose label does not parse are
/// dropped and reported as [`MergeWarning`]s.
///
/// Merging is idempotent: `merge([merge([a, b]), b]) == merge([a, b])`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EstimateMerger;

impl EstimateMerger {
    /// Creates a merger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Merges `inputs`, highest priority first.
    ///
    /// # Errors
    /// Returns [`FeedError::InvalidParameter`] if `inputs` is empty or the
    /// series disagree on symbol, metric or period kind.
    pub fn merge(&self, inputs: &[EstimateSeries]) -> Result<MergeOutcome> {
        let first = inputs
            .first()
            .ok_or_else(|| FeedError::InvalidParameter("nothing to merge".to_string()))?;
        if let Some(other) = inputs.iter().find(|s| {
            s.symbol != first.symbol || s.metric != first.metric || s.period_kind != first.period_kind
        }) {
            return Err(FeedError::InvalidParameter(format!(
                "cannot merge {} {} {} with {} {} {}",
                first.symbol, first.metric, first.period_kind, other.symbol, other.metric, other.period_kind
            )));
        }

        let mut periods: BTreeMap<PeriodKey, Resolved> = BTreeMap::new();
        let mut warnings = Vec::new();

        for series in inputs {
            for point in &series.points {
                let key = match PeriodKey::parse(&point.period_label, series.period_kind) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(
                            source = %point.source_id,
                            period = %point.period_label,
                            "Excluding point with unsupported period label"
                        );
                        warnings.push(MergeWarning {
                            source_id: point.source_id.clone(),
                            period_label: point.period_label.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };
                if point.reported.is_none() && point.estimate.is_none() {
                    continue;
                }

                let slot = periods.entry(key).or_default();
                if slot.reported.is_none() {
                    slot.reported = point.reported.map(|v| (v, point.source_id.clone()));
                }
                if slot.estimate.is_none() {
                    slot.estimate = point.estimate.map(|v| (v, point.source_id.clone()));
                }
            }
        }

        let points: Vec<EstimatePoint> = periods
            .into_iter()
            .map(|(key, resolved)| {
                let source = resolved
                    .reported
                    .as_ref()
                    .or(resolved.estimate.as_ref())
                    .map(|(_, id)| id.clone())
                    .unwrap_or_default();
                EstimatePoint::new(
                    key.label(),
                    first.period_kind,
                    resolved.reported.map(|(v, _)| v),
                    resolved.estimate.map(|(v, _)| v),
                    source,
                )
            })
            .collect();

        debug!(
            symbol = %first.symbol,
            metric = %first.metric,
            sources = inputs.len(),
            periods = points.len(),
            "Merged estimate series"
        );

        Ok(MergeOutcome {
            series: EstimateSeries::new(first.symbol.clone(), first.metric, first.period_kind)
                .with_points(points),
            warnings,
        })
    }
}
