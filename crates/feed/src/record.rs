//! Canonical estimate record for one ticker.

use std::collections::BTreeSet;

use feed_core::{
    Capability, EstimateSeries, FeedError, Metric, PeriodKind, Result, SourceId, SourceUnavailable, Symbol,
};
use polars::prelude::*;
use tracing::{info, instrument};

use crate::merge::{EstimateMerger, MergeWarning};
use crate::registry::SourceRegistry;

/// Every view of a record, in build order.
pub const VIEWS: [(Metric, PeriodKind); 4] = [
    (Metric::Eps, PeriodKind::Annual),
    (Metric::Eps, PeriodKind::Quarterly),
    (Metric::Revenue, PeriodKind::Annual),
    (Metric::Revenue, PeriodKind::Quarterly),
];

/// Merged EPS and revenue series, annual and quarterly, for one ticker.
#[derive(Clone, Debug)]
pub struct EstimateRecord {
    /// Ticker.
    pub symbol: Symbol,
    /// Annual EPS.
    pub eps_annual: EstimateSeries,
    /// Quarterly EPS.
    pub eps_quarterly: EstimateSeries,
    /// Annual revenue.
    pub revenue_annual: EstimateSeries,
    /// Quarterly revenue.
    pub revenue_quarterly: EstimateSeries,
    /// Points excluded while merging.
    pub warnings: Vec<MergeWarning>,
    /// Sources that supplied at least one series.
    pub sources: BTreeSet<SourceId>,
    /// Sources that could not serve a view.
    pub unavailable: Vec<SourceUnavailable>,
}

impl EstimateRecord {
    /// Creates a record with empty series.
    #[must_use]
    pub fn empty(symbol: Symbol) -> Self {
        let series = |metric, kind| EstimateSeries::new(symbol.clone(), metric, kind);
        Self {
            eps_annual: series(Metric::Eps, PeriodKind::Annual),
            eps_quarterly: series(Metric::Eps, PeriodKind::Quarterly),
            revenue_annual: series(Metric::Revenue, PeriodKind::Annual),
            revenue_quarterly: series(Metric::Revenue, PeriodKind::Quarterly),
            symbol,
            warnings: Vec::new(),
            sources: BTreeSet::new(),
            unavailable: Vec::new(),
        }
    }

    /// Builds the record by asking every source for every view and merging
    /// the answers in priority order.
    ///
    /// A view no source could serve stays empty.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if no source serves a metric and
    /// [`FeedError::NoDataAvailable`] if every view came back empty.
    pub async fn build(registry: &SourceRegistry, symbol: &Symbol) -> Result<Self> {
        Self::build_metrics(registry, symbol, &[Metric::Eps, Metric::Revenue]).await
    }

    /// Like [`build`](Self::build), limited to the views of `metrics`. The
    /// other views stay empty.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if `metrics` is empty or no source
    /// serves one of them, and [`FeedError::NoDataAvailable`] naming the
    /// capability of the first requested metric if every requested view came
    /// back empty.
    #[instrument(skip(registry), fields(symbol = %symbol))]
    pub async fn build_metrics(registry: &SourceRegistry, symbol: &Symbol, metrics: &[Metric]) -> Result<Self> {
        let first = metrics
            .first()
            .copied()
            .ok_or_else(|| FeedError::Configuration("no metric requested".to_string()))?;
        let merger = EstimateMerger::new();
        let mut record = Self::empty(symbol.clone());

        for (metric, kind) in VIEWS.into_iter().filter(|(m, _)| metrics.contains(m)) {
            let (series, failures) = registry.collect_estimates(symbol, metric, kind).await?;
            record.unavailable.extend(failures);
            if series.is_empty() {
                continue;
            }
            record
                .sources
                .extend(series.iter().flat_map(|s| s.points.iter().map(|p| p.source_id.clone())));
            let outcome = merger.merge(&series)?;
            record.warnings.extend(outcome.warnings);
            *record.series_mut(metric, kind) = outcome.series;
        }

        if record.is_empty() {
            return Err(FeedError::NoDataAvailable {
                symbol: symbol.to_string(),
                capability: Capability::for_metric(first),
                attempts: record.unavailable,
            });
        }
        info!(
            sources = record.sources.len(),
            warnings = record.warnings.len(),
            "Built estimate record"
        );
        Ok(record)
    }

    /// Returns one view.
    #[must_use]
    pub const fn series(&self, metric: Metric, kind: PeriodKind) -> &EstimateSeries {
        match (metric, kind) {
            (Metric::Eps, PeriodKind::Annual) => &self.eps_annual,
            (Metric::Eps, PeriodKind::Quarterly) => &self.eps_quarterly,
            (Metric::Revenue, PeriodKind::Annual) => &self.revenue_annual,
            (Metric::Revenue, PeriodKind::Quarterly) => &self.revenue_quarterly,
        }
    }

    fn series_mut(&mut self, metric: Metric, kind: PeriodKind) -> &mut EstimateSeries {
        match (metric, kind) {
            (Metric::Eps, PeriodKind::Annual) => &mut self.eps_annual,
            (Metric::Eps, PeriodKind::Quarterly) => &mut self.eps_quarterly,
            (Metric::Revenue, PeriodKind::Annual) => &mut self.revenue_annual,
            (Metric::Revenue, PeriodKind::Quarterly) => &mut self.revenue_quarterly,
        }
    }

    /// Returns true if every view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        VIEWS.iter().all(|(m, k)| self.series(*m, *k).is_empty())
    }

    /// All views stacked into one frame with `metric` and `period_kind` columns.
    ///
    /// # Errors
    /// Returns [`FeedError::Other`] if the frame cannot be assembled.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut frames = Vec::with_capacity(VIEWS.len());
        for (metric, kind) in VIEWS {
            let series = self.series(metric, kind);
            let n = series.len();
            let mut frame = series.to_frame()?;
            frame
                .with_column(Column::new("metric".into(), vec![metric.as_str(); n]))
                .map_err(|e| FeedError::Other(e.to_string()))?;
            frame
                .with_column(Column::new("period_kind".into(), vec![kind.as_str(); n]))
                .map_err(|e| FeedError::Other(e.to_string()))?;
            frames.push(frame);
        }

        let mut iter = frames.into_iter();
        let mut stacked = iter
            .next()
            .ok_or_else(|| FeedError::Other("no views".to_string()))?;
        for frame in iter {
            stacked
                .vstack_mut(&frame)
                .map_err(|e| FeedError::Other(e.to_string()))?;
        }
        Ok(stacked)
    }
}
