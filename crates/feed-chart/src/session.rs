//! Rendering sessions that produce chart markup for one view at a time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use feed_core::{Metric, PeriodKind, SourceId, SourceResult, SourceUnavailable, Symbol, UnavailableKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One chart view: a metric at a period granularity for one symbol.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartView {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// EPS or revenue.
    pub metric: Metric,
    /// Annual or quarterly.
    pub period_kind: PeriodKind,
}

impl ChartView {
    /// Creates a view.
    #[must_use]
    pub const fn new(symbol: Symbol, metric: Metric, period_kind: PeriodKind) -> Self {
        Self {
            symbol,
            metric,
            period_kind,
        }
    }

    /// File name used for a captured rendering of this view, e.g. `MU_eps_quarterly.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.json", self.symbol, self.metric, self.period_kind)
    }
}

/// A bar as rendered: the period label under it and its inline style.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedBar {
    /// Period label shown under the bar.
    pub period_label: String,
    /// Inline style attribute carrying height and colour.
    pub style: String,
}

/// Raw output of rendering one view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedChart {
    /// Text of the value axis labels, top to bottom.
    pub axis_labels: Vec<String>,
    /// Bars in rendering order.
    pub bars: Vec<RenderedBar>,
}

/// A stateful rendering session.
///
/// Sessions are not shareable: callers own one exclusively and drive it one
/// view at a time.
#[async_trait]
pub trait ChartSession: Send + std::fmt::Debug {
    /// Renders a view and returns its raw chart.
    async fn render(&mut self, view: &ChartView) -> SourceResult<RenderedChart>;

    /// Releases the session. Rendering after close fails.
    async fn close(&mut self);
}

/// Session that replays captured renderings from a directory.
///
/// Each view is read from `<dir>/<SYMBOL>_<metric>_<kind>.json`, holding a
/// serialized [`RenderedChart`].
#[derive(Debug)]
pub struct FileChartSession {
    source_id: SourceId,
    dir: PathBuf,
    closed: bool,
}

impl FileChartSession {
    /// Creates a session reading from `dir`.
    #[must_use]
    pub fn new(source_id: impl Into<SourceId>, dir: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            dir: dir.into(),
            closed: false,
        }
    }

    /// Directory the session reads from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ChartSession for FileChartSession {
    async fn render(&mut self, view: &ChartView) -> SourceResult<RenderedChart> {
        if self.closed {
            return Err(SourceUnavailable::new(
                &self.source_id,
                UnavailableKind::SessionClosed,
                "session closed",
            ));
        }

        let path = self.dir.join(view.file_name());
        debug!(path = %path.display(), "Reading captured chart");
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceUnavailable::new(
                    &self.source_id,
                    UnavailableKind::NotFound,
                    format!("no captured chart at {}", path.display()),
                ));
            }
            Err(e) => {
                return Err(SourceUnavailable::new(
                    &self.source_id,
                    UnavailableKind::Network,
                    format!("{}: {e}", path.display()),
                ));
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            SourceUnavailable::new(&self.source_id, UnavailableKind::Parse, format!("{}: {e}", path.display()))
        })
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_session_reads_capture() {
        let dir = tempfile::tempdir().unwrap();
        let view = ChartView::new(Symbol::new("mu"), Metric::Eps, PeriodKind::Quarterly);
        assert_eq!(view.file_name(), "MU_eps_quarterly.json");

        std::fs::write(
            dir.path().join(view.file_name()),
            r##"{"axis_labels":["3.00","0.00"],"bars":[{"period_label":"Q3 '24","style":"height: 50%; background: #3179F5"}]}"##,
        )
        .unwrap();

        let mut session = FileChartSession::new("chart", dir.path());
        let chart = session.render(&view).await.unwrap();
        assert_eq!(chart.axis_labels.len(), 2);
        assert_eq!(chart.bars[0].period_label, "Q3 '24");

        session.close().await;
        let err = session.render(&view).await.unwrap_err();
        assert_eq!(err.kind, UnavailableKind::SessionClosed);
    }

    #[tokio::test]
    async fn test_missing_capture_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = FileChartSession::new("chart", dir.path());
        let err = session
            .render(&ChartView::new(Symbol::new("XYZ"), Metric::Revenue, PeriodKind::Annual))
            .await
            .unwrap_err();
        assert_eq!(err.kind, UnavailableKind::NotFound);
    }
}
