//! Chart-backed estimate source driven by a single session worker.

use async_trait::async_trait;
use feed_core::{
    Capability, EstimateSeries, FeedError, Metric, PeriodKind, Source, SourceDescriptor, SourceId,
    SourceResult, SourceUnavailable, Symbol, UnavailableKind,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::extract::{Bar, ChartValueExtractor, ColorMapping};
use crate::scale::ChartScale;
use crate::session::{ChartSession, ChartView, RenderedChart};

/// Default identifier of the chart source.
pub const CHART_SOURCE_ID: &str = "chart";

const COMMAND_BUFFER: usize = 16;

enum Command {
    Render {
        view: ChartView,
        reply: oneshot::Sender<SourceResult<RenderedChart>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Estimate source that reads values off rendered bar charts.
///
/// The rendering session is owned by one worker task. Requests are queued
/// over a channel and served one at a time, so concurrent callers never
/// touch the session at once.
#[derive(Debug)]
pub struct ChartSource {
    id: SourceId,
    extractor: ChartValueExtractor,
    commands: mpsc::Sender<Command>,
}

impl ChartSource {
    /// Spawns the session worker on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns [`UnavailableKind::NotConfigured`] when called outside a runtime.
    pub fn spawn<S>(id: impl Into<SourceId>, session: S, mapping: ColorMapping) -> SourceResult<Self>
    where
        S: ChartSession + 'static,
    {
        let id = id.into();
        let handle = Handle::try_current()
            .map_err(|e| SourceUnavailable::not_configured(&id, format!("no async runtime: {e}")))?;
        if mapping.is_empty() {
            return Err(SourceUnavailable::not_configured(&id, "empty colour mapping"));
        }

        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        handle.spawn(run_session(id.clone(), Box::new(session), rx));
        info!(source = %id, "Chart session worker started");

        Ok(Self {
            id,
            extractor: ChartValueExtractor::new(mapping),
            commands,
        })
    }

    /// Default descriptor for a chart source with the given id.
    #[must_use]
    pub fn descriptor(id: impl Into<SourceId>) -> SourceDescriptor {
        SourceDescriptor::new(id, 35)
            .with_capabilities(&[Capability::EpsEstimates, Capability::RevenueEstimates])
    }

    async fn render(&self, view: ChartView) -> SourceResult<RenderedChart> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Render { view, reply })
            .await
            .map_err(|_| self.closed())?;
        response.await.map_err(|_| self.closed())?
    }

    fn closed(&self) -> SourceUnavailable {
        SourceUnavailable::new(&self.id, UnavailableKind::SessionClosed, "chart session closed")
    }

    fn to_series(
        &self,
        chart: &RenderedChart,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> Result<EstimateSeries, FeedError> {
        let scale = ChartScale::from_axis_labels(&chart.axis_labels[..])?;
        let bars = chart
            .bars
            .iter()
            .map(|b| Bar::from_style(b.period_label.clone(), &b.style))
            .collect::<Result<Vec<_>, _>>()?;
        let points = self.extractor.extract(&scale, &bars, period_kind, &self.id)?;
        Ok(EstimateSeries::new(symbol.clone(), metric, period_kind).with_points(points))
    }
}

#[async_trait]
impl Source for ChartSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        "Rendered bar charts - Reported and estimated EPS and revenue"
    }

    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        let chart = self
            .render(ChartView::new(symbol.clone(), metric, period_kind))
            .await?;

        let series = self
            .to_series(&chart, symbol, metric, period_kind)
            .map_err(|e| SourceUnavailable::new(&self.id, UnavailableKind::Malformed, e.to_string()))?;
        debug!(symbol = %symbol, %metric, points = series.len(), "Chart series extracted");

        if series.is_empty() {
            return Err(SourceUnavailable::empty(
                &self.id,
                format!("no bars in {metric} {period_kind} chart for {symbol}"),
            ));
        }
        Ok(series)
    }

    async fn shutdown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_session(id: SourceId, mut session: Box<dyn ChartSession>, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Render { view, reply } => {
                let result = session.render(&view).await;
                if let Err(e) = &result {
                    warn!(source = %id, symbol = %view.symbol, error = %e, "Chart render failed");
                }
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                session.close().await;
                info!(source = %id, "Chart session closed");
                let _ = reply.send(());
                return;
            }
        }
    }
    session.close().await;
    debug!(source = %id, "Chart session dropped");
}
