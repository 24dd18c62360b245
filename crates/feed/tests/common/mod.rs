//! Scripted in-process sources for integration tests.

#![allow(dead_code, unreachable_pub)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use feed::{
    EstimatePoint, EstimateSeries, MarketState, Metric, PeriodKind, Quote, Source, SourceId, SourceResult,
    SourceUnavailable, Symbol, UnavailableKind,
};

/// A source that answers from fixed tables and counts its calls.
#[derive(Debug, Default)]
pub struct Scripted {
    id: SourceId,
    quotes: Mutex<HashMap<String, f64>>,
    estimates: HashMap<(Metric, PeriodKind), Vec<(String, Option<f64>, Option<f64>)>>,
    down: Option<UnavailableKind>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(id: &str) -> Self {
        Self {
            id: SourceId::new(id),
            ..Self::default()
        }
    }

    pub fn down(mut self, kind: UnavailableKind) -> Self {
        self.down = Some(kind);
        self
    }

    pub fn quote(self, symbol: &str, price: f64) -> Self {
        self.set_quote(symbol, price);
        self
    }

    pub fn set_quote(&self, symbol: &str, price: f64) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    pub fn estimates(
        mut self,
        metric: Metric,
        kind: PeriodKind,
        points: &[(&str, Option<f64>, Option<f64>)],
    ) -> Self {
        self.estimates.insert(
            (metric, kind),
            points
                .iter()
                .map(|(label, reported, estimate)| ((*label).to_string(), *reported, *estimate))
                .collect(),
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for Scripted {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn description(&self) -> &str {
        "scripted test source"
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> SourceResult<Quote> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.down {
            return Err(SourceUnavailable::new(&self.id, kind, "scripted outage"));
        }
        let price = self
            .quotes
            .lock()
            .unwrap()
            .get(symbol.as_str())
            .copied()
            .ok_or_else(|| SourceUnavailable::new(&self.id, UnavailableKind::NotFound, symbol.as_str()))?;
        Ok(Quote::new(symbol.clone(), price, Utc::now())
            .with_previous_close(Some(price * 0.9))
            .with_post_market_price(Some(price * 1.01))
            .with_market_state(MarketState::Post))
    }

    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.down {
            return Err(SourceUnavailable::new(&self.id, kind, "scripted outage"));
        }
        let points = self
            .estimates
            .get(&(metric, period_kind))
            .ok_or_else(|| SourceUnavailable::unsupported(&self.id, "view not scripted"))?;
        Ok(EstimateSeries::new(symbol.clone(), metric, period_kind).with_points(
            points
                .iter()
                .map(|(label, reported, estimate)| {
                    EstimatePoint::new(label.as_str(), period_kind, *reported, *estimate, &self.id)
                })
                .collect(),
        ))
    }
}
