//! Source registry with lazily built clients and priority fallback.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use feed_core::{
    Capability, EstimateSeries, FeedError, Metric, PeriodKind, Quote, Result, Source,
    SourceDescriptor, SourceId, SourceResult, SourceUnavailable, Symbol, UnavailableKind,
};
use futures::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Builds a source on first use.
pub type SourceFactory = Box<dyn Fn() -> SourceResult<Arc<dyn Source>> + Send + Sync>;

/// Boxes a closure as a [`SourceFactory`].
pub fn factory<F>(build: F) -> SourceFactory
where
    F: Fn() -> SourceResult<Arc<dyn Source>> + Send + Sync + 'static,
{
    Box::new(build)
}

/// Default time allowed for one attempt against one source.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);

/// Registry settings fixed at construction.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Time allowed for one attempt against one source.
    pub attempt_timeout: Duration,
    /// Per-capability fallback order overriding descriptor ranks.
    ///
    /// Listed sources are tried first, in list order. Sources not listed
    /// follow in ascending rank.
    pub priorities: HashMap<Capability, Vec<SourceId>>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            priorities: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Sets the attempt timeout.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Overrides the fallback order for one capability.
    #[must_use]
    pub fn with_priority<I, S>(mut self, capability: Capability, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceId>,
    {
        self.priorities
            .insert(capability, order.into_iter().map(Into::into).collect());
        self
    }
}

/// A value together with the source that produced it.
#[derive(Clone, Debug)]
pub struct Sourced<T> {
    /// The value.
    pub value: T,
    /// The source that answered.
    pub source: SourceId,
    /// Sources tried before it, with their failure reasons.
    pub attempts: Vec<SourceUnavailable>,
}

struct Slot {
    descriptor: SourceDescriptor,
    factory: SourceFactory,
    handle: OnceCell<Arc<dyn Source>>,
}

impl Slot {
    /// Returns the client, building it on first use.
    ///
    /// A failed build leaves the cell empty, so the next use tries again.
    async fn client(&self) -> SourceResult<Arc<dyn Source>> {
        self.handle
            .get_or_try_init(|| async { (self.factory)() })
            .await
            .cloned()
    }
}

/// Owns every source and decides which one to ask for what.
///
/// Each source is described by a static [`SourceDescriptor`] and built at most
/// once, the first time it is needed. For a capability, sources are tried in
/// ascending `priority_rank` (or the configured override) until one answers.
/// Failures of single sources are logged and never surface unless every
/// source fails.
///
/// # Example
///
/// ```rust,ignore
/// use feed::{RegistryConfig, Settings, SourceRegistry};
/// use feed_core::Symbol;
///
/// let registry = SourceRegistry::from_settings(&Settings::from_env(), RegistryConfig::default());
/// let quote = registry.fetch_quote(&Symbol::new("AAPL")).await?;
/// println!("{} from {}", quote.value.price, quote.source);
/// ```
pub struct SourceRegistry {
    slots: Vec<Slot>,
    config: RegistryConfig,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field(
                "sources",
                &self
                    .slots
                    .iter()
                    .map(|s| (s.descriptor.id.as_str(), s.handle.initialized()))
                    .collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            slots: Vec::new(),
            config,
        }
    }

    /// Registers a source built on first use.
    ///
    /// A source registered under an id that is already present replaces it.
    pub fn register(&mut self, descriptor: SourceDescriptor, factory: SourceFactory) {
        debug!(
            source = %descriptor.id,
            rank = descriptor.priority_rank,
            "Registering source"
        );
        self.slots.retain(|s| s.descriptor.id != descriptor.id);
        self.slots.push(Slot {
            descriptor,
            factory,
            handle: OnceCell::new(),
        });
    }

    /// Registers a source that is already built.
    pub fn register_ready(&mut self, descriptor: SourceDescriptor, source: Arc<dyn Source>) {
        let ready = Arc::clone(&source);
        self.register(descriptor, factory(move || Ok(Arc::clone(&ready))));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_source(mut self, descriptor: SourceDescriptor, factory: SourceFactory) -> Self {
        self.register(descriptor, factory);
        self
    }

    /// Registry settings.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Every registered descriptor, in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.slots.iter().map(|s| &s.descriptor)
    }

    /// Ids of the sources serving `capability`, in the order they are tried.
    #[must_use]
    pub fn fallback_order(&self, capability: Capability) -> Vec<SourceId> {
        self.ordered(capability)
            .into_iter()
            .map(|s| s.descriptor.id.clone())
            .collect()
    }

    fn ordered(&self, capability: Capability) -> Vec<&Slot> {
        let mut capable: Vec<&Slot> = self
            .slots
            .iter()
            .filter(|s| s.descriptor.has(capability))
            .collect();
        capable.sort_by_key(|s| s.descriptor.priority_rank);

        let Some(policy) = self.config.priorities.get(&capability) else {
            return capable;
        };
        let mut ordered = Vec::with_capacity(capable.len());
        for id in policy {
            if let Some(pos) = capable.iter().position(|s| &s.descriptor.id == id) {
                ordered.push(capable.remove(pos));
            }
        }
        ordered.extend(capable);
        ordered
    }

    /// Runs `op` against each source serving `capability` in priority order
    /// and returns the first success.
    ///
    /// A failure, a timeout or an empty answer from one source moves on to the
    /// next. Each attempt is logged with its outcome.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if no source serves the capability
    /// and [`FeedError::NoDataAvailable`] listing every attempt if all fail.
    pub async fn fetch_with_fallback<T, F, Fut>(
        &self,
        symbol: &Symbol,
        capability: Capability,
        op: F,
    ) -> Result<Sourced<T>>
    where
        F: Fn(Arc<dyn Source>) -> Fut,
        Fut: Future<Output = SourceResult<T>>,
    {
        let slots = self.ordered(capability);
        if slots.is_empty() {
            return Err(FeedError::Configuration(format!(
                "no source registered for {capability}"
            )));
        }

        let mut attempts = Vec::new();
        for slot in slots {
            match self.attempt(slot, symbol, capability, &op).await {
                Ok(value) => {
                    return Ok(Sourced {
                        value,
                        source: slot.descriptor.id.clone(),
                        attempts,
                    });
                }
                Err(e) => attempts.push(e),
            }
        }

        Err(FeedError::NoDataAvailable {
            symbol: symbol.to_string(),
            capability,
            attempts,
        })
    }

    async fn attempt<T, F, Fut>(
        &self,
        slot: &Slot,
        symbol: &Symbol,
        capability: Capability,
        op: &F,
    ) -> SourceResult<T>
    where
        F: Fn(Arc<dyn Source>) -> Fut,
        Fut: Future<Output = SourceResult<T>>,
    {
        let id = &slot.descriptor.id;
        let result = match slot.client().await {
            Ok(client) => tokio::time::timeout(self.config.attempt_timeout, op(client))
                .await
                .unwrap_or_else(|_| {
                    Err(SourceUnavailable::new(
                        id,
                        UnavailableKind::Timeout,
                        format!("no answer within {:?}", self.config.attempt_timeout),
                    ))
                }),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => info!(source = %id, symbol = %symbol, %capability, outcome = "success", "Source attempt"),
            Err(e) if e.kind == UnavailableKind::NotConfigured => info!(
                source = %id,
                symbol = %symbol,
                %capability,
                outcome = e.kind.outcome(),
                reason = %e.detail,
                "Source attempt"
            ),
            Err(e) => warn!(
                source = %id,
                symbol = %symbol,
                %capability,
                outcome = e.kind.outcome(),
                kind = %e.kind,
                reason = %e.detail,
                "Source attempt"
            ),
        }
        result
    }

    /// Fetches a quote from the first source that has one.
    ///
    /// # Errors
    /// See [`fetch_with_fallback`](Self::fetch_with_fallback).
    pub async fn fetch_quote(&self, symbol: &Symbol) -> Result<Sourced<Quote>> {
        self.fetch_with_fallback(symbol, Capability::Prices, |source| {
            let symbol = symbol.clone();
            async move { source.fetch_quote(&symbol).await }
        })
        .await
    }

    /// Fetches an estimate series from the first source that has a non-empty one.
    ///
    /// # Errors
    /// See [`fetch_with_fallback`](Self::fetch_with_fallback).
    pub async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> Result<Sourced<EstimateSeries>> {
        self.fetch_with_fallback(symbol, Capability::for_metric(metric), |source| {
            let symbol = symbol.clone();
            async move { non_empty(source.as_ref(), source.fetch_estimates(&symbol, metric, period_kind).await) }
        })
        .await
    }

    /// Asks every source serving the metric and returns the series that came
    /// back, in priority order, together with the failures.
    ///
    /// Sources are queried concurrently. This is the input side of a merge.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if no source serves the metric.
    pub async fn collect_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> Result<(Vec<EstimateSeries>, Vec<SourceUnavailable>)> {
        let capability = Capability::for_metric(metric);
        let slots = self.ordered(capability);
        if slots.is_empty() {
            return Err(FeedError::Configuration(format!(
                "no source registered for {capability}"
            )));
        }

        let op = |source: Arc<dyn Source>| {
            let symbol = symbol.clone();
            async move { non_empty(source.as_ref(), source.fetch_estimates(&symbol, metric, period_kind).await) }
        };
        let results = join_all(
            slots
                .iter()
                .map(|slot| self.attempt(slot, symbol, capability, &op)),
        )
        .await;

        let mut series = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(s) => series.push(s),
                Err(e) => failures.push(e),
            }
        }
        Ok((series, failures))
    }

    /// Releases every source that was built.
    pub async fn shutdown(&self) {
        for slot in &self.slots {
            if let Some(source) = slot.handle.get() {
                debug!(source = %slot.descriptor.id, "Shutting down source");
                source.shutdown().await;
            }
        }
    }
}

fn non_empty(source: &dyn Source, result: SourceResult<EstimateSeries>) -> SourceResult<EstimateSeries> {
    match result {
        Ok(series) if series.is_empty() => Err(SourceUnavailable::empty(
            source.id(),
            format!("empty {} {} series", series.metric, series.period_kind),
        )),
        other => other,
    }
}
