//! Provider adapter trait and source metadata.
//!
//! Every provider, whether it speaks a JSON API or reads values off a rendered
//! chart, is exposed through the same [`Source`] trait. Adapters never let a
//! provider-specific failure escape; they answer with a value or a
//! [`SourceUnavailable`](crate::error::SourceUnavailable).

use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SourceResult, SourceUnavailable},
    period::{Metric, PeriodKind},
    types::{EstimateSeries, Quote, Symbol},
};

/// Identifier of a source, e.g. `fmp` or `finnhub`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a new source id.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&SourceId> for SourceId {
    fn from(s: &SourceId) -> Self {
        s.clone()
    }
}

/// A kind of data a source can serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Regular-session quotes.
    Prices,
    /// EPS estimates and actuals.
    EpsEstimates,
    /// Revenue estimates and actuals.
    RevenueEstimates,
    /// Pre/post market prices.
    ExtendedHours,
}

impl Capability {
    /// Returns the capability that serves estimates for `metric`.
    #[must_use]
    pub const fn for_metric(metric: Metric) -> Self {
        match metric {
            Metric::Eps => Self::EpsEstimates,
            Metric::Revenue => Self::RevenueEstimates,
        }
    }

    /// Returns the snake case name of this capability.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::EpsEstimates => "eps_estimates",
            Self::RevenueEstimates => "revenue_estimates",
            Self::ExtendedHours => "extended_hours",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a source: what it serves and where it ranks.
///
/// Descriptors are created at process start and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source identifier.
    pub id: SourceId,
    /// Capabilities served by this source.
    pub capabilities: Vec<Capability>,
    /// Rank in the default fallback order; lower is tried first.
    pub priority_rank: u32,
    /// Whether the source needs a credential to be constructed.
    pub requires_credential: bool,
}

impl SourceDescriptor {
    /// Creates a descriptor with no capabilities.
    #[must_use]
    pub fn new(id: impl Into<SourceId>, priority_rank: u32) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
            priority_rank,
            requires_credential: false,
        }
    }

    /// Adds capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        for capability in capabilities {
            if !self.capabilities.contains(capability) {
                self.capabilities.push(*capability);
            }
        }
        self
    }

    /// Marks the source as requiring a credential.
    #[must_use]
    pub const fn requiring_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    /// Overrides the priority rank.
    #[must_use]
    pub const fn with_priority(mut self, priority_rank: u32) -> Self {
        self.priority_rank = priority_rank;
        self
    }

    /// Returns true if this source serves `capability`.
    #[must_use]
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Provider adapter.
///
/// Implementors map every provider failure onto [`SourceUnavailable`]; no
/// other error type crosses this boundary. Methods a source cannot serve
/// keep the default, which reports [`UnavailableKind::Unsupported`](crate::UnavailableKind::Unsupported).
#[async_trait]
pub trait Source: Send + Sync + Debug {
    /// Returns the identifier of this source.
    fn id(&self) -> &SourceId;

    /// Returns a description of this source.
    fn description(&self) -> &str;

    /// Fetches the current quote for a symbol.
    async fn fetch_quote(&self, symbol: &Symbol) -> SourceResult<Quote> {
        let _ = symbol;
        Err(SourceUnavailable::unsupported(self.id(), "quotes"))
    }

    /// Fetches an estimate series for a symbol.
    async fn fetch_estimates(
        &self,
        symbol: &Symbol,
        metric: Metric,
        period_kind: PeriodKind,
    ) -> SourceResult<EstimateSeries> {
        let _ = symbol;
        Err(SourceUnavailable::unsupported(
            self.id(),
            format!("{metric} {period_kind} estimates"),
        ))
    }

    /// Releases any session held by this source.
    ///
    /// Called once at process shutdown. The default does nothing.
    async fn shutdown(&self) {}
}
