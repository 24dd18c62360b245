//! Registry fallback and estimate record assembly against scripted sources.

mod common;

use std::sync::Arc;

use common::Scripted;
use feed::{
    Capability, EstimateRecord, FeedError, Horizon, Metric, PeriodKind, RegistryConfig, SourceDescriptor,
    SourceRegistry, Symbol, UnavailableKind,
};

const ESTIMATES: [Capability; 2] = [Capability::EpsEstimates, Capability::RevenueEstimates];

#[tokio::test]
async fn failed_source_is_skipped_and_next_one_credited() {
    let primary = Arc::new(Scripted::new("primary").down(UnavailableKind::RateLimited));
    let secondary = Arc::new(Scripted::new("secondary").quote("AAPL", 190.0));
    let tertiary = Arc::new(Scripted::new("tertiary").quote("AAPL", 1.0));

    let mut registry = SourceRegistry::default();
    registry.register_ready(
        SourceDescriptor::new("primary", 10).with_capabilities(&[Capability::Prices]),
        primary.clone(),
    );
    registry.register_ready(
        SourceDescriptor::new("secondary", 20).with_capabilities(&[Capability::Prices]),
        secondary.clone(),
    );
    registry.register_ready(
        SourceDescriptor::new("tertiary", 30).with_capabilities(&[Capability::Prices]),
        tertiary.clone(),
    );

    let quote = registry.fetch_quote(&Symbol::new("AAPL")).await.unwrap();
    assert_eq!(quote.source.as_str(), "secondary");
    assert_eq!(quote.value.price, 190.0);
    assert_eq!(quote.attempts.len(), 1);
    assert_eq!(quote.attempts[0].kind, UnavailableKind::RateLimited);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
    assert_eq!(tertiary.calls(), 0);
}

#[tokio::test]
async fn exhausted_sources_name_every_attempt() {
    let mut registry = SourceRegistry::default();
    for (id, rank) in [("a", 10), ("b", 20)] {
        registry.register_ready(
            SourceDescriptor::new(id, rank).with_capabilities(&[Capability::Prices]),
            Arc::new(Scripted::new(id).down(UnavailableKind::Network)),
        );
    }

    match registry.fetch_quote(&Symbol::new("ZZZZ")).await {
        Err(FeedError::NoDataAvailable {
            symbol,
            capability,
            attempts,
        }) => {
            assert_eq!(symbol, "ZZZZ");
            assert_eq!(capability, Capability::Prices);
            let ids: Vec<_> = attempts.iter().map(|a| a.source_id.as_str()).collect();
            assert_eq!(ids, vec!["a", "b"]);
        }
        other => panic!("expected NoDataAvailable, got {other:?}"),
    }
}

#[tokio::test]
async fn price_policy_overrides_rank() {
    let config = RegistryConfig::default().with_priority(Capability::Prices, ["late"]);
    let mut registry = SourceRegistry::new(config);
    registry.register_ready(
        SourceDescriptor::new("early", 1).with_capabilities(&[Capability::Prices]),
        Arc::new(Scripted::new("early").quote("AAPL", 1.0)),
    );
    registry.register_ready(
        SourceDescriptor::new("late", 99).with_capabilities(&[Capability::Prices]),
        Arc::new(Scripted::new("late").quote("AAPL", 2.0)),
    );

    let quote = registry.fetch_quote(&Symbol::new("AAPL")).await.unwrap();
    assert_eq!(quote.source.as_str(), "late");
}

#[tokio::test]
async fn empty_series_falls_through_to_next_source() {
    let blank = Arc::new(Scripted::new("blank").estimates(Metric::Eps, PeriodKind::Quarterly, &[]));
    let full = Arc::new(Scripted::new("full").estimates(
        Metric::Eps,
        PeriodKind::Quarterly,
        &[("Q3'24", Some(0.62), Some(0.48))],
    ));

    let mut registry = SourceRegistry::default();
    registry.register_ready(
        SourceDescriptor::new("blank", 10).with_capabilities(&ESTIMATES),
        blank.clone(),
    );
    registry.register_ready(SourceDescriptor::new("full", 20).with_capabilities(&ESTIMATES), full);

    let series = registry
        .fetch_estimates(&Symbol::new("MU"), Metric::Eps, PeriodKind::Quarterly)
        .await
        .unwrap();
    assert_eq!(series.source.as_str(), "full");
    assert_eq!(series.value.len(), 1);
    assert_eq!(series.attempts.len(), 1);
    assert_eq!(series.attempts[0].source_id.as_str(), "blank");
    assert_eq!(series.attempts[0].kind, UnavailableKind::Empty);
    assert_eq!(blank.calls(), 1);
}

/// MU, quarterly EPS: the first source has the reported Q3 '24 figure, the
/// second only estimates, including a forecast quarter the first lacks.
#[tokio::test]
async fn mu_record_merges_reported_and_estimates() {
    let mut registry = SourceRegistry::default();
    registry.register_ready(
        SourceDescriptor::new("structured", 10).with_capabilities(&ESTIMATES),
        Arc::new(Scripted::new("structured").estimates(
            Metric::Eps,
            PeriodKind::Quarterly,
            &[("Q3'24", Some(0.62), None)],
        )),
    );
    registry.register_ready(
        SourceDescriptor::new("chart", 20).with_capabilities(&ESTIMATES),
        Arc::new(
            Scripted::new("chart")
                .estimates(
                    Metric::Eps,
                    PeriodKind::Quarterly,
                    &[("Q3'24", None, Some(0.48)), ("Q2'26", None, Some(8.23))],
                )
                .estimates(Metric::Eps, PeriodKind::Annual, &[("2025", Some(1.3), Some(1.2))]),
        ),
    );
    registry.register_ready(
        SourceDescriptor::new("offline", 30).with_capabilities(&ESTIMATES),
        Arc::new(Scripted::new("offline").down(UnavailableKind::Auth)),
    );

    let record = EstimateRecord::build(&registry, &Symbol::new("MU")).await.unwrap();

    let quarterly = &record.eps_quarterly.points;
    assert_eq!(quarterly.len(), 2);
    assert_eq!(quarterly[0].period_label, "Q3 '24");
    assert_eq!(quarterly[0].horizon, Horizon::Historical);
    assert_eq!(quarterly[0].reported, Some(0.62));
    assert_eq!(quarterly[0].estimate, Some(0.48));
    assert_eq!(quarterly[0].source_id.as_str(), "structured");
    assert_eq!(quarterly[1].period_label, "Q2 '26");
    assert_eq!(quarterly[1].horizon, Horizon::Forecast);
    assert_eq!(quarterly[1].reported, None);
    assert_eq!(quarterly[1].estimate, Some(8.23));

    assert_eq!(record.eps_annual.len(), 1);
    assert!(record.revenue_annual.is_empty());
    assert!(record.revenue_quarterly.is_empty());
    assert!(record.warnings.is_empty());
    assert!(
        record
            .unavailable
            .iter()
            .any(|u| u.source_id.as_str() == "offline" && u.kind == UnavailableKind::Auth)
    );
    assert_eq!(record.to_frame().unwrap().height(), 3);
}
