use std::sync::Arc;

use wealthdesk_core::{
    AlphaVantageAdapter, BarsRequest, CurrencyPair, DataSource, Endpoint, FinnhubAdapter,
    FredAdapter, FxRequest, HealthState, IndicatorRequest, Interval, NewsApiAdapter, NewsRequest,
    NewsScope, PolygonAdapter, ProviderId, ProviderRegistry, QuoteRequest, SourceErrorKind, Symbol,
    UtcDateTime, YahooAdapter,
};

fn offline_sources() -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(YahooAdapter::default()),
        Arc::new(PolygonAdapter::default()),
        Arc::new(AlphaVantageAdapter::default()),
        Arc::new(FinnhubAdapter::default()),
        Arc::new(NewsApiAdapter::default()),
        Arc::new(FredAdapter::default()),
    ]
}

fn aapl() -> Symbol {
    Symbol::parse("AAPL").expect("symbol")
}

fn company_news() -> NewsRequest {
    let to = UtcDateTime::parse("2024-06-05T15:00:00Z").expect("ts");
    let from = UtcDateTime::parse("2024-05-29T15:00:00Z").expect("ts");
    NewsRequest::new(NewsScope::Company { symbol: aapl() }, from, to, 10).expect("request")
}

/// Calls `endpoint` on `source`; `Ok(())` when data came back.
async fn call(source: &dyn DataSource, endpoint: Endpoint) -> Result<(), SourceErrorKind> {
    let result = match endpoint {
        Endpoint::Quote => source
            .quote(QuoteRequest::single(aapl()))
            .await
            .map(|batch| assert_eq!(batch.quotes[0].symbol, aapl())),
        Endpoint::Bars => source
            .bars(BarsRequest::new(aapl(), Interval::OneDay, 30).expect("request"))
            .await
            .map(|series| assert_eq!(series.bars.len(), 30)),
        Endpoint::News => source.news(company_news()).await.map(|_| ()),
        Endpoint::Indicator => source
            .indicator(IndicatorRequest::new("UNRATE").expect("request"))
            .await
            .map(|indicator| assert_eq!(indicator.series_id, "UNRATE")),
        Endpoint::Fx => source
            .fx_rate(FxRequest {
                pair: CurrencyPair::new("USD", "CAD").expect("pair"),
            })
            .await
            .map(|rate| assert!(rate.rate > 0.0)),
    };
    result.map_err(|error| error.kind())
}

#[tokio::test]
async fn offline_adapters_serve_exactly_their_advertised_endpoints() {
    for source in offline_sources() {
        let capabilities = source.capabilities();
        for endpoint in Endpoint::ALL {
            let outcome = call(source.as_ref(), endpoint).await;
            if capabilities.supports(endpoint) {
                assert_eq!(outcome, Ok(()), "{} should serve {endpoint}", source.id());
            } else {
                assert_eq!(
                    outcome,
                    Err(SourceErrorKind::UnsupportedEndpoint),
                    "{} should refuse {endpoint}",
                    source.id()
                );
            }
        }
    }
}

#[tokio::test]
async fn offline_adapters_report_healthy_and_positive_freshness() {
    for source in offline_sources() {
        let health = source.health().await;
        assert_eq!(health.state, HealthState::Healthy, "{}", source.id());
        assert!(health.rate_available);
        assert!(!source.freshness().is_zero());
    }
}

#[tokio::test]
async fn offline_quotes_are_deterministic_per_symbol() {
    let yahoo = YahooAdapter::default();

    let first = yahoo.quote(QuoteRequest::single(aapl())).await.expect("quote");
    let second = yahoo.quote(QuoteRequest::single(aapl())).await.expect("quote");

    assert_eq!(first.quotes[0].price, second.quotes[0].price);
    assert_eq!(first.quotes[0].source, ProviderId::Yahoo);
}

#[test]
fn offline_registry_covers_every_provider_once() {
    let registry = ProviderRegistry::offline();

    assert_eq!(registry.providers(), ProviderId::ALL.to_vec());
    for provider in ProviderId::ALL {
        assert_eq!(registry.get(provider).map(|source| source.id()), Some(provider));
    }
}
