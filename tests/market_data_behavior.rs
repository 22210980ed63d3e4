//! Behavior-driven tests for market data aggregation.
//!
//! These tests drive the aggregator through its public API with scripted
//! providers and check what ends up in the snapshot.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use wealthdesk_core::{
    AggregatorConfig, BarSeries, BarsRequest, CacheStore, DataSource, Interval, MarketDataAggregator,
    ProviderChains, ProviderId, ProviderStatus, QuoteStatus, Symbol, TechnicalIndicators, YahooAdapter,
};
use wealthdesk_tests::{
    client, offline_context, quotes_only_config, scripted_aggregator, scripted_context, session_open,
    symbols, FixedSeries, HeadlineNews, QuietNews, ScriptedQuotes,
};

// =============================================================================
// Snapshot shape
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_every_provider_fails_snapshot_still_keys_every_requested_symbol() {
    // Given: Both quote providers fail for every symbol
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 10.0).failing(&["AAPL", "MSFT", "VTI"]);
    let polygon = ScriptedQuotes::new(ProviderId::Polygon, 10.0).failing(&["AAPL", "MSFT", "VTI"]);
    let aggregator = scripted_aggregator(
        vec![Arc::new(yahoo), Arc::new(polygon), Arc::new(QuietNews)],
        quotes_only_config(),
    );

    // When: A snapshot is requested with a repeated symbol
    let snapshot = aggregator
        .aggregate_at(&symbols(&["VTI", "AAPL", "MSFT", "AAPL"]), &client("USD"), session_open())
        .await
        .expect("failures are data, not errors");

    // Then: The key set equals the distinct request and every entry is failed
    let keys = snapshot.symbols.keys().map(Symbol::as_str).collect::<Vec<_>>();
    assert_eq!(keys, vec!["AAPL", "MSFT", "VTI"]);
    assert_eq!(snapshot.failed_symbols().len(), 3);
    for data in snapshot.symbols.values() {
        assert_eq!(data.status, QuoteStatus::Failed);
        assert!(data.quote.is_none());
        assert_eq!(data.source_chain, vec![ProviderId::Yahoo, ProviderId::Polygon]);
        assert!(!data.errors.is_empty());
    }

    // And: The snapshot serializes for downstream consumers
    let json = serde_json::to_value(&snapshot).expect("serialize");
    assert_eq!(json["symbols"]["VTI"]["status"], "failed");
}

#[tokio::test(start_paused = true)]
async fn when_primary_fails_for_one_symbol_system_falls_back_for_that_symbol_only() {
    // Given: Yahoo fails for MSFT but serves AAPL; Polygon serves both
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 100.0).failing(&["MSFT"]);
    let polygon = ScriptedQuotes::new(ProviderId::Polygon, 101.0);
    let polygon_calls = polygon.calls();
    let aggregator = scripted_aggregator(
        vec![Arc::new(yahoo), Arc::new(polygon), Arc::new(QuietNews)],
        quotes_only_config(),
    );

    // When: Both symbols are aggregated
    let snapshot = aggregator
        .aggregate_at(&symbols(&["AAPL", "MSFT"]), &client("USD"), session_open())
        .await
        .expect("snapshot");

    // Then: AAPL comes from the primary and MSFT from the fallback
    let aapl = snapshot.get(&Symbol::parse("AAPL").expect("symbol")).expect("aapl");
    assert_eq!(aapl.status, QuoteStatus::Ok);
    assert_eq!(aapl.quote.as_ref().map(|quote| quote.source), Some(ProviderId::Yahoo));

    let msft = snapshot.get(&Symbol::parse("MSFT").expect("symbol")).expect("msft");
    assert_eq!(msft.status, QuoteStatus::Fallback);
    assert_eq!(msft.quote.as_ref().map(|quote| quote.price), Some(101.0));
    assert_eq!(msft.source_chain, vec![ProviderId::Yahoo, ProviderId::Polygon]);
    assert_eq!(msft.errors[0].provider, ProviderId::Yahoo);
    assert_eq!(polygon_calls.load(Ordering::SeqCst), 1);

    // And: Provider status reflects the mixed outcome
    assert_eq!(snapshot.provider_status.get(&ProviderId::Yahoo), Some(&ProviderStatus::Degraded));
    assert_eq!(snapshot.provider_status.get(&ProviderId::Polygon), Some(&ProviderStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn when_quotes_fail_news_and_macro_series_still_reach_the_snapshot() {
    // Given: Yahoo fails for both symbols, Polygon rescues MSFT only,
    // and news plus FRED series are served normally
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 100.0).failing(&["AAPL", "MSFT"]);
    let polygon = ScriptedQuotes::new(ProviderId::Polygon, 101.0).failing(&["AAPL"]);
    let config = AggregatorConfig {
        chains: ProviderChains {
            quote: vec![ProviderId::Yahoo, ProviderId::Polygon],
            bars: Vec::new(),
            news: vec![ProviderId::Finnhub],
            company_news: vec![ProviderId::Finnhub],
            indicator: vec![ProviderId::Fred],
            fx: Vec::new(),
        },
        economic_series: vec![String::from("UNRATE"), String::from("GS10")],
        ..AggregatorConfig::default()
    };
    let aggregator = scripted_aggregator(
        vec![Arc::new(yahoo), Arc::new(polygon), Arc::new(HeadlineNews), Arc::new(FixedSeries(4.1))],
        config,
    );
    let aapl = Symbol::parse("AAPL").expect("symbol");
    let msft = Symbol::parse("MSFT").expect("symbol");

    // When: Both symbols are aggregated
    let snapshot = aggregator
        .aggregate_at(&[aapl.clone(), msft.clone()], &client("USD"), session_open())
        .await
        .expect("snapshot");

    // Then: Quote outcomes are a failure and a fallback
    assert_eq!(snapshot.get(&aapl).expect("aapl").status, QuoteStatus::Failed);
    assert_eq!(snapshot.get(&msft).expect("msft").status, QuoteStatus::Fallback);

    // And: Each symbol still carries its own company news
    let aapl_news: Vec<_> = snapshot.news_for(&aapl).map(|item| item.headline.as_str()).collect();
    let msft_news: Vec<_> = snapshot.news_for(&msft).map(|item| item.headline.as_str()).collect();
    assert_eq!(aapl_news, vec!["AAPL beats estimates"]);
    assert_eq!(msft_news, vec!["MSFT beats estimates"]);
    assert_eq!(snapshot.macro_news().count(), 1);

    // And: Macro series arrive in configured order
    let series: Vec<_> = snapshot.indicators.iter().map(|indicator| indicator.series_id.as_str()).collect();
    assert_eq!(series, vec!["UNRATE", "GS10"]);
    assert!(snapshot.indicators.iter().all(|indicator| indicator.value == 4.1));
    assert_eq!(snapshot.provider_status.get(&ProviderId::Fred), Some(&ProviderStatus::Success));
    assert_eq!(snapshot.provider_status.get(&ProviderId::Finnhub), Some(&ProviderStatus::Success));
    assert!(!snapshot.timed_out);
}

// =============================================================================
// Time bounds
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_a_provider_hangs_aggregation_returns_a_partial_snapshot_at_the_deadline() {
    // Given: Yahoo never answers for NVDA and the aggregation budget is three seconds
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 50.0).hanging(&["NVDA"]);
    let config = AggregatorConfig {
        aggregation_timeout: Duration::from_secs(3),
        provider_timeout: Duration::from_secs(120),
        ..quotes_only_config()
    };
    let aggregator = scripted_aggregator(vec![Arc::new(yahoo), Arc::new(QuietNews)], config);
    let started = tokio::time::Instant::now();

    // When: The snapshot is built
    let snapshot = aggregator
        .aggregate_at(&symbols(&["NVDA", "AAPL"]), &client("USD"), session_open())
        .await
        .expect("partial snapshot");

    // Then: It returns at the deadline with the hung symbol marked failed
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(snapshot.timed_out);
    assert_eq!(snapshot.symbols.len(), 2);
    let nvda = snapshot.get(&Symbol::parse("NVDA").expect("symbol")).expect("nvda");
    assert!(nvda.is_failed());
    assert_eq!(nvda.errors[0].code, "aggregation.timeout");
    assert!(snapshot.warnings.iter().any(|warning| warning.contains("NVDA")));
    assert!(snapshot.quote(&Symbol::parse("AAPL").expect("symbol")).is_some());
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_two_aggregators_share_a_context_the_second_reads_the_first_ones_quotes() {
    // Given: Two aggregators built from clones of one context
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 42.0);
    let calls = yahoo.calls();
    let context = scripted_context(vec![Arc::new(yahoo), Arc::new(QuietNews)]);
    let first = MarketDataAggregator::new(context.clone(), quotes_only_config());
    let second = MarketDataAggregator::new(context, quotes_only_config());
    let requested = symbols(&["AAPL"]);

    // When: Each builds a snapshot within the quote TTL
    first
        .aggregate_at(&requested, &client("USD"), session_open())
        .await
        .expect("first");
    let snapshot = second
        .aggregate_at(&requested, &client("USD"), session_open())
        .await
        .expect("second");

    // Then: The provider is called once and the second snapshot is cache-served
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let aapl = snapshot.get(&requested[0]).expect("aapl");
    assert_eq!(aapl.status, QuoteStatus::Cached);
    assert_eq!(aapl.quote.as_ref().map(|quote| quote.price), Some(42.0));
}

#[tokio::test(start_paused = true)]
async fn when_the_quote_ttl_elapses_system_fetches_again() {
    // Given: A cached quote
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 42.0);
    let calls = yahoo.calls();
    let aggregator = scripted_aggregator(vec![Arc::new(yahoo), Arc::new(QuietNews)], quotes_only_config());
    let requested = symbols(&["AAPL"]);
    aggregator
        .aggregate_at(&requested, &client("USD"), session_open())
        .await
        .expect("first");

    // When: More than the sixty second quote TTL passes
    tokio::time::advance(Duration::from_secs(61)).await;
    let snapshot = aggregator
        .aggregate_at(&requested, &client("USD"), session_open())
        .await
        .expect("second");

    // Then: The provider is asked again
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(snapshot.get(&requested[0]).map(|data| data.status), Some(QuoteStatus::Ok));
}

#[tokio::test(start_paused = true)]
async fn when_the_cache_is_disabled_every_snapshot_hits_the_provider() {
    // Given: An aggregator with caching turned off
    let yahoo = ScriptedQuotes::new(ProviderId::Yahoo, 42.0);
    let calls = yahoo.calls();
    let context = scripted_context(vec![Arc::new(yahoo), Arc::new(QuietNews)])
        .with_cache(CacheStore::disabled());
    let aggregator = MarketDataAggregator::new(context, quotes_only_config());
    let requested = symbols(&["AAPL"]);

    // When: The same snapshot is requested twice
    for _ in 0..2 {
        aggregator
            .aggregate_at(&requested, &client("USD"), session_open())
            .await
            .expect("snapshot");
    }

    // Then: Both requests reach the provider
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Enrichment
// =============================================================================

#[tokio::test]
async fn when_indicators_are_computed_twice_from_one_series_the_results_match() {
    // Given: A year of offline daily bars
    let symbol = Symbol::parse("AAPL").expect("symbol");
    let series = YahooAdapter::default()
        .bars(BarsRequest::new(symbol.clone(), Interval::OneDay, 250).expect("request"))
        .await
        .expect("bars");

    // When: Technicals are derived twice
    let first = TechnicalIndicators::from_series(&series).expect("enough history");
    let second = TechnicalIndicators::from_series(&series).expect("enough history");

    // Then: The derivation is pure and fully populated
    assert_eq!(first, second);
    assert_eq!(Some(first.last_close), series.last_close());
    assert!(first.sma_200.is_some());
    let rsi = first.rsi.expect("rsi");
    assert!((0.0..=100.0).contains(&rsi));

    // And: A short history yields no technicals at all
    let short = BarSeries::new(symbol, Interval::OneDay, series.bars[..5].to_vec(), ProviderId::Yahoo);
    assert!(TechnicalIndicators::from_series(&short).is_none());
}

#[tokio::test]
async fn when_the_client_reports_in_cad_snapshot_carries_a_usd_cad_rate() {
    // Given: The offline registry and a CAD-based client
    let aggregator = MarketDataAggregator::new(offline_context(), AggregatorConfig::default());

    // When: A snapshot is built
    let snapshot = aggregator
        .aggregate_at(&symbols(&["SHOP", "RY"]), &client("CAD"), session_open())
        .await
        .expect("snapshot");

    // Then: One FX rate quotes CAD per USD and every other kind is populated
    assert_eq!(snapshot.fx_rates.len(), 1);
    assert_eq!(snapshot.fx_rates[0].pair.to_string(), "USD/CAD");
    assert!(snapshot.fx_rates[0].rate > 0.0);
    assert!(!snapshot.news.is_empty());
    assert!(!snapshot.indicators.is_empty());
    assert_eq!(
        snapshot.sentiment_summary.total,
        snapshot.news.len(),
        "every headline is scored"
    );
}
