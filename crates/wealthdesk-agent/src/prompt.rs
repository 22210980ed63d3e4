//! Builds the model request for a stage from its descriptor and input view.

use serde_json::{json, Map, Value};
use wealthdesk_core::MarketDataSnapshot;

use crate::agents::{AgentDescriptor, OutputSchema};
use crate::model::ModelRequest;
use crate::state::WorkflowState;

const HEADLINES_IN_PROMPT: usize = 5;
const REASONING_EXCERPT_CHARS: usize = 280;

const REPLY_FORMAT: &str = "Reply with one JSON object: {\"stance\": \"bullish|bearish|neutral|recommend|avoid\", \
\"confidence\": 0.0-1.0, \"reasoning\": string, \"recommendations\": [{\"action\": string, \
\"symbol\": string?, \"target_weight\": number?, \"rationale\": string?}], \"risk_factors\": [string]}";

pub fn build_request(descriptor: &AgentDescriptor, state: &WorkflowState) -> ModelRequest {
    let system = format!(
        "You are the {} specialist in a wealth management advisory team. Focus: {} \
         Output type: {}. {REPLY_FORMAT}",
        descriptor.display_name,
        descriptor.focus,
        descriptor.output_schema.as_str(),
    );

    let mut context = Map::new();
    context.insert(String::from("client"), json!(state.profile()));
    if descriptor.input_view.includes_portfolio() {
        let portfolio = state.portfolio();
        let weights = portfolio
            .weights()
            .into_iter()
            .map(|(symbol, weight)| json!({ "symbol": symbol, "weight": round(weight) }))
            .collect::<Vec<_>>();
        context.insert(
            String::from("portfolio"),
            json!({
                "holdings": portfolio.holdings,
                "cash": portfolio.cash,
                "total_value": round(portfolio.total_value()),
                "weights": weights,
                "rebalancing_threshold": portfolio.rebalancing_threshold,
            }),
        );
    }
    if descriptor.input_view.includes_market() {
        context.insert(String::from("market"), market_digest(state.snapshot()));
    }
    if descriptor.input_view.includes_signals() {
        let signals = state
            .signals()
            .iter()
            .map(|signal| {
                json!({
                    "agent": signal.agent,
                    "stance": signal.payload.stance,
                    "confidence": round(signal.confidence),
                    "degraded": signal.is_degraded(),
                    "reasoning": excerpt(&signal.payload.reasoning),
                    "recommendations": signal.payload.recommendations,
                })
            })
            .collect::<Vec<_>>();
        context.insert(String::from("prior_signals"), Value::Array(signals));
        context.insert(String::from("skipped_agents"), json!(state.skipped()));
    }

    let task = match descriptor.output_schema {
        OutputSchema::Synthesis => "Consolidate the prior signals into final recommendations.",
        OutputSchema::Allocation => "Assess the allocation from your perspective.",
        OutputSchema::Planning => "Assess the client's plan from your perspective.",
        OutputSchema::MarketView => "Assess current market conditions from your perspective.",
    };

    ModelRequest {
        agent: descriptor.id,
        schema: descriptor.output_schema,
        system,
        prompt: format!("{task}\n\nContext:\n{}", Value::Object(context)),
    }
}

/// Compact view of the snapshot: enough for reasoning, small enough for a prompt.
fn market_digest(snapshot: &MarketDataSnapshot) -> Value {
    let symbols = snapshot
        .symbols
        .iter()
        .map(|(symbol, data)| {
            let technicals = data.technicals.as_ref().map(|technicals| {
                json!({
                    "rsi": technicals.rsi.map(round),
                    "macd_histogram": technicals.macd.as_ref().map(|macd| round(macd.histogram)),
                    "sma_50": technicals.sma_50.map(round),
                    "sma_200": technicals.sma_200.map(round),
                })
            });
            json!({
                "symbol": symbol,
                "status": data.status,
                "price": data.quote.as_ref().map(|quote| quote.price),
                "stale": data.quote.as_ref().map(|quote| quote.stale),
                "technicals": technicals,
            })
        })
        .collect::<Vec<_>>();

    let headlines = snapshot
        .news
        .iter()
        .take(HEADLINES_IN_PROMPT)
        .map(|item| json!({ "headline": item.headline, "sentiment": item.sentiment }))
        .collect::<Vec<_>>();

    let indicators = snapshot
        .indicators
        .iter()
        .map(|indicator| {
            json!({
                "series": indicator.series_id,
                "title": indicator.title,
                "value": indicator.value,
                "date": indicator.observation_date.format_date(),
            })
        })
        .collect::<Vec<_>>();

    json!({
        "as_of": snapshot.as_of,
        "market_open": snapshot.market_session.is_open,
        "symbols": symbols,
        "failed_symbols": snapshot.failed_symbols(),
        "sentiment": snapshot.sentiment_summary,
        "headlines": headlines,
        "economic_indicators": indicators,
        "fx_rates": snapshot.fx_rates,
        "data_incomplete": snapshot.timed_out,
    })
}

fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= REASONING_EXCERPT_CHARS {
        return text.to_owned();
    }
    let mut cut = text.chars().take(REASONING_EXCERPT_CHARS).collect::<String>();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wealthdesk_core::Portfolio;

    use super::*;
    use crate::agents::AgentId;
    use crate::signal::{AgentSignal, SignalPayload};
    use crate::state::RunId;
    use crate::testing::{empty_snapshot, profile};

    fn state() -> WorkflowState {
        WorkflowState::new(
            RunId::new_v4(),
            Arc::new(profile()),
            Arc::new(Portfolio::new("c-1", Vec::new())),
            Arc::new(empty_snapshot()),
        )
    }

    #[test]
    fn profile_view_hides_portfolio_and_market() {
        let request = build_request(&AgentId::RiskProfiler.descriptor(), &state());

        assert!(request.prompt.contains("\"client\""));
        assert!(!request.prompt.contains("\"portfolio\""));
        assert!(!request.prompt.contains("\"market\""));
        assert!(request.system.contains("Risk Profiler"));
    }

    #[test]
    fn full_view_includes_prior_signals() {
        let state = state();
        let version = state.snapshot().version;
        let state = state.with_signal(AgentSignal::new(
            &AgentId::Esg.descriptor(),
            SignalPayload::neutral("clean energy tilt"),
            0.7,
            version,
        ));

        let request = build_request(&AgentId::PortfolioManager.descriptor(), &state);

        assert!(request.prompt.contains("\"prior_signals\""));
        assert!(request.prompt.contains("clean energy tilt"));
        assert!(request.prompt.contains("\"market\""));
        assert_eq!(request.schema, OutputSchema::Synthesis);
    }

    #[test]
    fn long_reasoning_is_shortened() {
        let long = "x".repeat(REASONING_EXCERPT_CHARS + 50);
        let short = excerpt(&long);

        assert_eq!(short.chars().count(), REASONING_EXCERPT_CHARS + 3);
        assert!(short.ends_with("..."));
    }
}
