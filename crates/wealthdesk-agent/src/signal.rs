//! Agent signals and model response parsing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wealthdesk_core::{SnapshotVersion, Symbol, UtcDateTime};

use crate::agents::{AgentDescriptor, AgentId, OutputSchema};

/// Confidence assigned when a model reply does not state one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Bullish,
    Bearish,
    Neutral,
    Recommend,
    Avoid,
}

impl Stance {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
            Self::Recommend => "recommend",
            Self::Avoid => "avoid",
        }
    }

    /// Lenient mapping for the vocabulary models actually use.
    fn from_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bullish" | "buy" | "strong_buy" | "strong buy" | "positive" | "overweight" => {
                Some(Self::Bullish)
            }
            "bearish" | "sell" | "strong_sell" | "strong sell" | "negative" | "underweight" => {
                Some(Self::Bearish)
            }
            "neutral" | "hold" | "mixed" => Some(Self::Neutral),
            "recommend" | "recommended" | "proceed" | "approve" => Some(Self::Recommend),
            "avoid" | "reject" | "decline" => Some(Self::Avoid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Recommendation {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            symbol: None,
            target_weight: None,
            rationale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPayload {
    pub stance: Stance,
    pub reasoning: String,
    pub recommendations: Vec<Recommendation>,
    pub risk_factors: Vec<String>,
}

impl SignalPayload {
    pub fn neutral(reasoning: impl Into<String>) -> Self {
        Self {
            stance: Stance::Neutral,
            reasoning: reasoning.into(),
            recommendations: Vec::new(),
            risk_factors: Vec::new(),
        }
    }
}

/// One stage's output. Appended to the workflow state and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSignal {
    pub agent: AgentId,
    pub schema: OutputSchema,
    pub payload: SignalPayload,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub snapshot_version: SnapshotVersion,
    pub produced_at: UtcDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<String>,
}

impl AgentSignal {
    pub fn new(
        descriptor: &AgentDescriptor,
        payload: SignalPayload,
        confidence: f64,
        snapshot_version: SnapshotVersion,
    ) -> Self {
        Self {
            agent: descriptor.id,
            schema: descriptor.output_schema,
            payload,
            confidence: clamp_confidence(confidence),
            snapshot_version,
            produced_at: UtcDateTime::now(),
            degradation: None,
        }
    }

    /// Placeholder for a stage that failed or timed out: neutral, zero confidence.
    pub fn degraded(
        descriptor: &AgentDescriptor,
        snapshot_version: SnapshotVersion,
        note: impl Into<String>,
    ) -> Self {
        let note = note.into();
        Self {
            agent: descriptor.id,
            schema: descriptor.output_schema,
            payload: SignalPayload::neutral(format!("{} unavailable: {note}", descriptor.display_name)),
            confidence: 0.0,
            snapshot_version,
            produced_at: UtcDateTime::now(),
            degradation: Some(note),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}

/// Model reply reduced to a payload and a confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub payload: SignalPayload,
    pub confidence: f64,
}

/// Reads a JSON payload from the reply, bare or inside a fenced block.
/// Anything unparseable becomes neutral reasoning.
pub fn parse_response(text: &str) -> ParsedResponse {
    let parsed = extract_json(text)
        .and_then(|json| serde_json::from_str::<RawPayload>(json).ok())
        .and_then(RawPayload::into_parsed);

    parsed.unwrap_or_else(|| ParsedResponse {
        payload: SignalPayload::neutral(text.trim()),
        confidence: DEFAULT_CONFIDENCE,
    })
}

fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }
    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        if let Some(end) = body.find("```") {
            let block = body[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Accepts scores on either a 0-1 or 0-100 scale.
fn clamp_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scaled = if value > 1.0 { value / 100.0 } else { value };
    scaled.clamp(0.0, 1.0)
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default, alias = "signal", alias = "recommendation_type", alias = "outlook")]
    stance: Option<String>,
    #[serde(default, alias = "rationale", alias = "analysis", alias = "summary")]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    recommendations: Vec<RawRecommendation>,
    #[serde(default, alias = "risks")]
    risk_factors: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRecommendation {
    Text(String),
    Structured {
        #[serde(alias = "recommendation", alias = "description")]
        action: String,
        #[serde(default, alias = "ticker")]
        symbol: Option<String>,
        #[serde(default, alias = "weight", alias = "allocation")]
        target_weight: Option<f64>,
        #[serde(default, alias = "reason")]
        rationale: Option<String>,
    },
    Other(Value),
}

impl RawRecommendation {
    fn into_recommendation(self) -> Option<Recommendation> {
        match self {
            Self::Text(action) => Some(Recommendation::new(action)),
            Self::Structured {
                action,
                symbol,
                target_weight,
                rationale,
            } => Some(Recommendation {
                action,
                symbol: symbol.and_then(|raw| Symbol::parse(&raw).ok()),
                target_weight: target_weight.map(clamp_confidence),
                rationale,
            }),
            Self::Other(_) => None,
        }
    }
}

impl RawPayload {
    /// `None` when the object has none of the payload fields.
    fn into_parsed(self) -> Option<ParsedResponse> {
        if self.stance.is_none() && self.reasoning.is_none() && self.recommendations.is_empty() {
            return None;
        }
        let stance = self
            .stance
            .as_deref()
            .and_then(Stance::from_loose)
            .unwrap_or(Stance::Neutral);
        let mut seen = BTreeSet::new();
        let risk_factors = self
            .risk_factors
            .into_iter()
            .map(|risk| risk.trim().to_owned())
            .filter(|risk| !risk.is_empty() && seen.insert(risk.clone()))
            .collect();

        Some(ParsedResponse {
            payload: SignalPayload {
                stance,
                reasoning: self.reasoning.unwrap_or_default(),
                recommendations: self
                    .recommendations
                    .into_iter()
                    .filter_map(RawRecommendation::into_recommendation)
                    .collect(),
                risk_factors,
            },
            confidence: self.confidence.map_or(DEFAULT_CONFIDENCE, clamp_confidence),
        })
    }
}
