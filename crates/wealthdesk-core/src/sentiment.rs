//! Keyword sentiment for news items that arrive unscored.

use serde::{Deserialize, Serialize};

use crate::NewsItem;

const POSITIVE_WORDS: [&str; 20] = [
    "surge", "jump", "rise", "gain", "up", "positive", "growth", "profit", "earnings", "beat",
    "exceed", "strong", "bullish", "rally", "recovery", "increase", "higher", "better", "success",
    "win",
];

const NEGATIVE_WORDS: [&str; 20] = [
    "fall", "drop", "decline", "loss", "down", "negative", "weak", "bearish", "crash", "plunge",
    "concern", "risk", "worry", "fear", "sell-off", "decrease", "lower", "worse", "fail", "lose",
];

/// Scores above this are positive, below its negation negative.
pub const LABEL_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > LABEL_THRESHOLD {
            Self::Positive
        } else if score < -LABEL_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

/// `(positive - negative) / (positive + negative)` over whole-word hits; 0 without hits.
pub fn score_text(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let mut positive = 0_u32;
    let mut negative = 0_u32;

    for token in lowered.split(|ch: char| !(ch.is_alphanumeric() || ch == '-')) {
        let token = token.trim_matches('-');
        if token.is_empty() {
            continue;
        }
        if POSITIVE_WORDS.contains(&token) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&token) {
            negative += 1;
        }
    }

    let total = positive + negative;
    if total == 0 {
        return 0.0;
    }
    (f64::from(positive) - f64::from(negative)) / f64::from(total)
}

/// Scores headline and summary together.
pub fn score_item(item: &NewsItem) -> f64 {
    match &item.summary {
        Some(summary) => score_text(&format!("{} {summary}", item.headline)),
        None => score_text(&item.headline),
    }
}

/// Fills in the score for items the provider did not score. Scored items are left alone.
pub fn score_unscored(items: &mut [NewsItem]) {
    for item in items.iter_mut().filter(|item| item.sentiment.is_none()) {
        item.sentiment = Some(score_item(item));
    }
}

/// Distribution of sentiment across a set of news items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub total: usize,
    pub positive_pct: f64,
    pub neutral_pct: f64,
    pub negative_pct: f64,
    pub average_score: f64,
    pub overall: SentimentLabel,
}

impl Default for SentimentSummary {
    fn default() -> Self {
        Self {
            total: 0,
            positive_pct: 0.0,
            neutral_pct: 0.0,
            negative_pct: 0.0,
            average_score: 0.0,
            overall: SentimentLabel::Neutral,
        }
    }
}

impl SentimentSummary {
    /// Items without a score count as neutral with a zero score.
    pub fn from_items(items: &[NewsItem]) -> Self {
        if items.is_empty() {
            return Self::default();
        }

        let scores = items
            .iter()
            .map(|item| item.sentiment.unwrap_or(0.0))
            .collect::<Vec<_>>();
        let count = |label: SentimentLabel| {
            scores
                .iter()
                .filter(|score| SentimentLabel::from_score(**score) == label)
                .count()
        };
        let total = scores.len();
        let pct = |hits: usize| hits as f64 * 100.0 / total as f64;
        let average_score = scores.iter().sum::<f64>() / total as f64;

        Self {
            total,
            positive_pct: pct(count(SentimentLabel::Positive)),
            neutral_pct: pct(count(SentimentLabel::Neutral)),
            negative_pct: pct(count(SentimentLabel::Negative)),
            average_score,
            overall: SentimentLabel::from_score(average_score),
        }
    }
}
