use thiserror::Error;

/// Rejected input. Every domain constructor and parser in this crate returns it,
/// so a run can refuse bad client or configuration data before any provider is
/// contacted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    // Tickers
    #[error("ticker is empty")]
    EmptySymbol,
    #[error("ticker has {len} characters, at most {max} are allowed")]
    SymbolTooLong { len: usize, max: usize },
    #[error("ticker must begin with a letter, found '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("ticker character '{ch}' at position {index} is not allowed")]
    SymbolInvalidChar { ch: char, index: usize },

    // Enumerated tokens
    #[error("unknown bar interval '{value}' (1m, 5m, 15m, 1h, 1d)")]
    InvalidInterval { value: String },
    #[error("unknown provider '{value}' (yahoo, polygon, alphavantage, finnhub, newsapi, fred)")]
    InvalidProvider { value: String },
    #[error("currency pair '{value}' is not of the form BASE/QUOTE")]
    InvalidCurrencyPair { value: String },
    #[error("'{value}' is not an ISO 4217 currency code")]
    InvalidCurrency { value: String },

    // Time
    #[error("'{value}' is not an RFC3339 timestamp in UTC")]
    TimestampNotUtc { value: String },
    #[error("'{value}' is not a calendar date (YYYY-MM-DD)")]
    InvalidDate { value: String },

    // Numbers and fields
    #[error("{field} is required")]
    EmptyField { field: &'static str },
    #[error("{field} is not a finite number")]
    NonFiniteValue { field: &'static str },
    #[error("{field} cannot be negative")]
    NegativeValue { field: &'static str },
    #[error("{field} must lie between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    // Bars
    #[error("bar low exceeds bar high")]
    InvalidBarRange,
    #[error("bar open or close lies outside the low/high range")]
    InvalidBarBounds,
}

impl ValidationError {
    /// Input field the error refers to, when it names one.
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::EmptyField { field }
            | Self::NonFiniteValue { field }
            | Self::NegativeValue { field }
            | Self::OutOfRange { field, .. } => Some(field),
            _ => None,
        }
    }
}
