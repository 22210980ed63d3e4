//! Value types that cross every layer: provider payloads, client inputs and
//! the time primitives they are keyed by.
//!
//! | Group | Types |
//! |-------|-------|
//! | Market data | [`PriceQuote`], [`Bar`], [`BarSeries`], [`NewsItem`], [`EconomicIndicator`], [`FxRate`] |
//! | Client | [`ClientProfile`], [`Portfolio`], [`Holding`] |
//! | Keys and time | [`Symbol`], [`CurrencyPair`], [`Interval`], [`UtcDateTime`] |
//!
//! Nothing here is constructed unchecked. Parsers and `new` functions return
//! [`crate::ValidationError`], and serde goes through the same checks, so a
//! deserialized [`Symbol`] or [`UtcDateTime`] is as trustworthy as a parsed one.
//!
//! ```rust,ignore
//! let close = UtcDateTime::parse("2024-06-07T20:00:00Z")?;
//! assert!(matches!(
//!     Bar::new(close, 101.0, 99.0, 103.0, 100.0, None),
//!     Err(ValidationError::InvalidBarRange)
//! ));
//! ```

mod client;
mod interval;
mod models;
mod symbol;
mod timestamp;

pub use client::{AccountType, AssetClass, ClientProfile, Holding, Portfolio, RiskTolerance};
pub use interval::Interval;
pub use models::{
    series_title, validate_currency_code, Bar, BarSeries, CurrencyPair, EconomicIndicator, FxRate,
    NewsItem, PriceQuote,
};
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
