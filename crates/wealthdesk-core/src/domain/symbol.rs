use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Longest ticker accepted, venue suffix included (`BRK-B`, `SHOP.TO`, `RY.NE`).
const MAX_SYMBOL_LEN: usize = 15;

/// Exchange ticker shared by every provider, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trims and uppercases `input`. A ticker starts with a letter and then
    /// holds letters, digits, `.` or `-`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let ticker = input.trim().to_ascii_uppercase();
        if ticker.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        let len = ticker.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in ticker.chars().enumerate() {
            match (index, ch) {
                (0, c) if c.is_ascii_alphabetic() => {}
                (0, c) => return Err(ValidationError::SymbolInvalidStart { ch: c }),
                (_, c) if c.is_ascii_alphanumeric() || c == '.' || c == '-' => {}
                (index, ch) => return Err(ValidationError::SymbolInvalidChar { ch, index }),
            }
        }

        Ok(Self(ticker))
    }

    /// All-or-nothing parse of a ticker list.
    pub fn parse_many<I, S>(inputs: I) -> Result<Vec<Self>, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        inputs.into_iter().map(|raw| raw.as_ref().parse()).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Venue suffix after the last dot, e.g. `TO` for `SHOP.TO`.
    pub fn venue_suffix(&self) -> Option<&str> {
        self.0
            .rsplit_once('.')
            .map(|(_, suffix)| suffix)
            .filter(|suffix| !suffix.is_empty())
    }
}

impl FromStr for Symbol {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
