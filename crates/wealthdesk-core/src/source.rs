use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream market data vendors. Declaration order is the default display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Yahoo,
    Polygon,
    Alphavantage,
    Finnhub,
    Newsapi,
    Fred,
}

impl ProviderId {
    pub const ALL: [Self; 6] = [
        Self::Yahoo,
        Self::Polygon,
        Self::Alphavantage,
        Self::Finnhub,
        Self::Newsapi,
        Self::Fred,
    ];

    /// Lowercase token used in configuration, cache keys and JSON.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Polygon => "polygon",
            Self::Alphavantage => "alphavantage",
            Self::Finnhub => "finnhub",
            Self::Newsapi => "newsapi",
            Self::Fred => "fred",
        }
    }

    /// Yahoo's public chart endpoints are the only keyless source.
    pub const fn requires_key(self) -> bool {
        !matches!(self, Self::Yahoo)
    }

    /// Credential variables in lookup order: `WEALTHDESK_<X>_API_KEY`, then `<X>_API_KEY`.
    pub fn key_variables(self) -> [String; 2] {
        let upper = self.as_str().to_ascii_uppercase();
        [
            format!("WEALTHDESK_{upper}_API_KEY"),
            format!("{upper}_API_KEY"),
        ]
    }

    /// First non-blank credential found through `lookup`.
    pub fn resolve_key(self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        if !self.requires_key() {
            return None;
        }
        self.key_variables()
            .iter()
            .filter_map(|name| lookup(name))
            .find(|key| !key.trim().is_empty())
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let token = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == token)
            .ok_or(ValidationError::InvalidProvider { value: token })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn tokens_parse_case_insensitively() {
        assert_eq!(" Fred ".parse::<ProviderId>(), Ok(ProviderId::Fred));
        assert_eq!("NEWSAPI".parse::<ProviderId>(), Ok(ProviderId::Newsapi));
        assert!(matches!(
            "bloomberg".parse::<ProviderId>(),
            Err(ValidationError::InvalidProvider { .. })
        ));
    }

    #[test]
    fn prefixed_key_wins_over_bare_and_blank_keys_are_ignored() {
        let env = HashMap::from([
            ("WEALTHDESK_POLYGON_API_KEY", "  "),
            ("POLYGON_API_KEY", "pk-bare"),
            ("WEALTHDESK_FRED_API_KEY", "fred-prefixed"),
            ("FRED_API_KEY", "fred-bare"),
        ]);
        let lookup = |name: &str| env.get(name).map(|value| (*value).to_owned());

        assert_eq!(ProviderId::Polygon.resolve_key(lookup).as_deref(), Some("pk-bare"));
        assert_eq!(ProviderId::Fred.resolve_key(lookup).as_deref(), Some("fred-prefixed"));
        assert_eq!(ProviderId::Finnhub.resolve_key(lookup), None);
    }

    #[test]
    fn yahoo_never_reads_credentials() {
        let lookup = |_: &str| Some(String::from("ignored"));

        assert!(!ProviderId::Yahoo.requires_key());
        assert_eq!(ProviderId::Yahoo.resolve_key(lookup), None);
    }
}
