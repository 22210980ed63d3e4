use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::models::validate_non_negative;
use crate::{Symbol, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

/// Client facts shared read-only by every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub client_id: String,
    pub name: String,
    pub age: u8,
    pub risk_tolerance: RiskTolerance,
    pub time_horizon_years: u16,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub annual_income: Option<f64>,
    #[serde(default)]
    pub tax_bracket: Option<f64>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub retirement_age: Option<u8>,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
}

fn default_base_currency() -> String {
    String::from("USD")
}

impl ClientProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "client_id" });
        }
        if let Some(income) = self.annual_income {
            validate_non_negative("annual_income", income)?;
        }
        if let Some(bracket) = self.tax_bracket {
            crate::domain::models::validate_range("tax_bracket", bracket, 0.0, 1.0)?;
        }
        crate::validate_currency_code(&self.base_currency)?;
        Ok(())
    }

    pub fn years_to_retirement(&self) -> Option<u8> {
        self.retirement_age
            .map(|retirement| retirement.saturating_sub(self.age))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Taxable,
    Rrsp,
    Tfsa,
    Resp,
    Ira,
    Roth,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Etf,
    FixedIncome,
    Cash,
    Crypto,
    Other,
}

/// One position in the client's portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    #[serde(default)]
    pub name: Option<String>,
    pub quantity: f64,
    pub cost_basis: f64,
    #[serde(default)]
    pub market_value: Option<f64>,
    #[serde(default = "default_account_type")]
    pub account_type: AccountType,
    #[serde(default = "default_asset_class")]
    pub asset_class: AssetClass,
}

fn default_account_type() -> AccountType {
    AccountType::Taxable
}

fn default_asset_class() -> AssetClass {
    AssetClass::Equity
}

impl Holding {
    pub fn new(symbol: Symbol, quantity: f64, cost_basis: f64) -> Result<Self, ValidationError> {
        validate_non_negative("quantity", quantity)?;
        validate_non_negative("cost_basis", cost_basis)?;
        Ok(Self {
            symbol,
            name: None,
            quantity,
            cost_basis,
            market_value: None,
            account_type: AccountType::Taxable,
            asset_class: AssetClass::Equity,
        })
    }

    /// Market value when known, else cost basis.
    pub fn value(&self) -> f64 {
        self.market_value.unwrap_or(self.cost_basis)
    }
}

/// Holdings tied to one client. The data layer never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub client_id: String,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub cash: f64,
    #[serde(default = "default_rebalancing_threshold")]
    pub rebalancing_threshold: f64,
}

fn default_rebalancing_threshold() -> f64 {
    0.05
}

impl Portfolio {
    pub fn new(client_id: impl Into<String>, holdings: Vec<Holding>) -> Self {
        Self {
            client_id: client_id.into(),
            holdings,
            cash: 0.0,
            rebalancing_threshold: default_rebalancing_threshold(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_non_negative("cash", self.cash)?;
        crate::domain::models::validate_range(
            "rebalancing_threshold",
            self.rebalancing_threshold,
            0.0,
            1.0,
        )?;
        for holding in &self.holdings {
            validate_non_negative("quantity", holding.quantity)?;
            validate_non_negative("cost_basis", holding.cost_basis)?;
        }
        Ok(())
    }

    /// Holding symbols in portfolio order, without duplicates.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut seen = BTreeSet::new();
        self.holdings
            .iter()
            .filter(|holding| seen.insert(holding.symbol.clone()))
            .map(|holding| holding.symbol.clone())
            .collect()
    }

    pub fn total_cost_basis(&self) -> f64 {
        self.holdings.iter().map(|holding| holding.cost_basis).sum()
    }

    pub fn total_value(&self) -> f64 {
        self.holdings.iter().map(Holding::value).sum::<f64>() + self.cash
    }

    /// Weight of each holding in total value, in portfolio order.
    pub fn weights(&self) -> Vec<(Symbol, f64)> {
        let total = self.total_value();
        self.holdings
            .iter()
            .map(|holding| {
                let weight = if total > 0.0 {
                    holding.value() / total
                } else {
                    0.0
                };
                (holding.symbol.clone(), weight)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, cost: f64, value: Option<f64>) -> Holding {
        let mut holding =
            Holding::new(Symbol::parse(symbol).expect("symbol"), 10.0, cost).expect("holding");
        holding.market_value = value;
        holding
    }

    #[test]
    fn symbols_keep_order_and_drop_duplicates() {
        let portfolio = Portfolio::new(
            "c-1",
            vec![
                holding("VTI", 100.0, None),
                holding("XIC.TO", 50.0, None),
                holding("VTI", 20.0, None),
            ],
        );

        let symbols = portfolio.symbols();
        let names = symbols.iter().map(Symbol::as_str).collect::<Vec<_>>();
        assert_eq!(names, vec!["VTI", "XIC.TO"]);
    }

    #[test]
    fn weights_prefer_market_value_and_include_cash() {
        let mut portfolio = Portfolio::new(
            "c-1",
            vec![holding("VTI", 100.0, Some(300.0)), holding("BND", 100.0, None)],
        );
        portfolio.cash = 100.0;

        let weights = portfolio.weights();

        assert_eq!(weights[0].1, 0.6);
        assert_eq!(weights[1].1, 0.2);
        assert_eq!(portfolio.total_cost_basis(), 200.0);
    }

    #[test]
    fn profile_defaults_base_currency() {
        let profile: ClientProfile = serde_json::from_str(
            r#"{"client_id":"c-1","name":"Avery","age":42,"risk_tolerance":"moderate","time_horizon_years":20}"#,
        )
        .expect("profile json");

        assert_eq!(profile.base_currency, "USD");
        assert!(profile.validate().is_ok());
        assert_eq!(profile.years_to_retirement(), None);
    }

    #[test]
    fn profile_rejects_tax_bracket_above_one() {
        let profile = ClientProfile {
            client_id: String::from("c-2"),
            name: String::from("Sam"),
            age: 35,
            risk_tolerance: RiskTolerance::Aggressive,
            time_horizon_years: 30,
            goals: Vec::new(),
            constraints: Vec::new(),
            annual_income: Some(95_000.0),
            tax_bracket: Some(1.3),
            province: Some(String::from("ON")),
            retirement_age: Some(65),
            base_currency: String::from("CAD"),
        };

        assert!(matches!(
            profile.validate(),
            Err(ValidationError::OutOfRange { field: "tax_bracket", .. })
        ));
        assert_eq!(profile.years_to_retirement(), Some(30));
    }

    #[test]
    fn profile_without_client_id_is_rejected() {
        let profile: ClientProfile = serde_json::from_str(
            r#"{"client_id":"  ","name":"Avery","age":42,"risk_tolerance":"conservative","time_horizon_years":5}"#,
        )
        .expect("profile json");

        assert!(matches!(
            profile.validate(),
            Err(ValidationError::EmptyField { field: "client_id" })
        ));
    }
}
