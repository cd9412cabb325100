//! Reference-data value objects: currencies, exchangers, symbols and markets.
//!
//! `id` is `None` until the entity has been resolved against the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::{currencies, exchangers};

/// Currency names are compared lower-cased and trimmed.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Abbreviations are stored upper-cased and trimmed.
pub fn normalize_abbr(abbr: &str) -> String {
    abbr.trim().to_uppercase()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: Option<i32>,
    pub name: String,
    pub abbr: String,
    pub abbr_final: bool,
    pub info: String,
}

impl Currency {
    pub fn new(name: impl Into<String>, abbr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            abbr: abbr.into(),
            ..Default::default()
        }
    }

    /// Currency whose abbreviation is authoritative over anything a feed reports
    pub fn finalized(name: impl Into<String>, abbr: impl Into<String>) -> Self {
        Self {
            abbr_final: true,
            ..Self::new(name, abbr)
        }
    }

    /// Currency known only by its short code, e.g. from a "BTC_USDT" pair
    pub fn from_code(code: &str) -> Self {
        Self::new(normalize_name(code), normalize_abbr(code))
    }
}

impl From<currencies::Model> for Currency {
    fn from(model: currencies::Model) -> Self {
        Self {
            id: Some(model.id),
            name: model.name,
            abbr: model.abbr,
            abbr_final: model.abbr_final,
            info: model.info,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exchanger {
    pub id: Option<i32>,
    pub name: String,
    pub info: String,
}

impl Exchanger {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl From<exchangers::Model> for Exchanger {
    fn from(model: exchangers::Model) -> Self {
        Self {
            id: Some(model.id),
            name: model.name,
            info: model.info,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("not a valid traded pair: {0:?}")]
pub struct SymbolParseError(pub String);

/// A traded pair. Base and quote are not interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: Option<i32>,
    pub base: Currency,
    pub quote: Currency,
}

impl Symbol {
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self {
            id: None,
            base,
            quote,
        }
    }
}

impl FromStr for Symbol {
    type Err = SymbolParseError;

    /// Parses "BASE_QUOTE" into two unresolved currencies
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(Self::new(Currency::from_code(base), Currency::from_code(quote)))
            }
            _ => Err(SymbolParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base.abbr, self.quote.abbr)
    }
}

/// Tradable amount bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Limitation {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: Option<i32>,
    /// Display name, e.g. "LTC-BTC"
    pub name: String,
    pub symbol: Symbol,
    pub exchanger: Exchanger,
    pub active: bool,
    pub info: String,
    pub precision: i32,
    pub limitation: Limitation,
    pub min_step: f64,
}

impl Market {
    pub fn new(name: impl Into<String>, symbol: Symbol, exchanger: Exchanger) -> Self {
        Self {
            id: None,
            name: name.into(),
            symbol,
            exchanger,
            active: true,
            info: String::new(),
            precision: 8,
            limitation: Limitation::default(),
            min_step: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbol() {
        let symbol: Symbol = "ltc_btc".parse().unwrap();
        assert_eq!(symbol.base.name, "ltc");
        assert_eq!(symbol.base.abbr, "LTC");
        assert_eq!(symbol.quote.abbr, "BTC");
        assert_eq!(symbol.id, None);
        assert_eq!(symbol.to_string(), "LTC_BTC");
    }

    #[test]
    fn test_parse_symbol_rejects_malformed() {
        assert!("BTC".parse::<Symbol>().is_err());
        assert!("BTC_".parse::<Symbol>().is_err());
        assert!("A_B_C".parse::<Symbol>().is_err());
        assert_eq!(
            "".parse::<Symbol>(),
            Err(SymbolParseError(String::new()))
        );
    }

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_name("  Bitcoin Cash "), "bitcoin cash");
        assert_eq!(normalize_abbr(" bch"), "BCH");
    }

    #[test]
    fn test_market_defaults() {
        let market = Market::new(
            "LTC-BTC",
            Symbol::new(Currency::new("litecoin", "LTC"), Currency::new("bitcoin", "BTC")),
            Exchanger::new("demo"),
        );
        assert!(market.active);
        assert_eq!(market.precision, 8);
        assert_eq!(market.limitation, Limitation::default());
    }
}
