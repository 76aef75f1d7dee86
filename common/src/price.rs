//! Share price type.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};

/// Price of a single share. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct SharePrice(Decimal);

impl SharePrice {
    /// Create a share price, rejecting zero and negative values.
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(LedgerError::validation(
                format!("price per share must be positive, got {}", value),
                "price_per_share",
            ));
        }
        Ok(Self(value))
    }

    /// Parse from a decimal string such as `"125.50"`.
    pub fn parse(value: &str) -> Result<Self> {
        let value: Decimal = value.parse().map_err(|e: rust_decimal::Error| {
            LedgerError::validation(e.to_string(), "price_per_share")
        })?;
        Self::new(value)
    }

    /// Get the underlying decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Gross value of `shares` shares at this price.
    pub fn total_for(&self, shares: i64) -> Decimal {
        self.0 * Decimal::from(shares)
    }
}

impl fmt::Display for SharePrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for SharePrice {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SharePrice> for Decimal {
    fn from(price: SharePrice) -> Self {
        price.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_must_be_positive() {
        assert!(SharePrice::new(Decimal::from(100)).is_ok());
        assert!(SharePrice::new(Decimal::ZERO).is_err());
        assert!(SharePrice::new(Decimal::from(-5)).is_err());
    }

    #[test]
    fn test_parse_and_total() {
        let price = SharePrice::parse("125.50").unwrap();
        assert_eq!(price.total_for(4), Decimal::new(50200, 2));
        assert!(SharePrice::parse("not-a-number").is_err());
    }

    #[test]
    fn test_deserialize_rejects_non_positive() {
        let ok: SharePrice = serde_json::from_str("\"42.5\"").unwrap();
        assert_eq!(ok.value(), Decimal::new(425, 1));
        assert!(serde_json::from_str::<SharePrice>("\"0\"").is_err());
    }
}
