//! Trade kinds, requests and receipts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::{PropertyId, SharePrice, TransactionId, UserId};

/// Direction of a share trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeKind {
    /// Shares move from the property's available pool to the user.
    Buy,
    /// Shares move from the user back to the available pool.
    Sell,
}

impl TradeKind {
    /// Canonical storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Buy => "BUY",
            TradeKind::Sell => "SELL",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeKind::Buy),
            "SELL" => Some(TradeKind::Sell),
            _ => None,
        }
    }

    /// Signed change applied to the property's available shares.
    pub fn available_delta(&self, shares: i64) -> i64 {
        match self {
            TradeKind::Buy => -shares,
            TradeKind::Sell => shares,
        }
    }

    /// Signed change applied to the user's holding.
    pub fn holding_delta(&self, shares: i64) -> i64 {
        -self.available_delta(shares)
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buy or sell request as received from the caller.
///
/// `shares` is kept signed so malformed input can be reported instead of
/// silently wrapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub kind: TradeKind,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub shares: i64,
}

impl TradeRequest {
    pub fn buy(property_id: PropertyId, user_id: UserId, shares: i64) -> Self {
        Self {
            kind: TradeKind::Buy,
            property_id,
            user_id,
            shares,
        }
    }

    pub fn sell(property_id: PropertyId, user_id: UserId, shares: i64) -> Self {
        Self {
            kind: TradeKind::Sell,
            property_id,
            user_id,
            shares,
        }
    }

    /// Validate the request shape.
    pub fn validate(&self) -> Result<()> {
        if self.shares <= 0 {
            return Err(LedgerError::validation(
                format!("shares must be a positive integer, got {}", self.shares),
                "shares",
            ));
        }
        Ok(())
    }
}

/// Outcome of a committed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeReceipt {
    /// Ledger transaction recorded for the trade.
    pub transaction_id: TransactionId,
    pub kind: TradeKind,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub shares: i64,
    /// Price copied from the property when the trade committed.
    pub price_per_share: SharePrice,
    /// Property supply after the trade.
    pub available_shares: i64,
    /// User holding after the trade.
    pub holding_shares: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_and_deltas() {
        assert_eq!(TradeKind::parse(TradeKind::Buy.as_str()), Some(TradeKind::Buy));
        assert_eq!(TradeKind::parse("HOLD"), None);
        assert_eq!(TradeKind::Buy.available_delta(10), -10);
        assert_eq!(TradeKind::Buy.holding_delta(10), 10);
        assert_eq!(TradeKind::Sell.available_delta(4), 4);
        assert_eq!(TradeKind::Sell.holding_delta(4), -4);
    }

    #[test]
    fn test_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&TradeKind::Sell).unwrap(), "\"SELL\"");
    }

    #[test]
    fn test_request_validation() {
        let property = PropertyId::new();
        let user = UserId::new();

        assert!(TradeRequest::buy(property, user, 1).validate().is_ok());

        let err = TradeRequest::sell(property, user, 0).validate().unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        assert!(TradeRequest::buy(property, user, -3).validate().is_err());
    }
}
