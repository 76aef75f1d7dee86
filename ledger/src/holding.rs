//! User share holdings.

use estateshare_common::{PropertyId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::property::PropertySummary;

/// A user's share balance in one property.
///
/// Zero-share holdings are kept once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: UserId,
    pub property_id: PropertyId,
    pub shares: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Holding {
    /// Create an empty holding for a (user, property) pair.
    pub fn empty(user_id: UserId, property_id: PropertyId, now: Timestamp) -> Self {
        Self {
            user_id,
            property_id,
            shares: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the holding covers a sell of `shares`.
    pub fn covers(&self, shares: i64) -> bool {
        self.shares >= shares
    }

    pub fn is_empty(&self) -> bool {
        self.shares == 0
    }
}

/// Holding joined with property display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingView {
    pub property: PropertySummary,
    pub shares: i64,
}

/// Supply accounting for a single property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantReport {
    pub property_id: PropertyId,
    pub total_shares: i64,
    pub available_shares: i64,
    /// Sum of all holdings for the property.
    pub held_shares: i64,
}

impl InvariantReport {
    /// `available + held == total`.
    pub fn holds(&self) -> bool {
        self.available_shares + self.held_shares == self.total_shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_holding() {
        let holding = Holding::empty(UserId::new(), PropertyId::new(), estateshare_common::now());
        assert!(holding.is_empty());
        assert!(holding.covers(0));
        assert!(!holding.covers(1));
    }

    #[test]
    fn test_invariant_report() {
        let report = InvariantReport {
            property_id: PropertyId::new(),
            total_shares: 100,
            available_shares: 40,
            held_shares: 60,
        };
        assert!(report.holds());

        let broken = InvariantReport {
            held_shares: 61,
            ..report
        };
        assert!(!broken.holds());
    }
}
