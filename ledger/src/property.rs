//! Property definitions for the ledger.

use estateshare_common::{LedgerError, PropertyId, Result, SharePrice, Timestamp, UserId};
use serde::{Deserialize, Serialize};

use crate::identity::UserProfile;

/// A tokenized property whose shares are traded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Unique property identifier.
    pub id: PropertyId,
    /// Profile that listed the property.
    pub owner_id: UserId,
    /// Display title.
    pub title: String,
    /// Street address or region.
    pub location: String,
    /// Off-chain metadata document.
    pub metadata_uri: String,
    /// Shares minted at creation. Never changes.
    pub total_shares: i64,
    /// Shares not held by anyone.
    pub available_shares: i64,
    /// Static price per share.
    pub price_per_share: SharePrice,
    /// When the property was listed.
    pub created_at: Timestamp,
    /// When supply last changed.
    pub updated_at: Timestamp,
}

impl Property {
    /// Check if a buy of `shares` fits the available pool.
    pub fn can_supply(&self, shares: i64) -> bool {
        shares <= self.available_shares
    }

    /// Check if returning `shares` keeps supply within the total.
    pub fn can_absorb(&self, shares: i64) -> bool {
        shares <= self.total_shares - self.available_shares
    }

    /// Compact projection used in holdings listings.
    pub fn summary(&self) -> PropertySummary {
        PropertySummary {
            id: self.id,
            title: self.title.clone(),
            location: self.location.clone(),
            metadata_uri: self.metadata_uri.clone(),
            price_per_share: self.price_per_share,
            total_shares: self.total_shares,
            available_shares: self.available_shares,
        }
    }
}

/// Input for listing a new property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProperty {
    pub title: String,
    pub location: String,
    pub metadata_uri: String,
    pub total_shares: i64,
    pub price_per_share: SharePrice,
}

impl NewProperty {
    /// Validate listing input.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(LedgerError::validation("title must not be empty", "title"));
        }
        if self.total_shares <= 0 {
            return Err(LedgerError::validation(
                format!("total_shares must be positive, got {}", self.total_shares),
                "total_shares",
            ));
        }
        Ok(())
    }

    /// Materialize the property with the full supply available.
    pub fn into_property(self, owner_id: UserId, now: Timestamp) -> Property {
        Property {
            id: PropertyId::new(),
            owner_id,
            title: self.title,
            location: self.location,
            metadata_uri: self.metadata_uri,
            total_shares: self.total_shares,
            available_shares: self.total_shares,
            price_per_share: self.price_per_share,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Display fields of a property joined into holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub id: PropertyId,
    pub title: String,
    pub location: String,
    pub metadata_uri: String,
    pub price_per_share: SharePrice,
    pub total_shares: i64,
    pub available_shares: i64,
}

/// A property with its owner profile joined in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyView {
    #[serde(flatten)]
    pub property: Property,
    /// Missing only if the owner profile was removed out of band.
    pub owner: Option<UserProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn new_listing(total_shares: i64) -> NewProperty {
        NewProperty {
            title: "Harbor Loft".to_string(),
            location: "12 Pier Rd".to_string(),
            metadata_uri: "ipfs://loft".to_string(),
            total_shares,
            price_per_share: SharePrice::new(Decimal::from(50)).unwrap(),
        }
    }

    #[test]
    fn test_new_property_starts_fully_available() {
        let property = new_listing(1000).into_property(UserId::new(), estateshare_common::now());

        assert_eq!(property.available_shares, 1000);
        assert!(property.can_supply(1000));
        assert!(!property.can_supply(1001));
        assert!(!property.can_absorb(1));
    }

    #[test]
    fn test_absorb_check_does_not_overflow() {
        let mut property = new_listing(100).into_property(UserId::new(), estateshare_common::now());
        property.available_shares = 40;

        assert!(property.can_absorb(60));
        assert!(!property.can_absorb(61));
        assert!(!property.can_absorb(i64::MAX));
        assert!(!property.can_supply(i64::MAX));
    }

    #[test]
    fn test_listing_validation() {
        assert!(new_listing(10).validate().is_ok());
        assert!(new_listing(0).validate().is_err());

        let mut untitled = new_listing(10);
        untitled.title = "  ".to_string();
        assert!(untitled.validate().is_err());
    }
}
