//! Append-only trade journal.

use estateshare_common::{
    PropertyId, SharePrice, Timestamp, TradeKind, TradeReceipt, TransactionId, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An immutable ledger transaction. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID.
    pub id: TransactionId,
    /// Property traded.
    pub property_id: PropertyId,
    /// Buyer or seller.
    pub user_id: UserId,
    /// Buy or sell.
    pub kind: TradeKind,
    /// Shares moved. Always positive.
    pub shares: i64,
    /// Property price at execution time.
    pub price_per_share: SharePrice,
    /// When the trade committed.
    pub created_at: Timestamp,
}

impl Transaction {
    /// Gross value of the trade.
    pub fn gross_value(&self) -> Decimal {
        self.price_per_share.total_for(self.shares)
    }
}

/// Everything a store needs to apply one trade atomically.
///
/// Carries no price: the store copies it from the property row it locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeCommit {
    pub transaction_id: TransactionId,
    pub kind: TradeKind,
    pub property_id: PropertyId,
    pub user_id: UserId,
    pub shares: i64,
    pub created_at: Timestamp,
}

impl TradeCommit {
    /// Build the journal record once the execution price is known.
    pub fn into_transaction(self, price_per_share: SharePrice) -> Transaction {
        Transaction {
            id: self.transaction_id,
            property_id: self.property_id,
            user_id: self.user_id,
            kind: self.kind,
            shares: self.shares,
            price_per_share,
            created_at: self.created_at,
        }
    }
}

/// Balances observed right after a commit, plus the recorded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTrade {
    pub transaction: Transaction,
    pub available_shares: i64,
    pub holding_shares: i64,
}

impl CommittedTrade {
    pub fn receipt(&self) -> TradeReceipt {
        TradeReceipt {
            transaction_id: self.transaction.id,
            kind: self.transaction.kind,
            property_id: self.transaction.property_id,
            user_id: self.transaction.user_id,
            shares: self.transaction.shares,
            price_per_share: self.transaction.price_per_share,
            available_shares: self.available_shares,
            holding_shares: self.holding_shares,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: TradeKind, shares: i64) -> Transaction {
        TradeCommit {
            transaction_id: TransactionId::new(),
            kind,
            property_id: PropertyId::new(),
            user_id: UserId::new(),
            shares,
            created_at: estateshare_common::now(),
        }
        .into_transaction(SharePrice::new(Decimal::from(25)).unwrap())
    }

    #[test]
    fn test_gross_value() {
        let buy = record(TradeKind::Buy, 10);
        assert_eq!(buy.gross_value(), Decimal::from(250));

        let sell = record(TradeKind::Sell, 4);
        assert_eq!(sell.gross_value(), Decimal::from(100));
    }
}
