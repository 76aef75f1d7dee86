//! Persistence seam for the ledger.
//!
//! Every mutation goes through [`LedgerStore::commit_trade`], which must apply
//! the supply change, the holding change and the journal append as one unit,
//! guarded by conditions evaluated at commit time:
//!
//! - Buy: `available_shares >= shares`
//! - Sell: `available_shares + shares <= total_shares` and `holding.shares >= shares`
//!
//! A failed guard leaves the store untouched and is reported as
//! [`CommitOutcome::Rejected`]; the engine re-reads and decides whether to
//! retry or surface a business error. Implementations lock the property row
//! before the holding row.

use async_trait::async_trait;
use estateshare_common::{LedgerError, PropertyId, UserId};
use thiserror::Error;

use crate::holding::{Holding, InvariantReport};
use crate::identity::UserProfile;
use crate::journal::{CommittedTrade, TradeCommit, Transaction};
use crate::property::Property;

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, StoreFault};
pub use postgres::PgStore;

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Concurrent writer won; safe to retry.
    #[error("Write conflict on property {0}")]
    Conflict(PropertyId),

    /// Primary or unique key already present.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// A row references a parent that does not exist.
    #[error("Missing referenced row: {0}")]
    MissingReference(String),

    /// Store unreachable or transaction aborted.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Row could not be decoded into a ledger type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingReference(message) => LedgerError::Validation {
                message: format!("Unknown reference: {}", message),
                field: None,
            },
            other => LedgerError::Persistence(other.to_string()),
        }
    }
}

/// Which commit-time guard failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFailure {
    /// Property row vanished between read and commit.
    MissingProperty,
    /// Buy exceeded available supply.
    Supply,
    /// Sell would exceed total supply.
    Capacity,
    /// Sell exceeded the user's holding.
    Holding,
}

/// Result of a guarded commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All changes applied.
    Applied(CommittedTrade),
    /// A guard failed; nothing was written.
    Rejected(GuardFailure),
}

/// Durable storage for properties, holdings, the journal and profiles.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a freshly listed property.
    async fn insert_property(&self, property: &Property) -> StoreResult<()>;

    async fn get_property(&self, property_id: PropertyId) -> StoreResult<Option<Property>>;

    /// All properties, oldest first.
    async fn list_properties(&self) -> StoreResult<Vec<Property>>;

    async fn get_holding(
        &self,
        user_id: UserId,
        property_id: PropertyId,
    ) -> StoreResult<Option<Holding>>;

    /// Every holding of `user_id`, including empty ones, ordered by property id.
    async fn holdings_for_user(&self, user_id: UserId) -> StoreResult<Vec<Holding>>;

    /// Supply and the sum of all holdings of a property, read as one snapshot.
    async fn invariant_report(
        &self,
        property_id: PropertyId,
    ) -> StoreResult<Option<InvariantReport>>;

    /// Apply a trade atomically under its guards.
    async fn commit_trade(&self, commit: &TradeCommit) -> StoreResult<CommitOutcome>;

    /// Journal entries for a user, newest first.
    async fn transactions_for_user(&self, user_id: UserId) -> StoreResult<Vec<Transaction>>;

    /// Journal entries for a property, newest first.
    async fn transactions_for_property(
        &self,
        property_id: PropertyId,
    ) -> StoreResult<Vec<Transaction>>;

    /// Profile lookup for owner joins.
    async fn get_profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_ledger_errors() {
        let err = LedgerError::from(StoreError::MissingReference("holdings_user_id_fkey".into()));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_retryable());

        let err = LedgerError::from(StoreError::Unavailable("pool timed out".into()));
        assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");
        assert!(err.is_retryable());
    }
}
