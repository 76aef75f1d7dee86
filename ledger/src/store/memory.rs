//! In-memory ledger store.
//!
//! Each property lives in its own book behind a mutex, so commits on the same
//! property serialize while different properties proceed in parallel. The
//! journal append happens while the book is still locked, which keeps journal
//! order consistent with per-property commit order.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use estateshare_common::{now, PropertyId, TradeKind, UserId, WalletAddress};

use super::{CommitOutcome, GuardFailure, LedgerStore, StoreError, StoreResult};
use crate::holding::{Holding, InvariantReport};
use crate::identity::{IdentityResolver, UserProfile};
use crate::journal::{CommittedTrade, TradeCommit, Transaction};
use crate::property::Property;

/// Faults that can be injected into a [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Every call fails as if the database were down.
    Unavailable,
    /// The next `n` commits report a write conflict.
    Conflicts(u32),
}

/// A property together with every holding in it.
#[derive(Debug)]
struct PropertyBook {
    property: Property,
    holdings: BTreeMap<UserId, Holding>,
}

impl PropertyBook {
    fn new(property: Property) -> Self {
        Self {
            property,
            holdings: BTreeMap::new(),
        }
    }

    fn check_guards(&self, commit: &TradeCommit) -> Option<GuardFailure> {
        match commit.kind {
            TradeKind::Buy if !self.property.can_supply(commit.shares) => Some(GuardFailure::Supply),
            TradeKind::Buy => None,
            TradeKind::Sell if !self.property.can_absorb(commit.shares) => {
                Some(GuardFailure::Capacity)
            }
            TradeKind::Sell => {
                let covered = self
                    .holdings
                    .get(&commit.user_id)
                    .is_some_and(|h| h.covers(commit.shares));
                (!covered).then_some(GuardFailure::Holding)
            }
        }
    }

    fn apply(&mut self, commit: &TradeCommit) -> CommitOutcome {
        if let Some(failure) = self.check_guards(commit) {
            return CommitOutcome::Rejected(failure);
        }

        let property = &mut self.property;
        property.available_shares += commit.kind.available_delta(commit.shares);
        property.updated_at = commit.created_at;

        let holding = self
            .holdings
            .entry(commit.user_id)
            .or_insert_with(|| Holding::empty(commit.user_id, commit.property_id, commit.created_at));
        holding.shares += commit.kind.holding_delta(commit.shares);
        holding.updated_at = commit.created_at;

        CommitOutcome::Applied(CommittedTrade {
            transaction: commit.clone().into_transaction(property.price_per_share),
            available_shares: property.available_shares,
            holding_shares: holding.shares,
        })
    }
}

/// Ledger store kept entirely in process memory.
pub struct MemoryStore {
    books: DashMap<PropertyId, Arc<Mutex<PropertyBook>>>,
    journal: RwLock<Vec<Transaction>>,
    profiles: DashMap<UserId, UserProfile>,
    wallets: DashMap<WalletAddress, UserId>,
    fault: Mutex<Option<StoreFault>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            journal: RwLock::new(Vec::new()),
            profiles: DashMap::new(),
            wallets: DashMap::new(),
            fault: Mutex::new(None),
        }
    }

    /// Inject a fault; replaces any fault already active.
    pub fn inject_fault(&self, fault: StoreFault) {
        warn!(?fault, "Injecting store fault");
        *self.fault.lock() = Some(fault);
    }

    pub fn clear_fault(&self) {
        *self.fault.lock() = None;
    }

    /// Number of journal entries across all properties.
    pub fn journal_len(&self) -> usize {
        self.journal.read().len()
    }

    fn check_available(&self) -> StoreResult<()> {
        match *self.fault.lock() {
            Some(StoreFault::Unavailable) => {
                Err(StoreError::Unavailable("memory store offline".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn take_conflict(&self, property_id: PropertyId) -> StoreResult<()> {
        let mut fault = self.fault.lock();
        if let Some(StoreFault::Conflicts(remaining)) = *fault {
            *fault = match remaining {
                0 | 1 => None,
                n => Some(StoreFault::Conflicts(n - 1)),
            };
            if remaining > 0 {
                return Err(StoreError::Conflict(property_id));
            }
        }
        Ok(())
    }

    fn book(&self, property_id: PropertyId) -> Option<Arc<Mutex<PropertyBook>>> {
        self.books.get(&property_id).map(|b| Arc::clone(b.value()))
    }

    /// Overwrite a holding without touching supply. Only for building corrupt states in tests.
    #[cfg(test)]
    pub(crate) fn force_holding(&self, user_id: UserId, property_id: PropertyId, shares: i64) {
        if let Some(book) = self.book(property_id) {
            let mut book = book.lock();
            let holding = book
                .holdings
                .entry(user_id)
                .or_insert_with(|| Holding::empty(user_id, property_id, now()));
            holding.shares = shares;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_property(&self, property: &Property) -> StoreResult<()> {
        self.check_available()?;
        match self.books.entry(property.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("property {}", property.id))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(PropertyBook::new(property.clone()))));
                Ok(())
            }
        }
    }

    async fn get_property(&self, property_id: PropertyId) -> StoreResult<Option<Property>> {
        self.check_available()?;
        Ok(self.book(property_id).map(|book| book.lock().property.clone()))
    }

    async fn list_properties(&self) -> StoreResult<Vec<Property>> {
        self.check_available()?;
        let books: Vec<_> = self.books.iter().map(|b| Arc::clone(b.value())).collect();
        let mut properties: Vec<Property> =
            books.iter().map(|book| book.lock().property.clone()).collect();
        properties.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(properties)
    }

    async fn get_holding(
        &self,
        user_id: UserId,
        property_id: PropertyId,
    ) -> StoreResult<Option<Holding>> {
        self.check_available()?;
        Ok(self
            .book(property_id)
            .and_then(|book| book.lock().holdings.get(&user_id).cloned()))
    }

    async fn holdings_for_user(&self, user_id: UserId) -> StoreResult<Vec<Holding>> {
        self.check_available()?;
        let books: Vec<_> = self.books.iter().map(|b| Arc::clone(b.value())).collect();
        let mut holdings: Vec<Holding> = books
            .iter()
            .filter_map(|book| book.lock().holdings.get(&user_id).cloned())
            .collect();
        holdings.sort_by_key(|h| h.property_id);
        Ok(holdings)
    }

    async fn invariant_report(
        &self,
        property_id: PropertyId,
    ) -> StoreResult<Option<InvariantReport>> {
        self.check_available()?;
        Ok(self.book(property_id).map(|book| {
            let book = book.lock();
            InvariantReport {
                property_id,
                total_shares: book.property.total_shares,
                available_shares: book.property.available_shares,
                held_shares: book.holdings.values().map(|h| h.shares).sum(),
            }
        }))
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> StoreResult<CommitOutcome> {
        self.check_available()?;
        self.take_conflict(commit.property_id)?;

        let Some(book) = self.book(commit.property_id) else {
            return Ok(CommitOutcome::Rejected(GuardFailure::MissingProperty));
        };

        let mut book = book.lock();
        let outcome = book.apply(commit);
        match &outcome {
            CommitOutcome::Applied(trade) => {
                self.journal.write().push(trade.transaction.clone());
                debug!(
                    property_id = %commit.property_id,
                    transaction_id = %trade.transaction.id,
                    gross = %trade.transaction.gross_value(),
                    available = trade.available_shares,
                    "Trade applied"
                );
            }
            CommitOutcome::Rejected(failure) => {
                debug!(property_id = %commit.property_id, ?failure, "Commit guard failed");
            }
        }
        Ok(outcome)
    }

    async fn transactions_for_user(&self, user_id: UserId) -> StoreResult<Vec<Transaction>> {
        self.check_available()?;
        Ok(self
            .journal
            .read()
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn transactions_for_property(
        &self,
        property_id: PropertyId,
    ) -> StoreResult<Vec<Transaction>> {
        self.check_available()?;
        Ok(self
            .journal
            .read()
            .iter()
            .rev()
            .filter(|t| t.property_id == property_id)
            .cloned()
            .collect())
    }

    async fn get_profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        self.check_available()?;
        Ok(self.profiles.get(&user_id).map(|p| p.clone()))
    }
}

#[async_trait]
impl IdentityResolver for MemoryStore {
    async fn upsert_profile(
        &self,
        wallet: &WalletAddress,
        email: Option<&str>,
    ) -> StoreResult<UserProfile> {
        self.check_available()?;
        let now = now();

        let user_id = *self.wallets.entry(wallet.clone()).or_insert_with(|| {
            let profile = UserProfile::new(wallet.clone(), email.map(str::to_string), now);
            let id = profile.id;
            self.profiles.insert(id, profile);
            id
        });

        let mut profile = self
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Corrupt(format!("wallet {} has no profile", wallet)))?;
        if let Some(email) = email {
            if profile.email.as_deref() != Some(email) {
                profile.email = Some(email.to_string());
                profile.updated_at = now;
            }
        }
        Ok(profile.clone())
    }

    async fn profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        self.get_profile(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateshare_common::{SharePrice, TransactionId};
    use rust_decimal::Decimal;

    fn property(total: i64) -> Property {
        let now = now();
        Property {
            id: PropertyId::new(),
            owner_id: UserId::new(),
            title: "Canal House".to_string(),
            location: "Amsterdam".to_string(),
            metadata_uri: "ipfs://canal".to_string(),
            total_shares: total,
            available_shares: total,
            price_per_share: SharePrice::new(Decimal::from(10)).unwrap(),
            created_at: now,
            updated_at: now,
        }
    }

    fn commit(kind: TradeKind, property_id: PropertyId, user_id: UserId, shares: i64) -> TradeCommit {
        TradeCommit {
            transaction_id: TransactionId::new(),
            kind,
            property_id,
            user_id,
            shares,
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_property_rejected() {
        let store = MemoryStore::new();
        let p = property(100);
        store.insert_property(&p).await.unwrap();

        let err = store.insert_property(&p).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_guards_leave_state_untouched() {
        let store = MemoryStore::new();
        let p = property(100);
        let user = UserId::new();
        store.insert_property(&p).await.unwrap();

        let outcome = store
            .commit_trade(&commit(TradeKind::Buy, p.id, user, 101))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Rejected(GuardFailure::Supply));

        let outcome = store
            .commit_trade(&commit(TradeKind::Sell, p.id, user, 1))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Rejected(GuardFailure::Capacity));

        assert_eq!(store.get_property(p.id).await.unwrap().unwrap(), p);
        assert!(store.get_holding(user, p.id).await.unwrap().is_none());
        assert_eq!(store.journal_len(), 0);
    }

    #[tokio::test]
    async fn test_commit_applies_all_three_changes() {
        let store = MemoryStore::new();
        let p = property(100);
        let user = UserId::new();
        store.insert_property(&p).await.unwrap();

        let CommitOutcome::Applied(trade) = store
            .commit_trade(&commit(TradeKind::Buy, p.id, user, 30))
            .await
            .unwrap()
        else {
            panic!("buy should apply");
        };

        assert_eq!(trade.available_shares, 70);
        assert_eq!(trade.holding_shares, 30);
        assert_eq!(trade.transaction.price_per_share, p.price_per_share);
        let report = store.invariant_report(p.id).await.unwrap().unwrap();
        assert_eq!(report.held_shares, 30);
        assert!(report.holds());
        assert_eq!(store.transactions_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sell_without_holding_rejected() {
        let store = MemoryStore::new();
        let p = property(100);
        let buyer = UserId::new();
        let stranger = UserId::new();
        store.insert_property(&p).await.unwrap();
        store
            .commit_trade(&commit(TradeKind::Buy, p.id, buyer, 10))
            .await
            .unwrap();

        let outcome = store
            .commit_trade(&commit(TradeKind::Sell, p.id, stranger, 5))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Rejected(GuardFailure::Holding));
        assert!(store.get_holding(stranger, p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_property_is_guard_failure() {
        let store = MemoryStore::new();
        let outcome = store
            .commit_trade(&commit(TradeKind::Buy, PropertyId::new(), UserId::new(), 1))
            .await
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Rejected(GuardFailure::MissingProperty));
    }

    #[tokio::test]
    async fn test_conflict_fault_counts_down() {
        let store = MemoryStore::new();
        let p = property(10);
        let user = UserId::new();
        store.insert_property(&p).await.unwrap();
        store.inject_fault(StoreFault::Conflicts(2));

        for _ in 0..2 {
            let err = store
                .commit_trade(&commit(TradeKind::Buy, p.id, user, 1))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Conflict(id) if id == p.id));
        }

        let outcome = store
            .commit_trade(&commit(TradeKind::Buy, p.id, user, 1))
            .await
            .unwrap();
        assert!(matches!(outcome, CommitOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn test_unavailable_fault_blocks_reads() {
        let store = MemoryStore::new();
        store.inject_fault(StoreFault::Unavailable);
        assert!(matches!(
            store.list_properties().await,
            Err(StoreError::Unavailable(_))
        ));

        store.clear_fault();
        assert!(store.list_properties().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_profile_is_find_or_create() {
        let store = MemoryStore::new();
        let wallet = WalletAddress::new("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU");

        let first = store.upsert_profile(&wallet, None).await.unwrap();
        let second = store
            .upsert_profile(&wallet, Some("owner@example.com"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email.as_deref(), Some("owner@example.com"));
        assert_eq!(
            store.profile(first.id).await.unwrap().unwrap().email.as_deref(),
            Some("owner@example.com")
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_malformed_wallet() {
        let store = MemoryStore::new();
        let err = store
            .resolve(&WalletAddress::new("not a wallet"), None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_WALLET");
    }
}
