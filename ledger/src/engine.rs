//! Core ledger engine implementation.
//!
//! Trades are validated, checked against a fresh read, and then committed
//! through the store's guarded [`LedgerStore::commit_trade`]. A guard that
//! fails at commit time means another writer got there first: the engine
//! re-reads and either reports the business rejection or tries again, up to
//! `max_commit_attempts`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use estateshare_common::{
    now, retry_delay, LedgerError, PropertyId, Result, TradeKind, TradeReceipt, TradeRequest,
    TransactionId, UserId,
};

use crate::config::LedgerConfig;
use crate::holding::{HoldingView, InvariantReport};
use crate::journal::{TradeCommit, Transaction};
use crate::metrics::{LedgerMetrics, MetricsSnapshot, SharedMetrics};
use crate::property::{NewProperty, Property, PropertyView};
use crate::store::{CommitOutcome, LedgerStore, StoreError};

/// The ledger engine owns every mutation of supply, holdings and the journal.
pub struct LedgerEngine<S> {
    store: Arc<S>,
    config: LedgerConfig,
    metrics: SharedMetrics,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(LedgerMetrics::new()),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Shared handle to the engine counters.
    pub fn metrics(&self) -> SharedMetrics {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// List a new property with its full supply available.
    #[instrument(skip(self, listing), fields(title = %listing.title))]
    pub async fn list_property(&self, owner_id: UserId, listing: NewProperty) -> Result<Property> {
        listing.validate()?;

        if self.store.get_profile(owner_id).await?.is_none() {
            return Err(LedgerError::UserNotFound(owner_id));
        }

        let property = listing.into_property(owner_id, now());
        self.store
            .insert_property(&property)
            .await
            .map_err(|err| match err {
                StoreError::Duplicate(_) => LedgerError::DuplicateProperty(property.id),
                other => other.into(),
            })?;

        info!(
            property_id = %property.id,
            owner_id = %owner_id,
            total_shares = property.total_shares,
            price = %property.price_per_share,
            "Property listed"
        );

        Ok(property)
    }

    /// Buy `shares` of a property from the available pool.
    pub async fn buy(
        &self,
        property_id: PropertyId,
        user_id: UserId,
        shares: i64,
    ) -> Result<TradeReceipt> {
        self.execute(TradeRequest::buy(property_id, user_id, shares))
            .await
    }

    /// Sell `shares` of a property back to the available pool.
    pub async fn sell(
        &self,
        property_id: PropertyId,
        user_id: UserId,
        shares: i64,
    ) -> Result<TradeReceipt> {
        self.execute(TradeRequest::sell(property_id, user_id, shares))
            .await
    }

    /// Execute a trade request, recording the outcome in metrics.
    #[instrument(
        skip(self, request),
        fields(
            kind = %request.kind,
            property_id = %request.property_id,
            user_id = %request.user_id,
            shares = request.shares
        )
    )]
    pub async fn execute(&self, request: TradeRequest) -> Result<TradeReceipt> {
        match self.run_trade(&request).await {
            Ok(receipt) => {
                self.metrics.trade_committed(receipt.kind, receipt.shares);
                info!(
                    transaction_id = %receipt.transaction_id,
                    available = receipt.available_shares,
                    holding = receipt.holding_shares,
                    "Trade committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                self.metrics.trade_failed(&err);
                if err.is_retryable() {
                    warn!(error = %err, "Trade failed");
                } else {
                    info!(code = err.error_code(), "Trade rejected");
                }
                Err(err)
            }
        }
    }

    async fn run_trade(&self, request: &TradeRequest) -> Result<TradeReceipt> {
        request.validate()?;

        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut guard_lost = false;
        for attempt in 1..=max_attempts {
            self.read_and_check(request).await?;

            let commit = TradeCommit {
                transaction_id: TransactionId::new(),
                kind: request.kind,
                property_id: request.property_id,
                user_id: request.user_id,
                shares: request.shares,
                created_at: now(),
            };

            match self.store.commit_trade(&commit).await {
                Ok(CommitOutcome::Applied(trade)) => return Ok(trade.receipt()),
                Ok(CommitOutcome::Rejected(failure)) => {
                    // State moved under us; the next read decides.
                    guard_lost = true;
                    self.metrics.commit_conflict();
                    debug!(attempt, ?failure, "Commit guard failed, re-reading");
                }
                Err(StoreError::Conflict(_)) => {
                    guard_lost = false;
                    self.metrics.commit_conflict();
                    debug!(attempt, "Store reported write conflict");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
                Err(StoreError::MissingReference(_)) => {
                    return Err(LedgerError::UserNotFound(request.user_id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        // A lost guard on the final attempt may be a plain business rejection.
        if guard_lost {
            self.read_and_check(request).await?;
        }

        Err(LedgerError::ConflictRetryExhausted {
            property_id: request.property_id,
            attempts: max_attempts,
        })
    }

    async fn read_and_check(&self, request: &TradeRequest) -> Result<()> {
        let property = self
            .store
            .get_property(request.property_id)
            .await?
            .ok_or(LedgerError::PropertyNotFound(request.property_id))?;
        self.check_trade(request, &property).await
    }

    /// Business rules evaluated against the latest read.
    async fn check_trade(&self, request: &TradeRequest, property: &Property) -> Result<()> {
        match request.kind {
            TradeKind::Buy => {
                if !property.can_supply(request.shares) {
                    return Err(LedgerError::InsufficientSupply {
                        property_id: property.id,
                        requested: request.shares,
                        available: property.available_shares,
                    });
                }
            }
            TradeKind::Sell => {
                let holding = self
                    .store
                    .get_holding(request.user_id, request.property_id)
                    .await?;
                if !holding.as_ref().is_some_and(|h| h.covers(request.shares)) {
                    let held = holding.map_or(0, |h| h.shares);
                    return Err(LedgerError::InsufficientHolding {
                        property_id: property.id,
                        requested: request.shares,
                        held,
                    });
                }
                if !property.can_absorb(request.shares) {
                    return Err(LedgerError::SupplyOverflow {
                        property_id: property.id,
                        requested: request.shares,
                        available: property.available_shares,
                        total: property.total_shares,
                    });
                }
            }
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let max_jitter = self.config.retry_jitter.as_micros() as u64;
        let jitter = if max_jitter == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::thread_rng().gen_range(0..=max_jitter))
        };
        retry_delay(self.config.retry_backoff, attempt, jitter)
    }

    /// Get a property with its owner profile.
    pub async fn get_property(&self, property_id: PropertyId) -> Result<PropertyView> {
        let property = self
            .store
            .get_property(property_id)
            .await?
            .ok_or(LedgerError::PropertyNotFound(property_id))?;
        self.with_owner(property).await
    }

    /// All properties with owner profiles, oldest listing first.
    pub async fn list_properties(&self) -> Result<Vec<PropertyView>> {
        let properties = self.store.list_properties().await?;
        let mut views = Vec::with_capacity(properties.len());
        for property in properties {
            views.push(self.with_owner(property).await?);
        }
        Ok(views)
    }

    async fn with_owner(&self, property: Property) -> Result<PropertyView> {
        let owner = self.store.get_profile(property.owner_id).await?;
        Ok(PropertyView { property, owner })
    }

    /// A user's holdings joined with property display fields, ordered by property id.
    pub async fn holdings_for_user(&self, user_id: UserId) -> Result<Vec<HoldingView>> {
        let holdings = self.store.holdings_for_user(user_id).await?;

        let mut views = Vec::with_capacity(holdings.len());
        for holding in holdings {
            if holding.is_empty() && !self.config.include_empty_holdings {
                continue;
            }
            match self.store.get_property(holding.property_id).await? {
                Some(property) => views.push(HoldingView {
                    property: property.summary(),
                    shares: holding.shares,
                }),
                None => warn!(
                    property_id = %holding.property_id,
                    user_id = %user_id,
                    "Holding references a missing property"
                ),
            }
        }
        Ok(views)
    }

    /// A user's transactions, newest first.
    pub async fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        Ok(self.store.transactions_for_user(user_id).await?)
    }

    /// A property's audit trail, newest first.
    pub async fn transactions_for_property(
        &self,
        property_id: PropertyId,
    ) -> Result<Vec<Transaction>> {
        if self.store.get_property(property_id).await?.is_none() {
            return Err(LedgerError::PropertyNotFound(property_id));
        }
        Ok(self.store.transactions_for_property(property_id).await?)
    }

    /// Compare a property's supply against the sum of its holdings.
    pub async fn verify_invariant(&self, property_id: PropertyId) -> Result<InvariantReport> {
        let report = self
            .store
            .invariant_report(property_id)
            .await?
            .ok_or(LedgerError::PropertyNotFound(property_id))?;
        if !report.holds() {
            tracing::error!(?report, "Share supply invariant violated");
        }
        Ok(report)
    }

    /// Invariant reports for every listed property.
    pub async fn verify_all(&self) -> Result<Vec<InvariantReport>> {
        let properties = self.store.list_properties().await?;
        let mut reports = Vec::with_capacity(properties.len());
        for property in properties {
            reports.push(self.verify_invariant(property.id).await?);
        }
        Ok(reports)
    }
}
