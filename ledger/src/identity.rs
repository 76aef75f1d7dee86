//! Wallet identity resolution.
//!
//! Callers resolve a wallet address to a [`UserId`] before invoking the
//! engine. The engine itself never creates profiles.

use async_trait::async_trait;
use estateshare_common::{LedgerError, Result, Timestamp, UserId, WalletAddress};
use serde::{Deserialize, Serialize};

use crate::store::StoreResult;

/// A participant profile keyed by wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub wallet_address: WalletAddress,
    pub email: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl UserProfile {
    pub fn new(wallet_address: WalletAddress, email: Option<String>, now: Timestamp) -> Self {
        Self {
            id: UserId::new(),
            wallet_address,
            email,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Maps wallet addresses to stable user ids, creating profiles on first sight.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Find or create the profile for `wallet`. A supplied email replaces the stored one.
    async fn upsert_profile(
        &self,
        wallet: &WalletAddress,
        email: Option<&str>,
    ) -> StoreResult<UserProfile>;

    /// Look up a profile by id.
    async fn profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>>;

    /// Validate `wallet` and resolve it to a profile.
    async fn resolve(&self, wallet: &WalletAddress, email: Option<&str>) -> Result<UserProfile> {
        if !wallet.is_valid() {
            return Err(LedgerError::InvalidWallet(wallet.to_string()));
        }
        let profile = self.upsert_profile(wallet, email).await?;
        tracing::debug!(user_id = %profile.id, wallet = %wallet, "Wallet resolved");
        Ok(profile)
    }
}
