//! Simulated investors.

use estateshare_common::{UserId, WalletAddress};
use estateshare_ledger::{IdentityResolver, UserProfile};

/// A simulated investor with a resolved profile.
#[derive(Debug, Clone)]
pub struct Investor {
    pub profile: UserProfile,
}

impl Investor {
    pub fn id(&self) -> UserId {
        self.profile.id
    }
}

/// Wallet address for the `index`-th simulated investor.
pub fn investor_wallet(index: usize) -> WalletAddress {
    WalletAddress::new(format!("SimInvestor{:05}", index))
}

/// Wallet address that lists every simulated property.
pub fn owner_wallet() -> WalletAddress {
    WalletAddress::new("SimPropertyOwner")
}

/// Investor factory for creating test investors.
pub struct InvestorFactory;

impl InvestorFactory {
    /// Resolve `count` investor wallets into profiles.
    pub async fn create_investors<R: IdentityResolver>(
        resolver: &R,
        count: usize,
    ) -> anyhow::Result<Vec<Investor>> {
        let mut investors = Vec::with_capacity(count);
        for index in 0..count {
            let email = format!("investor{}@sim.estateshare.dev", index);
            let profile = resolver
                .resolve(&investor_wallet(index), Some(&email))
                .await?;
            investors.push(Investor { profile });
        }
        Ok(investors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateshare_ledger::MemoryStore;

    #[test]
    fn test_wallets_are_valid() {
        assert!(owner_wallet().is_valid());
        assert!(investor_wallet(0).is_valid());
        assert_ne!(investor_wallet(1), investor_wallet(2));
    }

    #[tokio::test]
    async fn test_create_investors_is_idempotent() {
        let store = MemoryStore::new();
        let first = InvestorFactory::create_investors(&store, 3).await.unwrap();
        let second = InvestorFactory::create_investors(&store, 3).await.unwrap();

        assert_eq!(first.len(), 3);
        let ids: Vec<_> = first.iter().map(Investor::id).collect();
        assert_eq!(ids, second.iter().map(Investor::id).collect::<Vec<_>>());
    }
}
