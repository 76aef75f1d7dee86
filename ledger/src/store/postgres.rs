//! PostgreSQL ledger store.
//!
//! Each commit runs in one database transaction. Guards are expressed as
//! conditional `UPDATE ... RETURNING` statements, so Postgres re-evaluates
//! them against the latest committed row after any lock wait.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use estateshare_common::{
    now, LedgerError, PropertyId, Result, SharePrice, TradeKind, TransactionId, UserId,
    WalletAddress,
};

use super::{CommitOutcome, GuardFailure, LedgerStore, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::holding::{Holding, InvariantReport};
use crate::identity::{IdentityResolver, UserProfile};
use crate::journal::{CommittedTrade, TradeCommit, Transaction};
use crate::property::Property;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

const PROPERTY_COLUMNS: &str = "id, owner_id, title, location, metadata_uri, total_shares, \
     available_shares, price_per_share, created_at, updated_at";
const HOLDING_COLUMNS: &str = "user_id, property_id, shares, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, property_id, user_id, kind, shares, price_per_share, created_at";
const PROFILE_COLUMNS: &str = "id, wallet_address, email, created_at, updated_at";

/// Integrity violations that no retry can fix.
fn constraint_error(code: &str, message: &str) -> Option<StoreError> {
    match code {
        UNIQUE_VIOLATION => Some(StoreError::Duplicate(message.to_string())),
        FOREIGN_KEY_VIOLATION => Some(StoreError::MissingReference(message.to_string())),
        _ => None,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if let Some(mapped) = db
                .code()
                .and_then(|code| constraint_error(&code, db.message()))
            {
                return mapped;
            }
        }
        match &err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Serialization failures and deadlocks become retryable conflicts.
fn commit_error(err: sqlx::Error, property_id: PropertyId) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ) {
            return StoreError::Conflict(property_id);
        }
    }
    err.into()
}

fn decode_price(value: Decimal) -> StoreResult<SharePrice> {
    SharePrice::new(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn property_from_row(row: &PgRow) -> StoreResult<Property> {
    Ok(Property {
        id: PropertyId::from_uuid(row.try_get("id")?),
        owner_id: UserId::from_uuid(row.try_get("owner_id")?),
        title: row.try_get("title")?,
        location: row.try_get("location")?,
        metadata_uri: row.try_get("metadata_uri")?,
        total_shares: row.try_get("total_shares")?,
        available_shares: row.try_get("available_shares")?,
        price_per_share: decode_price(row.try_get("price_per_share")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn holding_from_row(row: &PgRow) -> StoreResult<Holding> {
    Ok(Holding {
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        property_id: PropertyId::from_uuid(row.try_get("property_id")?),
        shares: row.try_get("shares")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    let kind: String = row.try_get("kind")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        property_id: PropertyId::from_uuid(row.try_get("property_id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        kind: TradeKind::parse(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown trade kind {}", kind)))?,
        shares: row.try_get("shares")?,
        price_per_share: decode_price(row.try_get("price_per_share")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> StoreResult<UserProfile> {
    let wallet: String = row.try_get("wallet_address")?;
    Ok(UserProfile {
        id: UserId::from_uuid(row.try_get("id")?),
        wallet_address: WalletAddress::new(wallet),
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Ledger store backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool using `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| LedgerError::Persistence(format!("Failed to connect to database: {}", e)))?;

        info!(max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Persistence(format!("Migration failed: {}", e)))?;
        info!("Ledger schema migrated");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_property(&self, property: &Property) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO properties ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            PROPERTY_COLUMNS
        ))
        .bind(*property.id.as_uuid())
        .bind(*property.owner_id.as_uuid())
        .bind(&property.title)
        .bind(&property.location)
        .bind(&property.metadata_uri)
        .bind(property.total_shares)
        .bind(property.available_shares)
        .bind(property.price_per_share.value())
        .bind(property.created_at)
        .bind(property.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_property(&self, property_id: PropertyId) -> StoreResult<Option<Property>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM properties WHERE id = $1",
            PROPERTY_COLUMNS
        ))
        .bind(*property_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(property_from_row).transpose()
    }

    async fn list_properties(&self) -> StoreResult<Vec<Property>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM properties ORDER BY created_at, id",
            PROPERTY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(property_from_row).collect()
    }

    async fn get_holding(
        &self,
        user_id: UserId,
        property_id: PropertyId,
    ) -> StoreResult<Option<Holding>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM holdings WHERE user_id = $1 AND property_id = $2",
            HOLDING_COLUMNS
        ))
        .bind(*user_id.as_uuid())
        .bind(*property_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(holding_from_row).transpose()
    }

    async fn holdings_for_user(&self, user_id: UserId) -> StoreResult<Vec<Holding>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM holdings WHERE user_id = $1 ORDER BY property_id",
            HOLDING_COLUMNS
        ))
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(holding_from_row).collect()
    }

    async fn invariant_report(
        &self,
        property_id: PropertyId,
    ) -> StoreResult<Option<InvariantReport>> {
        // One statement, one snapshot: supply and holdings cannot drift apart.
        let row = sqlx::query(
            "SELECT p.total_shares, p.available_shares, \
                    COALESCE((SELECT SUM(h.shares) FROM holdings h WHERE h.property_id = p.id), 0)::BIGINT AS held \
             FROM properties p WHERE p.id = $1",
        )
        .bind(*property_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> StoreResult<InvariantReport> {
            Ok(InvariantReport {
                property_id,
                total_shares: row.try_get("total_shares")?,
                available_shares: row.try_get("available_shares")?,
                held_shares: row.try_get("held")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, commit), fields(property_id = %commit.property_id, kind = %commit.kind))]
    async fn commit_trade(&self, commit: &TradeCommit) -> StoreResult<CommitOutcome> {
        let property_id = commit.property_id;
        let fail = |e: sqlx::Error| commit_error(e, property_id);

        let mut tx = self.pool.begin().await.map_err(fail)?;

        // Property row first: every writer locks in the same order.
        let supply = sqlx::query(
            "UPDATE properties \
             SET available_shares = available_shares + $2, updated_at = $3 \
             WHERE id = $1 \
               AND available_shares + $2 >= 0 \
               AND available_shares + $2 <= total_shares \
             RETURNING available_shares, price_per_share",
        )
        .bind(*property_id.as_uuid())
        .bind(commit.kind.available_delta(commit.shares))
        .bind(commit.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(fail)?;

        let Some(supply) = supply else {
            let exists = sqlx::query("SELECT 1 FROM properties WHERE id = $1")
                .bind(*property_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(fail)?
                .is_some();
            tx.rollback().await.map_err(fail)?;

            let failure = match (exists, commit.kind) {
                (false, _) => GuardFailure::MissingProperty,
                (true, TradeKind::Buy) => GuardFailure::Supply,
                (true, TradeKind::Sell) => GuardFailure::Capacity,
            };
            debug!(?failure, "Supply guard failed");
            return Ok(CommitOutcome::Rejected(failure));
        };

        let available_shares: i64 = supply.try_get("available_shares")?;
        let price_per_share = decode_price(supply.try_get("price_per_share")?)?;

        let holding = match commit.kind {
            TradeKind::Buy => sqlx::query(
                "INSERT INTO holdings (user_id, property_id, shares, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $4) \
                 ON CONFLICT (user_id, property_id) DO UPDATE \
                 SET shares = holdings.shares + EXCLUDED.shares, updated_at = EXCLUDED.updated_at \
                 RETURNING shares",
            ),
            TradeKind::Sell => sqlx::query(
                "UPDATE holdings SET shares = shares - $3, updated_at = $4 \
                 WHERE user_id = $1 AND property_id = $2 AND shares >= $3 \
                 RETURNING shares",
            ),
        }
        .bind(*commit.user_id.as_uuid())
        .bind(*property_id.as_uuid())
        .bind(commit.shares)
        .bind(commit.created_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(fail)?;

        let Some(holding) = holding else {
            tx.rollback().await.map_err(fail)?;
            debug!("Holding guard failed");
            return Ok(CommitOutcome::Rejected(GuardFailure::Holding));
        };
        let holding_shares: i64 = holding.try_get("shares")?;

        let transaction = commit.clone().into_transaction(price_per_share);
        sqlx::query(&format!(
            "INSERT INTO share_transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            TRANSACTION_COLUMNS
        ))
        .bind(*transaction.id.as_uuid())
        .bind(*transaction.property_id.as_uuid())
        .bind(*transaction.user_id.as_uuid())
        .bind(transaction.kind.as_str())
        .bind(transaction.shares)
        .bind(transaction.price_per_share.value())
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await
        .map_err(fail)?;

        tx.commit().await.map_err(fail)?;
        debug!(
            transaction_id = %transaction.id,
            gross = %transaction.gross_value(),
            available = available_shares,
            "Trade committed"
        );

        Ok(CommitOutcome::Applied(CommittedTrade {
            transaction,
            available_shares,
            holding_shares,
        }))
    }

    async fn transactions_for_user(&self, user_id: UserId) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM share_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(*user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn transactions_for_property(
        &self,
        property_id: PropertyId,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM share_transactions WHERE property_id = $1 \
             ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(*property_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn get_profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }
}

#[async_trait]
impl IdentityResolver for PgStore {
    async fn upsert_profile(
        &self,
        wallet: &WalletAddress,
        email: Option<&str>,
    ) -> StoreResult<UserProfile> {
        let row = sqlx::query(&format!(
            "INSERT INTO profiles ({cols}) VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (wallet_address) DO UPDATE \
             SET email = COALESCE(EXCLUDED.email, profiles.email), \
                 updated_at = CASE \
                     WHEN EXCLUDED.email IS NOT NULL AND EXCLUDED.email IS DISTINCT FROM profiles.email \
                     THEN EXCLUDED.updated_at \
                     ELSE profiles.updated_at \
                 END \
             RETURNING {cols}",
            cols = PROFILE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(wallet.as_str())
        .bind(email)
        .bind(now())
        .fetch_one(&self.pool)
        .await?;
        profile_from_row(&row)
    }

    async fn profile(&self, user_id: UserId) -> StoreResult<Option<UserProfile>> {
        self.get_profile(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::NewProperty;

    async fn connect() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgStore::connect(&DatabaseConfig {
            url,
            ..DatabaseConfig::default()
        })
        .await
        .unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[test]
    fn test_constraint_codes() {
        assert!(matches!(
            constraint_error("23505", "dup"),
            Some(StoreError::Duplicate(_))
        ));
        assert!(matches!(
            constraint_error("23503", "fk"),
            Some(StoreError::MissingReference(_))
        ));
        assert!(constraint_error(SERIALIZATION_FAILURE, "retry").is_none());
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL instance in DATABASE_URL"]
    async fn test_guarded_commit_round_trip() {
        let store = connect().await;
        let owner = store
            .resolve(&WalletAddress::new(format!("owner{}", Uuid::new_v4().simple())), None)
            .await
            .unwrap();
        let buyer = store
            .resolve(&WalletAddress::new(format!("buyer{}", Uuid::new_v4().simple())), None)
            .await
            .unwrap();

        let property = NewProperty {
            title: "Mill Street Duplex".to_string(),
            location: "Portland".to_string(),
            metadata_uri: "ipfs://duplex".to_string(),
            total_shares: 100,
            price_per_share: SharePrice::parse("12.50").unwrap(),
        }
        .into_property(owner.id, now());
        store.insert_property(&property).await.unwrap();

        let buy = TradeCommit {
            transaction_id: TransactionId::new(),
            kind: TradeKind::Buy,
            property_id: property.id,
            user_id: buyer.id,
            shares: 60,
            created_at: now(),
        };
        assert!(matches!(
            store.commit_trade(&buy).await.unwrap(),
            CommitOutcome::Applied(_)
        ));

        let second = TradeCommit {
            transaction_id: TransactionId::new(),
            ..buy
        };
        assert_eq!(
            store.commit_trade(&second).await.unwrap(),
            CommitOutcome::Rejected(GuardFailure::Supply)
        );

        let stored = store.get_property(property.id).await.unwrap().unwrap();
        assert_eq!(stored.available_shares, 40);
        let report = store.invariant_report(property.id).await.unwrap().unwrap();
        assert_eq!(report.held_shares, 60);
        assert!(report.holds());
        assert_eq!(store.transactions_for_user(buyer.id).await.unwrap().len(), 1);
    }
}
