//! Ledger configuration.

use std::time::Duration;

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/estateshare".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Main ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Commit attempts per trade before giving up with a retryable error.
    pub max_commit_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_backoff: Duration,
    /// Upper bound of random jitter added to each delay.
    pub retry_jitter: Duration,
    /// Show zero-share holdings in user listings.
    pub include_empty_holdings: bool,
    /// Database settings; `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 8,
            retry_backoff: Duration::from_millis(2),
            retry_jitter: Duration::from_millis(3),
            include_empty_holdings: false,
            database: None,
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(attempts) = std::env::var("LEDGER_MAX_COMMIT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.max_commit_attempts = attempts;
            }
        }

        if let Ok(ms) = std::env::var("LEDGER_RETRY_BACKOFF_MS") {
            if let Ok(ms) = ms.parse() {
                config.retry_backoff = Duration::from_millis(ms);
            }
        }

        if let Ok(flag) = std::env::var("LEDGER_INCLUDE_EMPTY_HOLDINGS") {
            config.include_empty_holdings = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            let mut database = DatabaseConfig {
                url,
                ..DatabaseConfig::default()
            };
            if let Ok(max) = std::env::var("LEDGER_DB_MAX_CONNECTIONS") {
                if let Ok(max) = max.parse() {
                    database.max_connections = max;
                }
            }
            config.database = Some(database);
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_commit_attempts == 0 {
            return Err("max_commit_attempts must be at least 1".to_string());
        }

        if let Some(database) = &self.database {
            if database.url.is_empty() {
                return Err("Database URL cannot be empty".to_string());
            }
            if database.max_connections == 0 {
                return Err("Database pool needs at least one connection".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.database.is_none());
        assert!(!config.include_empty_holdings);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = LedgerConfig::default();
        config.max_commit_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.database = Some(DatabaseConfig {
            url: String::new(),
            ..DatabaseConfig::default()
        });
        assert!(config.validate().is_err());
    }
}
