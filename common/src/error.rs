//! Error types for the EstateShare ledger.

use crate::{PropertyId, UserId};
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed request (non-positive share count, missing field, bad price).
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Wallet address failed format checks.
    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),

    /// Property does not exist.
    #[error("Property not found: {0}")]
    PropertyNotFound(PropertyId),

    /// User profile does not exist.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Property id already taken.
    #[error("Property already exists: {0}")]
    DuplicateProperty(PropertyId),

    /// Not enough unowned shares to fill a buy.
    #[error("Insufficient supply for property {property_id}: requested {requested}, available {available}")]
    InsufficientSupply {
        property_id: PropertyId,
        requested: i64,
        available: i64,
    },

    /// User does not hold enough shares to fill a sell.
    #[error("Insufficient holding in property {property_id}: requested {requested}, held {held}")]
    InsufficientHolding {
        property_id: PropertyId,
        requested: i64,
        held: i64,
    },

    /// A sell would push available supply above the property's total.
    #[error("Sell of {requested} shares would exceed total supply of property {property_id} ({available}/{total} available)")]
    SupplyOverflow {
        property_id: PropertyId,
        requested: i64,
        available: i64,
        total: i64,
    },

    /// Guarded commit kept losing against concurrent writers.
    #[error("Gave up on property {property_id} after {attempts} conflicting commit attempts")]
    ConflictRetryExhausted {
        property_id: PropertyId,
        attempts: u32,
    },

    /// Store unreachable or the database transaction aborted.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Build a validation error tied to a request field.
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if this error is retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConflictRetryExhausted { .. } | LedgerError::Persistence(_)
        )
    }

    /// Business-rule rejections: expected outcomes, never retried.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientSupply { .. }
                | LedgerError::InsufficientHolding { .. }
                | LedgerError::SupplyOverflow { .. }
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::InvalidWallet(_) => "INVALID_WALLET",
            LedgerError::PropertyNotFound(_) => "PROPERTY_NOT_FOUND",
            LedgerError::UserNotFound(_) => "USER_NOT_FOUND",
            LedgerError::DuplicateProperty(_) => "DUPLICATE_PROPERTY",
            LedgerError::InsufficientSupply { .. } => "INSUFFICIENT_SUPPLY",
            LedgerError::InsufficientHolding { .. } => "INSUFFICIENT_HOLDING",
            LedgerError::SupplyOverflow { .. } => "SUPPLY_OVERFLOW",
            LedgerError::ConflictRetryExhausted { .. } => "CONFLICT_RETRY_EXHAUSTED",
            LedgerError::Persistence(_) => "PERSISTENCE_FAILURE",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// HTTP status the API layer reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::Validation { .. }
            | LedgerError::InvalidWallet(_)
            | LedgerError::InsufficientSupply { .. }
            | LedgerError::InsufficientHolding { .. } => 400,
            LedgerError::PropertyNotFound(_) | LedgerError::UserNotFound(_) => 404,
            LedgerError::DuplicateProperty(_) | LedgerError::SupplyOverflow { .. } => 409,
            LedgerError::ConflictRetryExhausted { .. } | LedgerError::Persistence(_) => 503,
            LedgerError::Configuration(_) => 500,
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rejections_are_not_retryable() {
        let err = LedgerError::InsufficientSupply {
            property_id: PropertyId::new(),
            requested: 60,
            available: 40,
        };
        assert!(err.is_rejection());
        assert!(!err.is_retryable());
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.error_code(), "INSUFFICIENT_SUPPLY");
    }

    #[test]
    fn test_server_failures_are_retryable() {
        let exhausted = LedgerError::ConflictRetryExhausted {
            property_id: PropertyId::new(),
            attempts: 8,
        };
        assert!(exhausted.is_retryable());
        assert_eq!(exhausted.http_status(), 503);

        let persistence = LedgerError::Persistence("connection reset".to_string());
        assert!(persistence.is_retryable());
        assert!(!persistence.is_rejection());
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(LedgerError::PropertyNotFound(PropertyId::new()).http_status(), 404);
    }
}
