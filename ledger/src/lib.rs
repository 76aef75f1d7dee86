//! EstateShare Ledger Engine
//!
//! Fractional property share ledger: tracks available supply per property,
//! per-user holdings and an append-only trade journal, keeping
//! `available + held == total` under concurrent buys and sells.

pub mod config;
pub mod engine;
pub mod holding;
pub mod identity;
pub mod journal;
pub mod metrics;
pub mod property;
pub mod store;

pub use config::{DatabaseConfig, LedgerConfig};
pub use engine::LedgerEngine;
pub use holding::{Holding, HoldingView, InvariantReport};
pub use identity::{IdentityResolver, UserProfile};
pub use journal::{CommittedTrade, TradeCommit, Transaction};
pub use metrics::{LedgerMetrics, MetricsSnapshot, SharedMetrics};
pub use property::{NewProperty, Property, PropertySummary, PropertyView};
pub use store::{LedgerStore, MemoryStore, PgStore, StoreError, StoreFault};
