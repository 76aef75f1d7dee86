//! Ledger engine counters.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use estateshare_common::{LedgerError, TradeKind};
use serde::Serialize;

/// Engine metrics.
pub struct LedgerMetrics {
    /// Committed buys.
    pub buys_committed: AtomicU64,
    /// Committed sells.
    pub sells_committed: AtomicU64,
    /// Shares moved out of available supply.
    pub shares_bought: AtomicU64,
    /// Shares returned to available supply.
    pub shares_sold: AtomicU64,
    /// Business-rule rejections (supply, holding, overflow).
    pub trades_rejected: AtomicU64,
    /// Validation and not-found failures.
    pub trades_invalid: AtomicU64,
    /// Commit attempts lost to concurrent writers and retried.
    pub commit_conflicts: AtomicU64,
    /// Trades abandoned after exhausting commit attempts.
    pub retries_exhausted: AtomicU64,
    /// Store failures surfaced to callers.
    pub persistence_failures: AtomicU64,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self {
            buys_committed: AtomicU64::new(0),
            sells_committed: AtomicU64::new(0),
            shares_bought: AtomicU64::new(0),
            shares_sold: AtomicU64::new(0),
            trades_rejected: AtomicU64::new(0),
            trades_invalid: AtomicU64::new(0),
            commit_conflicts: AtomicU64::new(0),
            retries_exhausted: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
        }
    }

    /// Record a committed trade.
    pub fn trade_committed(&self, kind: TradeKind, shares: i64) {
        let shares = shares.unsigned_abs();
        match kind {
            TradeKind::Buy => {
                self.buys_committed.fetch_add(1, Ordering::Relaxed);
                self.shares_bought.fetch_add(shares, Ordering::Relaxed);
            }
            TradeKind::Sell => {
                self.sells_committed.fetch_add(1, Ordering::Relaxed);
                self.shares_sold.fetch_add(shares, Ordering::Relaxed);
            }
        }
    }

    /// Record a commit attempt lost to a concurrent writer.
    pub fn commit_conflict(&self) {
        self.commit_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Classify and record a failed trade.
    pub fn trade_failed(&self, error: &LedgerError) {
        let counter = match error {
            e if e.is_rejection() => &self.trades_rejected,
            LedgerError::ConflictRetryExhausted { .. } => &self.retries_exhausted,
            LedgerError::Persistence(_) => &self.persistence_failures,
            _ => &self.trades_invalid,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            buys_committed: self.buys_committed.load(Ordering::Relaxed),
            sells_committed: self.sells_committed.load(Ordering::Relaxed),
            shares_bought: self.shares_bought.load(Ordering::Relaxed),
            shares_sold: self.shares_sold.load(Ordering::Relaxed),
            trades_rejected: self.trades_rejected.load(Ordering::Relaxed),
            trades_invalid: self.trades_invalid.load(Ordering::Relaxed),
            commit_conflicts: self.commit_conflicts.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();
        for (name, help, value) in snapshot.counters() {
            let _ = writeln!(out, "# HELP estateshare_{} {}", name, help);
            let _ = writeln!(out, "# TYPE estateshare_{} counter", name);
            let _ = writeln!(out, "estateshare_{} {}", name, value);
        }
        out
    }
}

impl Default for LedgerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub buys_committed: u64,
    pub sells_committed: u64,
    pub shares_bought: u64,
    pub shares_sold: u64,
    pub trades_rejected: u64,
    pub trades_invalid: u64,
    pub commit_conflicts: u64,
    pub retries_exhausted: u64,
    pub persistence_failures: u64,
}

impl MetricsSnapshot {
    /// Total committed trades.
    pub fn trades_committed(&self) -> u64 {
        self.buys_committed + self.sells_committed
    }

    fn counters(&self) -> [(&'static str, &'static str, u64); 9] {
        [
            ("buys_committed_total", "Committed buy trades", self.buys_committed),
            ("sells_committed_total", "Committed sell trades", self.sells_committed),
            ("shares_bought_total", "Shares moved out of available supply", self.shares_bought),
            ("shares_sold_total", "Shares returned to available supply", self.shares_sold),
            ("trades_rejected_total", "Trades rejected by supply or holding rules", self.trades_rejected),
            ("trades_invalid_total", "Trades failing validation or lookup", self.trades_invalid),
            ("commit_conflicts_total", "Commit attempts lost to concurrent writers", self.commit_conflicts),
            ("retries_exhausted_total", "Trades abandoned after retry exhaustion", self.retries_exhausted),
            ("persistence_failures_total", "Store failures surfaced to callers", self.persistence_failures),
        ]
    }
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<LedgerMetrics>;

#[cfg(test)]
mod tests {
    use super::*;
    use estateshare_common::PropertyId;

    #[test]
    fn test_metrics_increment() {
        let metrics = LedgerMetrics::new();

        metrics.trade_committed(TradeKind::Buy, 10);
        metrics.trade_committed(TradeKind::Sell, 4);
        metrics.commit_conflict();
        metrics.trade_failed(&LedgerError::InsufficientHolding {
            property_id: PropertyId::new(),
            requested: 5,
            held: 0,
        });
        metrics.trade_failed(&LedgerError::Persistence("down".to_string()));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.trades_committed(), 2);
        assert_eq!(snapshot.shares_bought, 10);
        assert_eq!(snapshot.shares_sold, 4);
        assert_eq!(snapshot.commit_conflicts, 1);
        assert_eq!(snapshot.trades_rejected, 1);
        assert_eq!(snapshot.persistence_failures, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = LedgerMetrics::new();
        metrics.trade_committed(TradeKind::Buy, 3);

        let output = metrics.to_prometheus();
        assert!(output.contains("estateshare_buys_committed_total 1"));
        assert!(output.contains("estateshare_shares_bought_total 3"));
    }
}
