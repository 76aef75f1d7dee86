//! Simulation metrics.

use std::collections::VecDeque;

use estateshare_common::LedgerError;
use serde::Serialize;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Total trades attempted.
    pub total_trades: u64,
    /// Trades committed.
    pub committed_trades: u64,
    /// Trades refused by supply or holding rules.
    pub rejected_trades: u64,
    /// Trades failed by the store or retry exhaustion.
    pub failed_trades: u64,
    /// Invariant checks that did not hold.
    pub invariant_violations: u64,
    /// Latency samples (microseconds).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_trades: 0,
            committed_trades: 0,
            rejected_trades: 0,
            failed_trades: 0,
            invariant_violations: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a committed trade.
    pub fn record_success(&mut self, latency_us: u64) {
        self.total_trades += 1;
        self.committed_trades += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Record a failed trade.
    pub fn record_failure(&mut self, error: &LedgerError) {
        self.total_trades += 1;
        if error.is_rejection() {
            self.rejected_trades += 1;
        } else {
            self.failed_trades += 1;
        }
    }

    pub fn record_violation(&mut self) {
        self.invariant_violations += 1;
    }

    /// Get average latency in microseconds.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Fraction of attempted trades that committed.
    pub fn success_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }

        self.committed_trades as f64 / self.total_trades as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateshare_common::PropertyId;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_success(100);
        metrics.record_success(200);
        metrics.record_success(150);
        metrics.record_failure(&LedgerError::InsufficientSupply {
            property_id: PropertyId::new(),
            requested: 10,
            available: 2,
        });

        assert_eq!(metrics.total_trades, 4);
        assert_eq!(metrics.committed_trades, 3);
        assert_eq!(metrics.rejected_trades, 1);
        assert_eq!(metrics.failed_trades, 0);
        assert_eq!(metrics.average_latency_us(), 150);
        assert_eq!(metrics.p99_latency_us(), 200);
        assert_eq!(metrics.success_rate(), 0.75);
    }

    #[test]
    fn test_store_failures_are_not_rejections() {
        let mut metrics = SimulationMetrics::new();
        metrics.record_failure(&LedgerError::Persistence("offline".to_string()));
        assert_eq!(metrics.failed_trades, 1);
        assert_eq!(metrics.rejected_trades, 0);
    }
}
