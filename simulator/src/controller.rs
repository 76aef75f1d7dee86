//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use estateshare_common::{
    LedgerError, PropertyId, Result as LedgerResult, SharePrice, TradeReceipt, TradeRequest,
};
use estateshare_ledger::{
    IdentityResolver, LedgerConfig, LedgerEngine, LedgerStore, MemoryStore, NewProperty,
    StoreFault,
};

use crate::investor::{owner_wallet, Investor, InvestorFactory};
use crate::metrics::SimulationMetrics;
use crate::scenario::{AssertCondition, FaultType, Scenario, ScenarioStep};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub investors: usize,
    pub properties: usize,
    pub shares_per_property: i64,
    pub price_per_share: SharePrice,
    pub seed: Option<u64>,
}

/// Controls the simulation.
pub struct SimulationController<S> {
    /// Engine under test.
    engine: Arc<LedgerEngine<S>>,
    /// Store handle for fault injection, when the store supports it.
    faults: Option<Arc<MemoryStore>>,
    settings: SimulationSettings,
    /// Random number generator.
    rng: StdRng,
    investors: Vec<Investor>,
    properties: Vec<PropertyId>,
    /// Simulation metrics.
    metrics: SimulationMetrics,
}

impl<S> SimulationController<S>
where
    S: LedgerStore + IdentityResolver + 'static,
{
    /// Create a new simulation controller.
    pub fn new(store: Arc<S>, config: LedgerConfig, settings: SimulationSettings) -> Self {
        let rng = match settings.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            engine: Arc::new(LedgerEngine::with_config(store, config)),
            faults: None,
            settings,
            rng,
            investors: Vec::new(),
            properties: Vec::new(),
            metrics: SimulationMetrics::new(),
        }
    }

    /// Enable fault injection steps against an in-memory store.
    pub fn with_fault_injection(mut self, store: Arc<MemoryStore>) -> Self {
        self.faults = Some(store);
        self
    }

    /// Resolve investor profiles.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        info!(
            "Initializing simulation with {} investors",
            self.settings.investors
        );

        self.investors =
            InvestorFactory::create_investors(self.engine.store().as_ref(), self.settings.investors)
                .await?;

        Ok(())
    }

    /// Run a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        if scenario.injects_faults() && self.faults.is_none() {
            anyhow::bail!(
                "Scenario {} injects faults and needs the in-memory store",
                scenario.name
            );
        }

        for step in &scenario.steps {
            self.execute_step(step).await?;
        }

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::ListProperties => self.list_properties().await?,
            ScenarioStep::BuyBurst => {
                let slice = self.settings.shares_per_property / self.investors.len().max(1) as i64;
                info!("Every investor buys {} shares of every property", slice);
                let requests = self.for_each_pair(|property_id, investor| {
                    TradeRequest::buy(property_id, investor.id(), slice)
                });
                self.submit(requests).await;
            }
            ScenarioStep::Race { percent } => {
                let shares = self.settings.shares_per_property * i64::from(*percent) / 100;
                info!("Every investor races for {} shares of every property", shares);
                let requests = self.for_each_pair(|property_id, investor| {
                    TradeRequest::buy(property_id, investor.id(), shares)
                });
                self.submit(requests).await;
            }
            ScenarioStep::RandomTrades { count } => {
                let requests = self.random_requests(*count);
                info!("Submitting {} random trades", requests.len());
                self.submit(requests).await;
            }
            ScenarioStep::SellAll => {
                let mut requests = Vec::new();
                for investor in &self.investors {
                    for holding in self.engine.holdings_for_user(investor.id()).await? {
                        if holding.shares > 0 {
                            requests.push(TradeRequest::sell(
                                holding.property.id,
                                investor.id(),
                                holding.shares,
                            ));
                        }
                    }
                }
                info!("Unwinding {} holdings", requests.len());
                self.submit(requests).await;
            }
            ScenarioStep::InjectFault { fault_type } => {
                let fault = match *fault_type {
                    FaultType::Outage => StoreFault::Unavailable,
                    FaultType::Conflicts { count } => StoreFault::Conflicts(count),
                };
                if let Some(store) = &self.faults {
                    store.inject_fault(fault);
                }
            }
            ScenarioStep::ClearFault => {
                if let Some(store) = &self.faults {
                    info!("Clearing store fault");
                    store.clear_fault();
                }
            }
            ScenarioStep::VerifyInvariants => self.verify_invariants().await?,
            ScenarioStep::Assert { condition } => self.check_condition(*condition).await?,
        }

        Ok(())
    }

    async fn list_properties(&mut self) -> anyhow::Result<()> {
        let owner = self.engine.store().resolve(&owner_wallet(), None).await?;

        for index in 0..self.settings.properties {
            let listing = NewProperty {
                title: format!("Simulated Property {}", index + 1),
                location: format!("{} Market Street", 100 + index),
                metadata_uri: format!("ipfs://estateshare/sim/{}", index),
                total_shares: self.settings.shares_per_property,
                price_per_share: self.settings.price_per_share,
            };
            let property = self.engine.list_property(owner.id, listing).await?;
            self.properties.push(property.id);
        }

        info!("Listed {} properties", self.properties.len());
        Ok(())
    }

    fn for_each_pair<F>(&self, build: F) -> Vec<TradeRequest>
    where
        F: Fn(PropertyId, &Investor) -> TradeRequest,
    {
        self.properties
            .iter()
            .flat_map(|property_id| {
                self.investors
                    .iter()
                    .map(|investor| build(*property_id, investor))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn random_requests(&mut self, count: usize) -> Vec<TradeRequest> {
        if self.properties.is_empty() || self.investors.is_empty() {
            return Vec::new();
        }

        let max_shares = (self.settings.shares_per_property / 10).max(1);
        (0..count)
            .map(|_| {
                let property_id = self.properties[self.rng.gen_range(0..self.properties.len())];
                let user_id = self.investors[self.rng.gen_range(0..self.investors.len())].id();
                let shares = self.rng.gen_range(1..=max_shares);
                if self.rng.gen_bool(0.6) {
                    TradeRequest::buy(property_id, user_id, shares)
                } else {
                    TradeRequest::sell(property_id, user_id, shares)
                }
            })
            .collect()
    }

    /// Fire every request on its own task and wait for all of them.
    async fn submit(&mut self, requests: Vec<TradeRequest>) {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = engine.execute(request).await;
                    (result, started.elapsed())
                })
            })
            .collect();

        for joined in join_all(handles).await {
            match joined {
                Ok((result, elapsed)) => self.record(result, elapsed.as_micros() as u64),
                Err(e) => warn!("Trade task failed to complete: {}", e),
            }
        }
    }

    fn record(&mut self, result: LedgerResult<TradeReceipt>, latency_us: u64) {
        match result {
            Ok(_) => self.metrics.record_success(latency_us),
            Err(err) => self.metrics.record_failure(&err),
        }
    }

    async fn verify_invariants(&mut self) -> anyhow::Result<()> {
        for report in self.engine.verify_all().await? {
            if !report.holds() {
                warn!(
                    property_id = %report.property_id,
                    total = report.total_shares,
                    available = report.available_shares,
                    held = report.held_shares,
                    "Invariant violated"
                );
                self.metrics.record_violation();
            }
        }
        Ok(())
    }

    async fn check_condition(&self, condition: AssertCondition) -> anyhow::Result<()> {
        info!("Asserting condition: {:?}", condition);

        for property_id in &self.properties {
            let view = self.engine.get_property(*property_id).await?;
            let property = view.property;

            match condition {
                AssertCondition::Drained => {
                    if property.available_shares >= self.investors.len().max(1) as i64 {
                        anyhow::bail!(
                            "Property {} still has {} shares available",
                            property.id,
                            property.available_shares
                        );
                    }
                }
                AssertCondition::HoldersAtMost { max } => {
                    let holders = self.count_holders(property.id).await?;
                    if holders > max {
                        anyhow::bail!(
                            "Property {} has {} holders, expected at most {}",
                            property.id,
                            holders,
                            max
                        );
                    }
                }
                AssertCondition::FullyAvailable => {
                    if property.available_shares != property.total_shares {
                        anyhow::bail!(
                            "Property {} has {}/{} shares available",
                            property.id,
                            property.available_shares,
                            property.total_shares
                        );
                    }
                }
            }
        }

        Ok(())
    }

    async fn count_holders(&self, property_id: PropertyId) -> Result<usize, LedgerError> {
        let mut holders = 0;
        for investor in &self.investors {
            let holdings = self.engine.holdings_for_user(investor.id()).await?;
            if holdings
                .iter()
                .any(|h| h.property.id == property_id && h.shares > 0)
            {
                holders += 1;
            }
        }
        Ok(holders)
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    /// Ledger engine counters, in Prometheus text format.
    pub fn ledger_metrics(&self) -> String {
        self.engine.metrics().to_prometheus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(investors: usize, shares: i64) -> SimulationSettings {
        SimulationSettings {
            investors,
            properties: 2,
            shares_per_property: shares,
            price_per_share: SharePrice::parse("25.00").unwrap(),
            seed: Some(7),
        }
    }

    fn controller(investors: usize, shares: i64) -> SimulationController<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let config = LedgerConfig {
            retry_backoff: Duration::ZERO,
            retry_jitter: Duration::ZERO,
            ..LedgerConfig::default()
        };
        SimulationController::new(Arc::clone(&store), config, settings(investors, shares))
            .with_fault_injection(store)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sellout_drains_supply() {
        let mut controller = controller(4, 100);
        controller.initialize().await.unwrap();
        controller
            .run_scenario(&Scenario::load("sellout", 0).unwrap())
            .await
            .unwrap();

        let metrics = controller.get_metrics();
        assert_eq!(metrics.committed_trades, 8);
        assert_eq!(metrics.invariant_violations, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_race_has_single_winner() {
        let mut controller = controller(3, 100);
        controller.initialize().await.unwrap();
        controller
            .run_scenario(&Scenario::load("race", 0).unwrap())
            .await
            .unwrap();

        let metrics = controller.get_metrics();
        assert_eq!(metrics.committed_trades, 2);
        assert_eq!(metrics.rejected_trades, 4);
        assert_eq!(metrics.invariant_violations, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_churn_unwinds_fully() {
        let mut controller = controller(5, 200);
        controller.initialize().await.unwrap();
        controller
            .run_scenario(&Scenario::load("churn", 60).unwrap())
            .await
            .unwrap();

        assert_eq!(controller.get_metrics().invariant_violations, 0);
        assert_eq!(controller.get_metrics().failed_trades, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outage_keeps_invariant() {
        let mut controller = controller(4, 100);
        controller.initialize().await.unwrap();
        controller
            .run_scenario(&Scenario::load("outage", 30).unwrap())
            .await
            .unwrap();

        let metrics = controller.get_metrics();
        assert_eq!(metrics.invariant_violations, 0);
        assert!(metrics.failed_trades >= 10);
    }

    #[tokio::test]
    async fn test_fault_scenario_needs_memory_store() {
        let store = Arc::new(MemoryStore::new());
        let mut controller =
            SimulationController::new(store, LedgerConfig::default(), settings(2, 10));
        controller.initialize().await.unwrap();

        let err = controller
            .run_scenario(&Scenario::load("outage", 10).unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("in-memory store"));
    }
}
