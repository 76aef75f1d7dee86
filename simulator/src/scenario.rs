//! Simulation scenarios.

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// List the configured number of properties.
    ListProperties,
    /// Every investor concurrently buys an equal slice of every property.
    BuyBurst,
    /// Every investor concurrently tries to buy `percent` of every property.
    Race { percent: u8 },
    /// Random buys and sells fired concurrently.
    RandomTrades { count: usize },
    /// Every investor concurrently sells everything it holds.
    SellAll,
    /// Inject a store fault.
    InjectFault { fault_type: FaultType },
    /// Clear any active store fault.
    ClearFault,
    /// Check `available + held == total` for every property.
    VerifyInvariants,
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultType {
    /// Store rejects every call.
    Outage,
    /// The next `count` commits report write conflicts.
    Conflicts { count: u32 },
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssertCondition {
    /// Less than one investor slice is left in each property.
    Drained,
    /// No property has more than `max` investors holding shares.
    HoldersAtMost { max: usize },
    /// Every share of every property is back in the available pool.
    FullyAvailable,
}

impl Scenario {
    /// Names accepted by [`Scenario::load`].
    pub const NAMES: [&'static str; 4] = ["sellout", "race", "churn", "outage"];

    /// Load a scenario by name.
    pub fn load(name: &str, trades: usize) -> anyhow::Result<Self> {
        match name {
            "sellout" => Ok(Self::sellout()),
            "race" => Ok(Self::race()),
            "churn" => Ok(Self::churn(trades)),
            "outage" => Ok(Self::outage(trades)),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (expected one of {})",
                name,
                Self::NAMES.join(", ")
            )),
        }
    }

    /// Whether the scenario needs a store that supports fault injection.
    pub fn injects_faults(&self) -> bool {
        self.steps
            .iter()
            .any(|step| matches!(step, ScenarioStep::InjectFault { .. }))
    }

    /// Investors split every property between them at once.
    fn sellout() -> Self {
        Self {
            name: "sellout".to_string(),
            description: "Concurrent buyers drain every property".to_string(),
            steps: vec![
                ScenarioStep::ListProperties,
                ScenarioStep::BuyBurst,
                ScenarioStep::VerifyInvariants,
                ScenarioStep::Assert {
                    condition: AssertCondition::Drained,
                },
            ],
        }
    }

    /// Oversized concurrent buys: only one per property can fit.
    fn race() -> Self {
        Self {
            name: "race".to_string(),
            description: "Concurrent buys of 60% each against the same supply".to_string(),
            steps: vec![
                ScenarioStep::ListProperties,
                ScenarioStep::Race { percent: 60 },
                ScenarioStep::VerifyInvariants,
                ScenarioStep::Assert {
                    condition: AssertCondition::HoldersAtMost { max: 1 },
                },
            ],
        }
    }

    fn churn(trades: usize) -> Self {
        Self {
            name: "churn".to_string(),
            description: "Random concurrent buys and sells, then a full unwind".to_string(),
            steps: vec![
                ScenarioStep::ListProperties,
                ScenarioStep::RandomTrades { count: trades },
                ScenarioStep::VerifyInvariants,
                ScenarioStep::SellAll,
                ScenarioStep::VerifyInvariants,
                ScenarioStep::Assert {
                    condition: AssertCondition::FullyAvailable,
                },
            ],
        }
    }

    /// Trading through a store outage and a burst of write conflicts.
    fn outage(trades: usize) -> Self {
        let batch = (trades / 3).max(1);
        Self {
            name: "outage".to_string(),
            description: "Trades during a store outage and under forced conflicts".to_string(),
            steps: vec![
                ScenarioStep::ListProperties,
                ScenarioStep::RandomTrades { count: batch },
                ScenarioStep::VerifyInvariants,
                ScenarioStep::InjectFault {
                    fault_type: FaultType::Outage,
                },
                ScenarioStep::RandomTrades { count: batch },
                ScenarioStep::ClearFault,
                ScenarioStep::VerifyInvariants,
                ScenarioStep::InjectFault {
                    fault_type: FaultType::Conflicts { count: 20 },
                },
                ScenarioStep::RandomTrades { count: batch },
                ScenarioStep::ClearFault,
                ScenarioStep::VerifyInvariants,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_known_scenarios() {
        for name in Scenario::NAMES {
            let scenario = Scenario::load(name, 30).unwrap();
            assert_eq!(scenario.name, name);
            assert_eq!(scenario.steps[0], ScenarioStep::ListProperties);
            assert!(scenario.steps.contains(&ScenarioStep::VerifyInvariants));
        }
        assert!(Scenario::load("meltdown", 30).is_err());
    }

    #[test]
    fn test_only_outage_injects_faults() {
        assert!(Scenario::load("outage", 30).unwrap().injects_faults());
        assert!(!Scenario::load("churn", 30).unwrap().injects_faults());
    }
}
