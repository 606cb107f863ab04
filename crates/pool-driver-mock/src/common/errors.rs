//! Failure injection for mock sensor ports.
//!
//! Failures surface as [`TransportError`]s, exactly like a real bus fault, so
//! the producer's skip/degrade/recover paths can be exercised without hardware.
//! Scenarios are fixed at construction; `fail_next`, `lose_communication` and
//! `restore_communication` script failures while a test is running.

use super::rng::MockRng;
use parking_lot::Mutex;
use pool_core::error::TransportError;
use std::collections::HashMap;
use std::sync::Arc;

/// Error injection configuration shared by clones.
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` matches everything
    failure_rates: Arc<HashMap<&'static str, f64>>,
    scenarios: Arc<Vec<ErrorScenario>>,
    rng: Arc<MockRng>,
    state: Arc<Mutex<ErrorState>>,
}

#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail the next `count` operations of any kind
    FailNext { count: u32 },
    /// Fail `operation` after it succeeded `count` times
    FailAfterN {
        operation: &'static str,
        count: u32,
    },
    /// Every call to `operation` times out
    Timeout { operation: &'static str },
    /// The bus goes away on the first operation and stays away
    CommunicationLoss,
}

#[derive(Default, Debug)]
struct ErrorState {
    operation_counts: HashMap<&'static str, u32>,
    fail_next: u32,
    communication_lost: bool,
    loss_triggered: bool,
}

impl ErrorConfig {
    /// No injected errors.
    pub fn none() -> Self {
        Self::scenarios(Vec::new())
    }

    /// Uniform random failures on every operation.
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(Vec::new()),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        let fail_next = scenarios
            .iter()
            .map(|s| match s {
                ErrorScenario::FailNext { count } => *count,
                _ => 0,
            })
            .sum();
        Self {
            failure_rates: Arc::new(HashMap::new()),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(None)),
            state: Arc::new(Mutex::new(ErrorState {
                fail_next,
                ..Default::default()
            })),
        }
    }

    /// Per-operation failure rates.
    pub fn with_rates(rates: HashMap<&'static str, f64>, seed: Option<u64>) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(Vec::new()),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Fail the next `count` operations, on top of anything already queued.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().fail_next += count;
    }

    /// Every operation fails as unavailable until restored.
    pub fn lose_communication(&self) {
        let mut state = self.state.lock();
        state.communication_lost = true;
        state.loss_triggered = true;
    }

    pub fn restore_communication(&self) {
        self.state.lock().communication_lost = false;
    }

    pub fn is_communication_lost(&self) -> bool {
        self.state.lock().communication_lost
    }

    /// Decide whether `operation` fails this time.
    pub fn check_operation(&self, operation: &'static str) -> Result<(), TransportError> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(TransportError::unavailable("communication lost"));
        }

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransportError::bus(format!(
                "injected failure on '{}'",
                operation
            )));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(TransportError::bus(format!(
                            "injected failure after {} '{}' operations",
                            count, operation
                        )));
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(TransportError::timeout(format!(
                        "operation '{}' timed out",
                        operation
                    )));
                }
                ErrorScenario::CommunicationLoss if !state.loss_triggered => {
                    state.loss_triggered = true;
                    state.communication_lost = true;
                    return Err(TransportError::unavailable("communication lost"));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(TransportError::bus(format!(
                "random failure on '{}'",
                operation
            )));
        }

        Ok(())
    }

    /// Clear counters and restore communication.
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}
