//! Scripted scenario replay
//!
//! A scenario sets up validators and holders, then runs a list of steps
//! against a controller driven by a [`ManualClock`]. Expectation steps check
//! states and balances along the way, so a scenario file doubles as an
//! executable description of a delegation lifecycle.
//!
//! ```yaml
//! validators:
//!   - name: node-1
//! holders:
//!   - name: alice
//!     balance: 1000
//! steps:
//!   - op: delegate
//!     holder: alice
//!     validator: node-1
//!     amount: 100
//!     period: 3
//!   - op: accept
//!     validator: node-1
//!     delegation: 0
//!   - op: skip
//!     days: 31
//!   - op: expect_delegated
//!     holder: alice
//!     amount: 100
//!   - op: cancel
//!     holder: alice
//!     delegation: 0
//!     expect_failure: true
//! ```
//!
//! Every party is named. Addresses are derived from the names, so a
//! validator's name is also the address of its controller.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{EpochClock, ManualClock};
use crate::config::DelegationConfig;
use crate::controller::DelegationController;
use crate::delegation::DelegationState;
use crate::error::DelegationError;
use crate::tokens::{InMemoryTokens, TokenBalances};
use crate::types::{label_address, Amount, DelegationId, Epoch, ValidatorId, SECONDS_PER_DAY};
use crate::validators::{InMemoryValidators, RegistryError};

type Controller = DelegationController<InMemoryValidators, InMemoryTokens>;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("step {step}: {source}")]
    Step {
        step: usize,
        #[source]
        source: DelegationError,
    },

    #[error("step {step}: expected the operation to fail, it succeeded")]
    UnexpectedSuccess { step: usize },

    #[error("step {step}: expected {expected}, found {found}")]
    Mismatch {
        step: usize,
        expected: String,
        found: String,
    },

    #[error("unknown validator name {0:?}")]
    UnknownValidator(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Unix time the replay starts at, the epoch origin if absent
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
    #[serde(default)]
    pub holders: Vec<HolderSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorSpec {
    pub name: String,
    #[serde(default)]
    pub minimum_delegation_amount: u64,
    #[serde(default = "default_trusted")]
    pub trusted: bool,
}

fn default_trusted() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolderSpec {
    pub name: String,
    #[serde(default)]
    pub balance: u64,
    /// Tokens bought in the token launch, locked until proof of use
    #[serde(default)]
    pub purchased: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,
    #[serde(default)]
    pub expect_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Action {
    Delegate {
        holder: String,
        validator: String,
        amount: u64,
        period: u64,
        #[serde(default)]
        info: String,
    },
    Accept {
        validator: String,
        delegation: DelegationId,
    },
    Cancel {
        holder: String,
        delegation: DelegationId,
    },
    Undelegate {
        caller: String,
        delegation: DelegationId,
    },
    Skip {
        #[serde(default)]
        days: u64,
        #[serde(default)]
        seconds: u64,
    },
    Slash {
        validator: String,
        amount: u64,
    },
    Forgive {
        holder: String,
        amount: u64,
    },
    Transfer {
        from: String,
        to: String,
        amount: u64,
    },
    ExpectState {
        delegation: DelegationId,
        state: DelegationState,
    },
    ExpectLocked {
        holder: String,
        amount: u64,
    },
    ExpectDelegated {
        holder: String,
        amount: u64,
    },
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderReport {
    pub name: String,
    pub balance: Amount,
    pub locked: Amount,
    pub delegated: Amount,
    pub slashed: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorReport {
    pub name: String,
    pub id: ValidatorId,
    pub delegated: Amount,
    pub bond: Amount,
}

/// Final balances after a replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub steps: usize,
    pub expected_failures: usize,
    pub epoch: Epoch,
    pub delegations: usize,
    pub holders: Vec<HolderReport>,
    pub validators: Vec<ValidatorReport>,
}

struct Replay {
    controller: Controller,
    clock: ManualClock,
    validators: HashMap<String, ValidatorId>,
}

/// Run every step, stopping at the first unexpected outcome
pub fn run(config: DelegationConfig, scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    let mut replay = Replay::new(config, scenario)?;
    let mut expected_failures = 0;

    for (index, step) in scenario.steps.iter().enumerate() {
        match (replay.execute(index, &step.action), step.expect_failure) {
            (Ok(()), false) => {}
            (Ok(()), true) => return Err(ScenarioError::UnexpectedSuccess { step: index }),
            (Err(ScenarioError::Delegation(err)), true) => {
                info!(step = index, kind = ?err.kind(), error = %err, "operation failed as expected");
                expected_failures += 1;
            }
            (Err(ScenarioError::Delegation(source)), false) => {
                warn!(step = index, error = %source, "operation failed");
                return Err(ScenarioError::Step {
                    step: index,
                    source,
                });
            }
            (Err(other), _) => return Err(other),
        }
    }

    replay.report(scenario, expected_failures)
}

impl Replay {
    fn new(config: DelegationConfig, scenario: &Scenario) -> Result<Self, ScenarioError> {
        let mut registry = InMemoryValidators::new();
        let mut validators = HashMap::new();
        for spec in &scenario.validators {
            let id = registry.register(
                label_address(&spec.name),
                spec.name.clone(),
                Amount::from(spec.minimum_delegation_amount),
            )?;
            if spec.trusted {
                registry.enable(id)?;
            }
            validators.insert(spec.name.clone(), id);
        }

        let mut tokens = InMemoryTokens::new();
        for holder in &scenario.holders {
            tokens.mint(label_address(&holder.name), Amount::from(holder.balance));
        }

        config.validate().map_err(DelegationError::from)?;
        let origin = EpochClock::new(config.epoch)
            .map_err(DelegationError::from)?
            .origin();
        let clock = ManualClock::new(scenario.start.unwrap_or(origin));

        let mut controller =
            DelegationController::new(config, registry, tokens, Arc::new(clock.clone()))?;
        for holder in &scenario.holders {
            if holder.purchased > 0 {
                controller.lock_purchased(label_address(&holder.name), Amount::from(holder.purchased));
            }
        }

        Ok(Self {
            controller,
            clock,
            validators,
        })
    }

    fn validator_id(&self, name: &str) -> Result<ValidatorId, ScenarioError> {
        self.validators
            .get(name)
            .copied()
            .ok_or_else(|| ScenarioError::UnknownValidator(name.to_string()))
    }

    fn execute(&mut self, step: usize, action: &Action) -> Result<(), ScenarioError> {
        match action {
            Action::Delegate {
                holder,
                validator,
                amount,
                period,
                info,
            } => {
                let validator_id = self.validator_id(validator)?;
                self.controller.delegate(
                    label_address(holder),
                    validator_id,
                    Amount::from(*amount),
                    *period,
                    info.clone(),
                )?;
            }
            Action::Accept {
                validator,
                delegation,
            } => {
                self.controller
                    .accept_pending_delegation(label_address(validator), *delegation)?;
            }
            Action::Cancel { holder, delegation } => {
                self.controller
                    .cancel_pending_delegation(label_address(holder), *delegation)?;
            }
            Action::Undelegate { caller, delegation } => {
                self.controller
                    .request_undelegation(label_address(caller), *delegation)?;
            }
            Action::Skip { days, seconds } => {
                self.clock
                    .skip(days.saturating_mul(SECONDS_PER_DAY).saturating_add(*seconds));
            }
            Action::Slash { validator, amount } => {
                let validator_id = self.validator_id(validator)?;
                self.controller.slash(validator_id, Amount::from(*amount))?;
            }
            Action::Forgive { holder, amount } => {
                self.controller
                    .forgive(label_address(holder), Amount::from(*amount))?;
            }
            Action::Transfer { from, to, amount } => {
                self.controller.transfer(
                    label_address(from),
                    label_address(to),
                    Amount::from(*amount),
                )?;
            }
            Action::ExpectState { delegation, state } => {
                let found = self.controller.get_state(*delegation)?;
                expect(step, state, &found)?;
            }
            Action::ExpectLocked { holder, amount } => {
                let found = self
                    .controller
                    .get_and_update_locked_amount(label_address(holder))?;
                expect(step, &Amount::from(*amount), &found)?;
            }
            Action::ExpectDelegated { holder, amount } => {
                let found = self
                    .controller
                    .get_and_update_delegated_amount(label_address(holder))?;
                expect(step, &Amount::from(*amount), &found)?;
            }
        }
        Ok(())
    }

    fn report(
        &mut self,
        scenario: &Scenario,
        expected_failures: usize,
    ) -> Result<ScenarioReport, ScenarioError> {
        let mut holders = Vec::new();
        for holder in &scenario.holders {
            let address = label_address(&holder.name);
            holders.push(HolderReport {
                name: holder.name.clone(),
                balance: self.controller.tokens().balance_of(&address),
                locked: self.controller.get_and_update_locked_amount(address)?,
                delegated: self.controller.get_and_update_delegated_amount(address)?,
                slashed: self.controller.get_and_update_slashed_amount(address)?,
            });
        }

        let mut validators = Vec::new();
        for spec in &scenario.validators {
            let id = self.validator_id(&spec.name)?;
            validators.push(ValidatorReport {
                name: spec.name.clone(),
                id,
                delegated: self.controller.get_and_update_delegated_to_validator(id)?,
                bond: self.controller.get_and_update_bond_amount(id)?,
            });
        }

        Ok(ScenarioReport {
            steps: scenario.steps.len(),
            expected_failures,
            epoch: self.controller.current_epoch()?,
            delegations: self.controller.delegation_count(),
            holders,
            validators,
        })
    }
}

fn expect<T: PartialEq + std::fmt::Display>(step: usize, expected: &T, found: &T) -> Result<(), ScenarioError> {
    if expected == found {
        Ok(())
    } else {
        Err(ScenarioError::Mismatch {
            step,
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}
