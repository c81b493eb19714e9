//! Delegation parameters, loadable from YAML
//!
//! ```yaml
//! epoch:
//!   kind: calendar_months
//!   origin_year: 2020
//!   origin_month: 1
//! minimum_delegation_amount: 100
//! allowed_periods: [3, 6, 12]
//! max_validators_per_holder: 20
//! undelegation_notice_secs: 259200
//! launch_lock:
//!   proof_of_use_percentage: 50
//!   lock_up_days: 90
//! ```
//!
//! Every field is optional, missing ones take the defaults shown above
//! (except the minimum, which defaults to 0).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::clock::{EpochClock, EpochSchedule};
use crate::error::ConfigError;
use crate::types::{Amount, SECONDS_PER_DAY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    pub epoch: EpochSchedule,
    /// Global floor for a single delegation
    pub minimum_delegation_amount: u64,
    /// Permitted term lengths, in epochs
    pub allowed_periods: BTreeSet<u64>,
    /// Distinct validators a holder may have live delegations with
    pub max_validators_per_holder: usize,
    /// Undelegation must be requested at least this long before the term ends
    pub undelegation_notice_secs: u64,
    pub launch_lock: LaunchLockConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchLockConfig {
    /// Share of purchased tokens that must be delegated to unlock them
    pub proof_of_use_percentage: u64,
    /// Days after the first delegation before unlocking is possible
    pub lock_up_days: u64,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            epoch: EpochSchedule::default(),
            minimum_delegation_amount: 0,
            allowed_periods: [3, 6, 12].into_iter().collect(),
            max_validators_per_holder: 20,
            undelegation_notice_secs: 3 * SECONDS_PER_DAY,
            launch_lock: LaunchLockConfig::default(),
        }
    }
}

impl Default for LaunchLockConfig {
    fn default() -> Self {
        Self {
            proof_of_use_percentage: 50,
            lock_up_days: 90,
        }
    }
}

impl DelegationConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        EpochClock::new(self.epoch).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.allowed_periods.is_empty() {
            return Err(ConfigError::Invalid("no delegation period is allowed".into()));
        }
        if self.allowed_periods.contains(&0) {
            return Err(ConfigError::Invalid("delegation period must be non-zero".into()));
        }
        if self.max_validators_per_holder == 0 {
            return Err(ConfigError::Invalid(
                "max_validators_per_holder must be non-zero".into(),
            ));
        }
        if self.launch_lock.proof_of_use_percentage > 100 {
            return Err(ConfigError::Invalid(format!(
                "proof_of_use_percentage {} exceeds 100",
                self.launch_lock.proof_of_use_percentage
            )));
        }
        Ok(())
    }

    pub fn is_period_allowed(&self, period: u64) -> bool {
        self.allowed_periods.contains(&period)
    }

    pub fn minimum_delegation_amount(&self) -> Amount {
        Amount::from(self.minimum_delegation_amount)
    }
}
