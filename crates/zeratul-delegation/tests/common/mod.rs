//! Shared setup for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use zeratul_delegation::{
    label_address, Address, DelegationConfig, DelegationController, EpochSchedule,
    InMemoryTokens, InMemoryValidators, ManualClock, ValidatorId,
};

/// Epoch length used by the fixed-epoch tests
pub const EPOCH: u64 = 30 * 24 * 60 * 60;

pub struct Network {
    pub controller: DelegationController<InMemoryValidators, InMemoryTokens>,
    pub clock: ManualClock,
    pub alice: Address,
    pub bob: Address,
    pub node: Address,
    pub validator: ValidatorId,
}

impl Network {
    /// alice and bob hold 1000 each, one trusted validator
    pub fn new() -> Self {
        Self::with_config(DelegationConfig {
            epoch: EpochSchedule::Fixed {
                origin: 0,
                duration: EPOCH,
            },
            ..DelegationConfig::default()
        })
    }

    pub fn with_config(config: DelegationConfig) -> Self {
        let alice = label_address("alice");
        let bob = label_address("bob");
        let node = label_address("node-1");

        let mut validators = InMemoryValidators::new();
        let validator = validators.register(node, "node-1", 0).unwrap();
        validators.enable(validator).unwrap();

        let mut tokens = InMemoryTokens::new();
        tokens.mint(alice, 1_000);
        tokens.mint(bob, 1_000);

        let clock = ManualClock::new(0);
        let controller =
            DelegationController::new(config, validators, tokens, Arc::new(clock.clone())).unwrap();

        Self {
            controller,
            clock,
            alice,
            bob,
            node,
            validator,
        }
    }

    /// Move to the start of the next epoch
    pub fn next_epoch(&self) {
        self.skip_epochs(1);
    }

    pub fn skip_epochs(&self, epochs: u64) {
        let now = zeratul_delegation::TimeSource::now(&self.clock);
        let next = (now / EPOCH + epochs) * EPOCH;
        self.clock.set(next);
    }

    pub fn locked(&mut self, holder: Address) -> u128 {
        self.controller.get_and_update_locked_amount(holder).unwrap()
    }

    pub fn delegated(&mut self, holder: Address) -> u128 {
        self.controller.get_and_update_delegated_amount(holder).unwrap()
    }

    pub fn validator_total(&mut self) -> u128 {
        self.controller
            .get_and_update_delegated_to_validator(self.validator)
            .unwrap()
    }
}
