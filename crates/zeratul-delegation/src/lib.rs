//! Zeratul Delegation - validator delegation with lazy, epoch-indexed accounting
//!
//! Token holders lock tokens with validators for whole periods of epochs.
//! Validators accept or ignore requests, holders or validators end them, and
//! balances (locked, delegated, slashed, per-validator totals) are exact at
//! any epoch without a scheduler: every action writes its future effects
//! into epoch-indexed sequences that are caught up on the next read.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      DelegationController                           │
//! │  delegate / accept / cancel / request_undelegation / slash / views  │
//! ├──────────────────────┬──────────────────────┬───────────────────────┤
//! │  Vec<Delegation>     │  Ledger              │  SlashingLog          │
//! │  (state derived      │  Locked(holder)      │  events per validator │
//! │   from record +      │  Delegated(holder)   │  cursor per holder    │
//! │   current epoch)     │  Slashed(holder)     ├───────────────────────┤
//! │                      │  DelegatedTo(v)      │  LaunchLocker         │
//! │                      │  (Sequence each)     │  proof-of-use lock    │
//! └──────────┬───────────┴──────────┬───────────┴───────────────────────┘
//!            │                      │
//!            ▼                      ▼
//! ┌────────────────────┐   ┌─────────────────┐   ┌──────────────────────┐
//! │ ValidatorDirectory │   │ TokenBalances   │   │ EpochClock +         │
//! │ (registry, trait)  │   │ (token, trait)  │   │ TimeSource           │
//! └────────────────────┘   └─────────────────┘   └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use zeratul_delegation::{
//!     label_address, DelegationConfig, DelegationController, DelegationState, EpochSchedule,
//!     InMemoryTokens, InMemoryValidators, ManualClock,
//! };
//!
//! let alice = label_address("alice");
//! let node = label_address("node-1");
//!
//! let mut validators = InMemoryValidators::new();
//! let validator = validators.register(node, "node-1", 0).unwrap();
//! validators.enable(validator).unwrap();
//! let mut tokens = InMemoryTokens::new();
//! tokens.mint(alice, 1_000);
//!
//! let clock = ManualClock::new(0);
//! let config = DelegationConfig {
//!     epoch: EpochSchedule::Fixed { origin: 0, duration: 3_600 },
//!     ..DelegationConfig::default()
//! };
//! let mut controller =
//!     DelegationController::new(config, validators, tokens, Arc::new(clock.clone())).unwrap();
//!
//! let id = controller.delegate(alice, validator, 100, 3, "first").unwrap();
//! controller.accept_pending_delegation(node, id).unwrap();
//!
//! clock.skip(3_600);
//! assert_eq!(controller.get_state(id).unwrap(), DelegationState::Delegated);
//! assert_eq!(controller.get_and_update_delegated_amount(alice).unwrap(), 100);
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod delegation;
pub mod error;
pub mod launch_lock;
pub mod ledger;
pub mod scenario;
pub mod sequence;
pub mod slashing;
pub mod tokens;
pub mod types;
pub mod validators;
pub mod views;

pub use clock::{EpochClock, EpochSchedule, ManualClock, SystemTimeSource, TimeSource};
pub use config::{DelegationConfig, LaunchLockConfig};
pub use controller::DelegationController;
pub use delegation::{Delegation, DelegationState};
pub use error::{ClockError, ConfigError, DelegationError, ErrorKind, Result, SequenceError};
pub use launch_lock::LaunchLocker;
pub use ledger::{Ledger, LedgerKey};
pub use scenario::{Scenario, ScenarioError, ScenarioReport};
pub use sequence::{Diff, Sequence};
pub use slashing::{SlashingEvent, SlashingLog};
pub use tokens::{InMemoryTokens, TokenBalances, TokenError};
pub use types::*;
pub use validators::{InMemoryValidators, RegistryError, ValidatorDirectory, ValidatorInfo};
