//! Delegation records and their lazily derived state
//!
//! ## Lifecycle
//!
//! ```text
//!              accept                 (started)
//! PROPOSED ───────────► ACCEPTED ─────────────► DELEGATED
//!    │  │                                           │
//!    │  │ (created + 1)                             │ request_undelegation
//!    │  └─────────────► REJECTED                    ▼
//!    │ cancel                            UNDELEGATION_REQUESTED
//!    └─────────────────► CANCELED                   │ (finished)
//!                                                   ▼
//!                                               COMPLETED
//! ```
//!
//! Transitions in parentheses happen by the passage of epochs alone. Nothing
//! stores them: the state is a pure function of the record and the epoch
//! it is observed at.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Address, Amount, DelegationId, Epoch, ValidatorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationState {
    Proposed,
    Accepted,
    Canceled,
    Rejected,
    Delegated,
    UndelegationRequested,
    Completed,
}

impl fmt::Display for DelegationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DelegationState::Proposed => "proposed",
            DelegationState::Accepted => "accepted",
            DelegationState::Canceled => "canceled",
            DelegationState::Rejected => "rejected",
            DelegationState::Delegated => "delegated",
            DelegationState::UndelegationRequested => "undelegation_requested",
            DelegationState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// A holder's request to lock `amount` with a validator for whole periods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: DelegationId,
    pub holder: Address,
    pub validator_id: ValidatorId,
    pub amount: Amount,
    /// Term length in epochs
    pub delegation_period: u64,
    pub info: String,
    /// Epoch the request was made in
    pub created: Epoch,
    /// First epoch the tokens count as delegated, set on acceptance
    pub started: Option<Epoch>,
    /// First epoch the tokens are released
    pub finished: Option<Epoch>,
    pub canceled: bool,
    /// Epoch undelegation was requested in
    pub undelegation_requested: Option<Epoch>,
    /// Part of `amount` lost to slashing
    pub slashed: Amount,
    /// Part of `amount` that came from launch-locked tokens
    pub launch_locked: Amount,
}

impl Delegation {
    pub fn new(
        id: DelegationId,
        holder: Address,
        validator_id: ValidatorId,
        amount: Amount,
        delegation_period: u64,
        info: String,
        created: Epoch,
    ) -> Self {
        Self {
            id,
            holder,
            validator_id,
            amount,
            delegation_period,
            info,
            created,
            started: None,
            finished: None,
            canceled: false,
            undelegation_requested: None,
            slashed: 0,
            launch_locked: 0,
        }
    }

    /// State as observed at `epoch`
    pub fn state_at(&self, epoch: Epoch) -> DelegationState {
        if self.canceled {
            return DelegationState::Canceled;
        }

        let Some(started) = self.started else {
            return if epoch <= self.created {
                DelegationState::Proposed
            } else {
                DelegationState::Rejected
            };
        };

        if epoch < started {
            DelegationState::Accepted
        } else if self.undelegation_requested.is_some() {
            match self.finished {
                Some(finished) if epoch >= finished => DelegationState::Completed,
                _ => DelegationState::UndelegationRequested,
            }
        } else {
            DelegationState::Delegated
        }
    }

    /// Amount still backing the validator after slashing
    pub fn effective_amount(&self) -> Amount {
        self.amount.saturating_sub(self.slashed)
    }

    /// Epoch the tokens are released, once an undelegation is scheduled
    pub fn release_epoch(&self) -> Option<Epoch> {
        self.undelegation_requested.and(self.finished)
    }

    /// Whether the tokens count toward the validator's total at `epoch`
    pub fn counts_toward_validator_at(&self, epoch: Epoch) -> bool {
        if self.canceled {
            return false;
        }
        let started = matches!(self.started, Some(started) if started <= epoch);
        let released = matches!(self.release_epoch(), Some(finished) if finished <= epoch);
        started && !released
    }

    /// End of the term running at `epoch`
    ///
    /// A delegation renews in whole periods until undelegation is requested,
    /// so this is the first `started + k * period` (k >= 1) after `epoch`.
    pub fn end_of_term(&self, epoch: Epoch) -> Option<Epoch> {
        let started = self.started?;
        let period = self.delegation_period;
        if period == 0 {
            return None;
        }
        let elapsed = epoch.saturating_sub(started);
        let terms = (elapsed / period).checked_add(1)?;
        terms.checked_mul(period)?.checked_add(started)
    }
}
