//! Token-launch lock (proof of use)
//!
//! Tokens bought in the token launch stay locked until the buyer proves they
//! use them: once enough of the purchase has been delegated and the lock-up
//! period since the first such delegation has passed, the whole purchase
//! unlocks at the next read.
//!
//! ```text
//! purchased = 1000, proof_of_use_percentage = 50, lock_up_days = 90
//!
//! epoch 3: delegate 500 (starts epoch 4)   total delegated = 500 (month 4)
//! epoch 4 + 90 days: 500 * 100 >= 1000 * 50  -> unlocked, locked view = 0
//! ```
//!
//! Purchased tokens may be delegated. While they are, the delegation
//! controller already locks them, so the launch view only reports the part
//! that is neither delegated nor waiting in a pending request.

use num_bigint::BigUint;
use std::collections::HashMap;

use tracing::info;

use crate::clock::EpochClock;
use crate::config::LaunchLockConfig;
use crate::error::Result;
use crate::ledger::{Ledger, LedgerKey};
use crate::types::{short_address, Address, Amount, Epoch, SECONDS_PER_DAY};

/// Cumulative purchased tokens a holder ever delegated, and the epoch the
/// first of them started working
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DelegatedTotal {
    delegated: Amount,
    month: Epoch,
}

#[derive(Debug, Clone)]
pub struct LaunchLocker {
    config: LaunchLockConfig,
    locked: HashMap<Address, Amount>,
    delegated: Ledger,
    totals: HashMap<Address, DelegatedTotal>,
}

impl LaunchLocker {
    pub fn new(config: LaunchLockConfig) -> Self {
        Self {
            config,
            locked: HashMap::new(),
            delegated: Ledger::new(),
            totals: HashMap::new(),
        }
    }

    /// Lock purchased tokens
    pub fn lock(&mut self, holder: Address, amount: Amount) {
        let locked = self.locked.entry(holder).or_insert(0);
        *locked = locked.saturating_add(amount);
        info!(holder = %short_address(&holder), amount = %amount, "launch tokens locked");
    }

    /// Purchased tokens still under the launch lock
    pub fn purchased(&self, holder: &Address) -> Amount {
        self.locked.get(holder).copied().unwrap_or(0)
    }

    /// Record an accepted delegation, returning how much of it came from
    /// purchased tokens
    pub fn handle_delegation_add(
        &mut self,
        holder: Address,
        amount: Amount,
        started: Epoch,
        current: Epoch,
    ) -> Result<Amount> {
        let locked = self.purchased(&holder);
        if locked == 0 {
            return Ok(0);
        }

        let key = LedgerKey::LaunchDelegated(holder);
        let already = self.delegated.get_and_update(key, current)?;
        let from_locked = amount.min(locked.saturating_sub(already));
        if from_locked == 0 {
            return Ok(0);
        }

        self.delegated.add(key, from_locked, started);
        let total = self.totals.entry(holder).or_insert(DelegatedTotal {
            delegated: 0,
            month: started,
        });
        total.delegated = total.delegated.saturating_add(from_locked);
        Ok(from_locked)
    }

    /// Release the purchased part of a delegation at `finished`
    pub fn handle_delegation_removal(&mut self, holder: Address, from_locked: Amount, finished: Epoch) {
        if from_locked > 0 {
            self.delegated
                .subtract(LedgerKey::LaunchDelegated(holder), from_locked, finished);
        }
    }

    /// Purchased tokens locked right now and not already locked by a
    /// delegation, unlocking everything once proof of use is satisfied
    pub fn get_and_update_locked_amount(
        &mut self,
        holder: Address,
        pending: Amount,
        current: Epoch,
        now: u64,
        clock: &EpochClock,
    ) -> Result<Amount> {
        let locked = self.purchased(&holder);
        if locked == 0 {
            return Ok(0);
        }

        if let Some(total) = self.totals.get(&holder).copied() {
            if self.proof_of_use_satisfied(total.delegated, locked) {
                let lock_up = self.config.lock_up_days.saturating_mul(SECONDS_PER_DAY);
                let lock_end = clock.epoch_start(total.month)?.saturating_add(lock_up);
                if now >= lock_end {
                    self.unlock(holder);
                    return Ok(0);
                }
            }
        }

        let delegated = self
            .delegated
            .get_and_update(LedgerKey::LaunchDelegated(holder), current)?;
        Ok(locked.saturating_sub(pending.saturating_add(delegated)))
    }

    fn proof_of_use_satisfied(&self, delegated: Amount, locked: Amount) -> bool {
        let percentage = Amount::from(self.config.proof_of_use_percentage);
        match (delegated.checked_mul(100), locked.checked_mul(percentage)) {
            (Some(lhs), Some(rhs)) => lhs >= rhs,
            _ => BigUint::from(delegated) * 100u32 >= BigUint::from(locked) * percentage,
        }
    }

    fn unlock(&mut self, holder: Address) {
        let amount = self.locked.remove(&holder).unwrap_or(0);
        self.totals.remove(&holder);
        info!(holder = %short_address(&holder), amount = %amount, "launch tokens unlocked");
    }
}
