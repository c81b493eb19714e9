//! Slashing: shrinking delegations after a validator misbehaves
//!
//! Penalty sizes are decided elsewhere. Here a slash of `amount` against a
//! validator whose total is `T` at epoch `e` becomes a coefficient
//! `(T - amount) / T` applied to everything that backed the validator at `e`.
//!
//! The validator total is reduced at once. Holders are caught up lazily:
//! each slash is logged per validator, and the next time a holder's
//! balances are touched every unseen event is applied to that holder's
//! delegations.
//!
//! ```text
//! T = 1000 at epoch 5, slash 100 -> coefficient 9/10
//!
//! alice delegated 400 (started epoch 2, release scheduled at 8)
//!   loss = 400 - 400 * 9/10 = 40
//!   delegated: -40 at 5, +40 at 8   (only 360 is released)
//!   locked:    +40 at 8             (the slashed 40 stays locked)
//!   slashed:   +40 at 5
//! ```

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::DelegationController;
use crate::error::{DelegationError, Result};
use crate::ledger::LedgerKey;
use crate::tokens::TokenBalances;
use crate::types::{short_address, Address, Amount, Epoch, Fraction, ValidatorId};
use crate::validators::ValidatorDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashingEvent {
    pub validator_id: ValidatorId,
    pub epoch: Epoch,
    /// Share of each delegation that survives
    pub coefficient: Fraction,
    /// Amount taken from the validator total
    pub amount: Amount,
}

/// Per-validator slashing history with a read cursor per holder
#[derive(Debug, Clone, Default)]
pub struct SlashingLog {
    events: HashMap<ValidatorId, Vec<SlashingEvent>>,
    cursors: HashMap<(Address, ValidatorId), usize>,
}

impl SlashingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: SlashingEvent) {
        self.events.entry(event.validator_id).or_default().push(event);
    }

    pub fn events(&self, validator_id: ValidatorId) -> &[SlashingEvent] {
        self.events
            .get(&validator_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Events the holder has not seen yet, marking them seen
    pub fn take_unprocessed(&mut self, holder: Address, validator_id: ValidatorId) -> Vec<SlashingEvent> {
        let events = self
            .events
            .get(&validator_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let cursor = self.cursors.entry((holder, validator_id)).or_insert(0);
        let unseen = events.get(*cursor..).unwrap_or(&[]).to_vec();
        *cursor = events.len();
        unseen
    }
}

impl<V: ValidatorDirectory, T: TokenBalances> DelegationController<V, T> {
    /// Slash `amount` from a validator's delegated total at the current epoch
    ///
    /// Returns the amount actually taken, which is capped by the total.
    pub fn slash(&mut self, validator_id: ValidatorId, amount: Amount) -> Result<Amount> {
        if self.validators.validator(validator_id).is_none() {
            return Err(DelegationError::UnknownValidator(validator_id));
        }

        let epoch = self.current_epoch()?;
        let key = LedgerKey::DelegatedToValidator(validator_id);
        let total = self.ledger.get_and_update(key, epoch)?;
        let amount = amount.min(total);
        if total == 0 || amount == 0 {
            return Ok(0);
        }

        let coefficient = Fraction::new(total - amount, total).unwrap_or_else(Fraction::zero);
        self.ledger.reduce(key, coefficient, epoch, Epoch::MAX)?;
        self.ledger.compact(key, epoch);
        self.slashing.record(SlashingEvent {
            validator_id,
            epoch,
            coefficient,
            amount,
        });

        info!(
            validator = validator_id,
            epoch,
            amount = %amount,
            total = %total,
            "validator slashed"
        );
        Ok(amount)
    }

    /// Return slashed tokens to a holder
    pub fn forgive(&mut self, holder: Address, amount: Amount) -> Result<()> {
        self.apply_pending_slashes(holder)?;

        let epoch = self.current_epoch()?;
        let slashed = self.ledger.get_and_update(LedgerKey::Slashed(holder), epoch)?;
        if amount > slashed {
            return Err(DelegationError::NotEnoughSlashed {
                requested: amount,
                available: slashed,
            });
        }

        self.ledger.subtract(LedgerKey::Slashed(holder), amount, epoch);
        self.ledger.subtract(LedgerKey::Locked(holder), amount, epoch);

        info!(holder = %short_address(&holder), amount = %amount, "slashed tokens forgiven");
        Ok(())
    }

    /// Apply every slashing event the holder has not seen to their delegations
    ///
    /// Slashes are only ever recorded at the current epoch, so once the
    /// holder is caught up nothing writes to their sequences before it and
    /// the older checkpoints are compacted.
    pub fn apply_pending_slashes(&mut self, holder: Address) -> Result<()> {
        let epoch = self.current_epoch()?;
        let validators: BTreeSet<ValidatorId> = self
            .delegations_by_holder(&holder)
            .into_iter()
            .map(|d| d.validator_id)
            .collect();

        for validator_id in validators {
            for event in self.slashing.take_unprocessed(holder, validator_id) {
                self.apply_slash(holder, &event);
            }
        }

        for key in [
            LedgerKey::Locked(holder),
            LedgerKey::Delegated(holder),
            LedgerKey::Slashed(holder),
        ] {
            self.ledger.compact(key, epoch);
        }
        if let Some(own) = self.validators.validator_id_by_address(&holder) {
            self.ledger.compact(LedgerKey::Bond(own), epoch);
        }
        Ok(())
    }

    fn apply_slash(&mut self, holder: Address, event: &SlashingEvent) {
        let ids = self.by_holder.get(&holder).cloned().unwrap_or_default();
        let bond = self
            .is_self_delegation(holder, event.validator_id)
            .then_some(LedgerKey::Bond(event.validator_id));

        for id in ids {
            let Some(delegation) = self.delegations.get_mut(id as usize) else {
                continue;
            };
            if delegation.validator_id != event.validator_id
                || !delegation.counts_toward_validator_at(event.epoch)
            {
                continue;
            }

            let effective = delegation.effective_amount();
            let loss = effective - event.coefficient.apply(effective);
            if loss == 0 {
                continue;
            }
            delegation.slashed = delegation.slashed.saturating_add(loss);
            let release = delegation.release_epoch();

            // the release must be corrected before the loss lands, otherwise a
            // checkpoint already drained by the release would clamp
            if let Some(finished) = release {
                self.ledger.add(LedgerKey::Delegated(holder), loss, finished);
                self.ledger.add(LedgerKey::Locked(holder), loss, finished);
                if let Some(bond) = bond {
                    self.ledger.add(bond, loss, finished);
                }
            }
            self.ledger.subtract(LedgerKey::Delegated(holder), loss, event.epoch);
            self.ledger.add(LedgerKey::Slashed(holder), loss, event.epoch);
            if let Some(bond) = bond {
                self.ledger.subtract(bond, loss, event.epoch);
            }

            debug!(
                delegation = id,
                validator = event.validator_id,
                epoch = event.epoch,
                loss = %loss,
                "slash applied to delegation"
            );
        }
    }
}
