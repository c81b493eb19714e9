//! Delegation controller: the lifecycle state machine
//!
//! The controller owns the delegation records, the balance ledger and its
//! collaborators. Every explicit action schedules all of its balance effects
//! right away, at the epochs where they take hold:
//!
//! ```text
//! action                  epoch   locked   delegated   validator total
//! delegate                e       +a
//!                         e+1     -a                                    (rejected unless accepted)
//! accept                  e+1     +a       +a          +a
//! cancel                  e       -a
//!                         e+1     +a
//! request_undelegation    F       -eff     -eff        -eff             (F = end of term)
//! ```
//!
//! When the holder is the validator's own address, accept and undelegation
//! also move the validator's bond by the same amounts.
//!
//! Implicit transitions (rejection, start of delegation, completion) are
//! never stored. Reading a balance or a state at a later epoch simply sees
//! the diffs that have come due.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::info;

use crate::clock::{EpochClock, TimeSource};
use crate::config::DelegationConfig;
use crate::delegation::{Delegation, DelegationState};
use crate::error::{ClockError, DelegationError, Result};
use crate::launch_lock::LaunchLocker;
use crate::ledger::{Ledger, LedgerKey};
use crate::slashing::SlashingLog;
use crate::tokens::TokenBalances;
use crate::types::{short_address, Address, Amount, DelegationId, Epoch, ValidatorId};
use crate::validators::ValidatorDirectory;

pub struct DelegationController<V, T> {
    pub(crate) config: DelegationConfig,
    pub(crate) clock: EpochClock,
    pub(crate) time: Arc<dyn TimeSource>,
    pub(crate) validators: V,
    pub(crate) tokens: T,
    pub(crate) delegations: Vec<Delegation>,
    pub(crate) by_holder: HashMap<Address, Vec<DelegationId>>,
    pub(crate) by_validator: HashMap<ValidatorId, Vec<DelegationId>>,
    pub(crate) ledger: Ledger,
    pub(crate) slashing: SlashingLog,
    pub(crate) launch: LaunchLocker,
}

impl<V: ValidatorDirectory, T: TokenBalances> DelegationController<V, T> {
    pub fn new(
        config: DelegationConfig,
        validators: V,
        tokens: T,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;
        let clock = EpochClock::new(config.epoch)?;
        let launch = LaunchLocker::new(config.launch_lock.clone());

        Ok(Self {
            config,
            clock,
            time,
            validators,
            tokens,
            delegations: Vec::new(),
            by_holder: HashMap::new(),
            by_validator: HashMap::new(),
            ledger: Ledger::new(),
            slashing: SlashingLog::new(),
            launch,
        })
    }

    pub fn config(&self) -> &DelegationConfig {
        &self.config
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn now(&self) -> u64 {
        self.time.now()
    }

    pub fn current_epoch(&self) -> Result<Epoch> {
        Ok(self.clock.epoch_of(self.time.now())?)
    }

    pub fn validators(&self) -> &V {
        &self.validators
    }

    pub fn validators_mut(&mut self) -> &mut V {
        &mut self.validators
    }

    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    /// Put tokens bought in the token launch under the launch lock
    pub fn lock_purchased(&mut self, holder: Address, amount: Amount) {
        self.launch.lock(holder, amount);
    }

    /// Propose delegating `amount` to `validator_id` for `period` epochs
    ///
    /// The tokens are locked from the current epoch. If the validator does
    /// not accept before the epoch ends the request is rejected and the
    /// tokens unlock on their own.
    pub fn delegate(
        &mut self,
        holder: Address,
        validator_id: ValidatorId,
        amount: Amount,
        period: u64,
        info: impl Into<String>,
    ) -> Result<DelegationId> {
        let epoch = self.current_epoch()?;
        let next = epoch.checked_add(1).ok_or(ClockError::OutOfRange(epoch))?;

        let validator = self
            .validators
            .validator(validator_id)
            .ok_or(DelegationError::UnknownValidator(validator_id))?;
        if !self.validators.is_authorized_for_delegation(validator_id) {
            return Err(DelegationError::ValidatorNotAuthorized(validator_id));
        }
        if !validator.accepting_new_requests {
            return Err(DelegationError::ValidatorNotAcceptingRequests(validator_id));
        }
        if !self.config.is_period_allowed(period) {
            return Err(DelegationError::PeriodNotAllowed(period));
        }

        let minimum = self
            .config
            .minimum_delegation_amount()
            .max(validator.minimum_delegation_amount);
        if amount == 0 || amount < minimum {
            return Err(DelegationError::AmountBelowMinimum { amount, minimum });
        }

        self.check_validator_limit(&holder, validator_id, epoch)?;

        let forbidden = self.get_and_update_forbidden_for_delegation(holder)?;
        let available = self.tokens.balance_of(&holder).saturating_sub(forbidden);
        if available < amount {
            return Err(DelegationError::InsufficientUnlockedTokens {
                requested: amount,
                available,
            });
        }

        let id = self.delegations.len() as DelegationId;
        self.delegations.push(Delegation::new(
            id,
            holder,
            validator_id,
            amount,
            period,
            info.into(),
            epoch,
        ));
        self.by_holder.entry(holder).or_default().push(id);
        self.by_validator.entry(validator_id).or_default().push(id);

        let locked = LedgerKey::Locked(holder);
        self.ledger.add(locked, amount, epoch);
        self.ledger.subtract(locked, amount, next);

        info!(
            delegation = id,
            holder = %short_address(&holder),
            validator = validator_id,
            amount = %amount,
            period,
            epoch,
            "delegation proposed"
        );
        Ok(id)
    }

    /// Accept a proposed delegation as the validator's controller
    pub fn accept_pending_delegation(&mut self, caller: Address, id: DelegationId) -> Result<()> {
        let epoch = self.current_epoch()?;
        let (holder, validator_id) = {
            let delegation = self.get_delegation(id)?;
            (delegation.holder, delegation.validator_id)
        };

        let caller_validator = self
            .validators
            .validator_id_by_address(&caller)
            .ok_or(DelegationError::UnknownValidatorAddress)?;
        if caller_validator != validator_id {
            return Err(DelegationError::NotAuthorized(id));
        }

        match self.delegations[id as usize].state_at(epoch) {
            DelegationState::Proposed => {}
            DelegationState::Canceled => return Err(DelegationError::DelegationCanceled(id)),
            DelegationState::Rejected => return Err(DelegationError::RequestOutdated(id)),
            _ => return Err(DelegationError::AlreadyAccepted(id)),
        }

        let started = epoch.checked_add(1).ok_or(ClockError::OutOfRange(epoch))?;
        self.apply_pending_slashes(holder)?;

        let (amount, period) = {
            let delegation = &self.delegations[id as usize];
            (delegation.amount, delegation.delegation_period)
        };
        let finished = started
            .checked_add(period)
            .ok_or(ClockError::OutOfRange(started))?;

        let from_locked = self
            .launch
            .handle_delegation_add(holder, amount, started, epoch)?;

        let delegation = &mut self.delegations[id as usize];
        delegation.started = Some(started);
        delegation.finished = Some(finished);
        delegation.launch_locked = from_locked;

        self.ledger.add(LedgerKey::Locked(holder), amount, started);
        self.ledger.add(LedgerKey::Delegated(holder), amount, started);
        self.ledger
            .add(LedgerKey::DelegatedToValidator(validator_id), amount, started);
        if self.is_self_delegation(holder, validator_id) {
            self.ledger.add(LedgerKey::Bond(validator_id), amount, started);
        }

        info!(
            delegation = id,
            validator = validator_id,
            started,
            finished,
            from_locked = %from_locked,
            "delegation accepted"
        );
        Ok(())
    }

    /// Withdraw a proposal before the validator accepts it
    pub fn cancel_pending_delegation(&mut self, caller: Address, id: DelegationId) -> Result<()> {
        let epoch = self.current_epoch()?;
        let next = epoch.checked_add(1).ok_or(ClockError::OutOfRange(epoch))?;
        let delegation = self.get_delegation(id)?;
        if delegation.holder != caller {
            return Err(DelegationError::NotHolder(id));
        }

        let state = delegation.state_at(epoch);
        if state != DelegationState::Proposed {
            return Err(DelegationError::NotProposed { id, state });
        }

        let amount = delegation.amount;
        self.delegations[id as usize].canceled = true;

        let locked = LedgerKey::Locked(caller);
        self.ledger.subtract(locked, amount, epoch);
        self.ledger.add(locked, amount, next);

        info!(delegation = id, holder = %short_address(&caller), "delegation canceled");
        Ok(())
    }

    /// Stop a running delegation at the end of its current term
    ///
    /// Either the holder or the validator's controller may ask. The request
    /// must arrive at least `undelegation_notice_secs` before the term ends.
    pub fn request_undelegation(&mut self, caller: Address, id: DelegationId) -> Result<()> {
        let epoch = self.current_epoch()?;
        let (holder, validator_id) = {
            let delegation = self.get_delegation(id)?;
            (delegation.holder, delegation.validator_id)
        };

        let validator_address = self.validators.validator(validator_id).map(|v| v.address);
        if caller != holder && validator_address != Some(caller) {
            return Err(DelegationError::PermissionDenied(id));
        }

        let state = self.delegations[id as usize].state_at(epoch);
        if state != DelegationState::Delegated {
            return Err(DelegationError::NotDelegated { id, state });
        }

        let finished = self.delegations[id as usize]
            .end_of_term(epoch)
            .ok_or(ClockError::OutOfRange(epoch))?;
        let notice_end = self
            .time
            .now()
            .saturating_add(self.config.undelegation_notice_secs);
        if notice_end >= self.clock.epoch_start(finished)? {
            return Err(DelegationError::UndelegationWindowClosed { id, finished });
        }

        self.apply_pending_slashes(holder)?;

        let delegation = &mut self.delegations[id as usize];
        delegation.undelegation_requested = Some(epoch);
        delegation.finished = Some(finished);
        let effective = delegation.effective_amount();
        let from_locked = delegation.launch_locked;

        self.ledger.subtract(LedgerKey::Locked(holder), effective, finished);
        self.ledger.subtract(LedgerKey::Delegated(holder), effective, finished);
        self.ledger
            .subtract(LedgerKey::DelegatedToValidator(validator_id), effective, finished);
        if self.is_self_delegation(holder, validator_id) {
            self.ledger
                .subtract(LedgerKey::Bond(validator_id), effective, finished);
        }
        self.launch.handle_delegation_removal(holder, from_locked, finished);

        info!(
            delegation = id,
            caller = %short_address(&caller),
            finished,
            amount = %effective,
            "undelegation requested"
        );
        Ok(())
    }

    pub fn get_state(&self, id: DelegationId) -> Result<DelegationState> {
        let epoch = self.current_epoch()?;
        Ok(self.get_delegation(id)?.state_at(epoch))
    }

    pub fn get_delegation(&self, id: DelegationId) -> Result<&Delegation> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.delegations.get(index))
            .ok_or(DelegationError::DelegationNotFound(id))
    }

    pub fn delegations_by_holder(&self, holder: &Address) -> Vec<&Delegation> {
        self.collect(self.by_holder.get(holder))
    }

    pub fn delegations_by_validator(&self, validator_id: ValidatorId) -> Vec<&Delegation> {
        self.collect(self.by_validator.get(&validator_id))
    }

    pub fn delegation_count(&self) -> usize {
        self.delegations.len()
    }

    /// Tokens in the holder's requests that are not yet working for a
    /// validator (proposed, or accepted and waiting for the next epoch)
    pub fn pending_amount(&self, holder: &Address, epoch: Epoch) -> Amount {
        self.delegations_by_holder(holder)
            .into_iter()
            .filter(|d| {
                matches!(
                    d.state_at(epoch),
                    DelegationState::Proposed | DelegationState::Accepted
                )
            })
            .fold(0, |sum: Amount, d| sum.saturating_add(d.amount))
    }

    /// True if `holder` is the address the validator itself runs under
    pub(crate) fn is_self_delegation(&self, holder: Address, validator_id: ValidatorId) -> bool {
        self.validators
            .validator(validator_id)
            .is_some_and(|validator| validator.address == holder)
    }

    fn collect(&self, ids: Option<&Vec<DelegationId>>) -> Vec<&Delegation> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.delegations.get(*id as usize))
                .collect()
        })
        .unwrap_or_default()
    }

    /// A holder may have live delegations with a bounded number of validators
    fn check_validator_limit(
        &self,
        holder: &Address,
        validator_id: ValidatorId,
        epoch: Epoch,
    ) -> Result<()> {
        let live: BTreeSet<ValidatorId> = self
            .delegations_by_holder(holder)
            .into_iter()
            .filter(|d| {
                matches!(
                    d.state_at(epoch),
                    DelegationState::Proposed
                        | DelegationState::Accepted
                        | DelegationState::Delegated
                        | DelegationState::UndelegationRequested
                )
            })
            .map(|d| d.validator_id)
            .collect();

        let limit = self.config.max_validators_per_holder;
        if !live.contains(&validator_id) && live.len() >= limit {
            return Err(DelegationError::TooManyValidators { limit });
        }
        Ok(())
    }
}
