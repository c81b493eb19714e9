//! Balance views
//!
//! Each view resolves the sequences it needs at the current epoch, folding
//! in whatever came due since the last read, and applies pending slashes for
//! the holder first. Reads therefore take `&mut self`.

use tracing::warn;

use crate::controller::DelegationController;
use crate::error::{DelegationError, Result};
use crate::ledger::LedgerKey;
use crate::tokens::{InMemoryTokens, TokenBalances};
use crate::types::{short_address, Address, Amount, ValidatorId};
use crate::validators::ValidatorDirectory;

impl<V: ValidatorDirectory, T: TokenBalances> DelegationController<V, T> {
    /// Tokens the holder cannot transfer: locked by delegations, by slashing
    /// or by the token-launch lock
    pub fn get_and_update_locked_amount(&mut self, holder: Address) -> Result<Amount> {
        let delegation_locked = self.get_and_update_forbidden_for_delegation(holder)?;

        let epoch = self.current_epoch()?;
        let pending = self.pending_amount(&holder, epoch);
        let now = self.time.now();
        let launch_locked =
            self.launch
                .get_and_update_locked_amount(holder, pending, epoch, now, &self.clock)?;

        Ok(delegation_locked.saturating_add(launch_locked))
    }

    /// Tokens that cannot back a new delegation
    ///
    /// Purchased launch tokens are excluded, they may be delegated.
    pub fn get_and_update_forbidden_for_delegation(&mut self, holder: Address) -> Result<Amount> {
        self.apply_pending_slashes(holder)?;
        let epoch = self.current_epoch()?;
        Ok(self.ledger.get_and_update(LedgerKey::Locked(holder), epoch)?)
    }

    pub fn get_and_update_delegated_amount(&mut self, holder: Address) -> Result<Amount> {
        self.apply_pending_slashes(holder)?;
        let epoch = self.current_epoch()?;
        Ok(self.ledger.get_and_update(LedgerKey::Delegated(holder), epoch)?)
    }

    pub fn get_and_update_slashed_amount(&mut self, holder: Address) -> Result<Amount> {
        self.apply_pending_slashes(holder)?;
        let epoch = self.current_epoch()?;
        Ok(self.ledger.get_and_update(LedgerKey::Slashed(holder), epoch)?)
    }

    pub fn get_and_update_delegated_to_validator(&mut self, validator_id: ValidatorId) -> Result<Amount> {
        let epoch = self.current_epoch()?;
        Ok(self
            .ledger
            .get_and_update(LedgerKey::DelegatedToValidator(validator_id), epoch)?)
    }

    /// Tokens the validator's own address has delegated to it
    pub fn get_and_update_bond_amount(&mut self, validator_id: ValidatorId) -> Result<Amount> {
        let address = self
            .validators
            .validator(validator_id)
            .map(|validator| validator.address)
            .ok_or(DelegationError::UnknownValidator(validator_id))?;
        self.apply_pending_slashes(address)?;
        let epoch = self.current_epoch()?;
        Ok(self.ledger.get_and_update(LedgerKey::Bond(validator_id), epoch)?)
    }

    /// Fail unless `amount` can leave the holder's balance
    pub fn ensure_transferable(&mut self, holder: Address, amount: Amount) -> Result<()> {
        let locked = self.get_and_update_locked_amount(holder)?;
        let transferable = self.tokens.balance_of(&holder).saturating_sub(locked);
        if amount > transferable {
            warn!(
                holder = %short_address(&holder),
                requested = %amount,
                transferable = %transferable,
                "transfer blocked by locked tokens"
            );
            return Err(DelegationError::TokensLocked {
                requested: amount,
                transferable,
            });
        }
        Ok(())
    }
}

impl<V: ValidatorDirectory> DelegationController<V, InMemoryTokens> {
    /// Transfer through the lock gate
    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<()> {
        self.ensure_transferable(from, amount)?;
        self.tokens.transfer(&from, &to, amount)?;
        Ok(())
    }
}
