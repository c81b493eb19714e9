//! Token balances as seen by delegation
//!
//! Delegation never moves tokens. It reads balances to check that a holder
//! has enough unlocked tokens, and gates transfers through
//! [`crate::DelegationController::ensure_transferable`].

use std::collections::HashMap;
use thiserror::Error;

use crate::types::{Address, Amount};

pub trait TokenBalances {
    fn balance_of(&self, holder: &Address) -> Amount;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance { requested: Amount, available: Amount },
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTokens {
    balances: HashMap<Address, Amount>,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, holder: Address, amount: Amount) {
        let balance = self.balances.entry(holder).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Move tokens without any lock check
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        self.balances.insert(*from, available - amount);
        self.mint(*to, amount);
        Ok(())
    }
}

impl TokenBalances for InMemoryTokens {
    fn balance_of(&self, holder: &Address) -> Amount {
        self.balances.get(holder).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::label_address;

    #[test]
    fn test_mint_and_transfer() {
        let alice = label_address("alice");
        let bob = label_address("bob");
        let mut tokens = InMemoryTokens::new();

        tokens.mint(alice, 100);
        tokens.transfer(&alice, &bob, 30).unwrap();
        assert_eq!(tokens.balance_of(&alice), 70);
        assert_eq!(tokens.balance_of(&bob), 30);

        assert_eq!(
            tokens.transfer(&alice, &bob, 71),
            Err(TokenError::InsufficientBalance {
                requested: 71,
                available: 70
            })
        );
    }
}
