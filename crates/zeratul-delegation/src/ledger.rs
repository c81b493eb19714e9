//! Arena of sequences keyed by quantity and owner

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SequenceError;
use crate::sequence::Sequence;
use crate::types::{Address, Amount, Epoch, Fraction, ValidatorId};

/// Which balance a sequence tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKey {
    /// Tokens a holder cannot move
    Locked(Address),
    /// Tokens a holder has working for validators
    Delegated(Address),
    /// Tokens a holder lost to slashing
    Slashed(Address),
    /// Total delegated to a validator
    DelegatedToValidator(ValidatorId),
    /// Launch-purchased tokens a holder has delegated
    LaunchDelegated(Address),
    /// Tokens a validator's own address has delegated to it
    Bond(ValidatorId),
}

/// Sequences are created on first write. Reads of a missing key return zero
/// and create nothing.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    sequences: HashMap<LedgerKey, Sequence>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: LedgerKey, amount: Amount, epoch: Epoch) {
        self.sequences.entry(key).or_default().add(amount, epoch);
    }

    pub fn subtract(&mut self, key: LedgerKey, amount: Amount, epoch: Epoch) {
        self.sequences.entry(key).or_default().subtract(amount, epoch);
    }

    pub fn get_and_update(&mut self, key: LedgerKey, epoch: Epoch) -> Result<Amount, SequenceError> {
        match self.sequences.get_mut(&key) {
            Some(sequence) => sequence.get_and_update(epoch),
            None => Ok(0),
        }
    }

    pub fn value_at(&self, key: LedgerKey, epoch: Epoch) -> Amount {
        self.sequences
            .get(&key)
            .map(|sequence| sequence.value_at(epoch))
            .unwrap_or(0)
    }

    pub fn reduce(
        &mut self,
        key: LedgerKey,
        coefficient: Fraction,
        from: Epoch,
        to: Epoch,
    ) -> Result<(), SequenceError> {
        match self.sequences.get_mut(&key) {
            Some(sequence) => sequence.reduce(coefficient, from, to),
            None => Ok(()),
        }
    }

    /// Drop detail before `before` for a sequence nobody writes to earlier
    pub fn compact(&mut self, key: LedgerKey, before: Epoch) {
        if let Some(sequence) = self.sequences.get_mut(&key) {
            sequence.compact(before);
        }
    }

    pub fn sequence(&self, key: LedgerKey) -> Option<&Sequence> {
        self.sequences.get(&key)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::label_address;

    #[test]
    fn test_reads_do_not_create_entries() {
        let mut ledger = Ledger::new();
        let alice = label_address("alice");

        assert_eq!(ledger.get_and_update(LedgerKey::Locked(alice), 3).unwrap(), 0);
        assert_eq!(ledger.value_at(LedgerKey::Delegated(alice), 3), 0);
        ledger
            .reduce(LedgerKey::DelegatedToValidator(1), Fraction::zero(), 0, Epoch::MAX)
            .unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let mut ledger = Ledger::new();
        let alice = label_address("alice");
        let bob = label_address("bob");

        ledger.add(LedgerKey::Locked(alice), 100, 0);
        ledger.add(LedgerKey::Locked(bob), 40, 0);
        ledger.add(LedgerKey::Delegated(alice), 60, 1);

        assert_eq!(ledger.get_and_update(LedgerKey::Locked(alice), 1).unwrap(), 100);
        assert_eq!(ledger.get_and_update(LedgerKey::Locked(bob), 1).unwrap(), 40);
        assert_eq!(ledger.get_and_update(LedgerKey::Delegated(alice), 0).unwrap(), 0);
        assert_eq!(ledger.get_and_update(LedgerKey::Delegated(alice), 1).unwrap(), 60);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_compact() {
        let mut ledger = Ledger::new();
        let alice = label_address("alice");
        ledger.add(LedgerKey::Slashed(alice), 10, 1);
        ledger.add(LedgerKey::Slashed(alice), 5, 4);
        ledger.get_and_update(LedgerKey::Slashed(alice), 4).unwrap();

        ledger.compact(LedgerKey::Slashed(alice), 3);
        ledger.compact(LedgerKey::Bond(7), 3);
        assert_eq!(ledger.len(), 1);

        let sequence = ledger.sequence(LedgerKey::Slashed(alice)).unwrap();
        assert_eq!(sequence.horizon(), 3);
        assert_eq!(sequence.value_at(2), 10);
        assert_eq!(sequence.value_at(4), 15);
    }
}
