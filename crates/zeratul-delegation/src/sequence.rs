//! Epoch-indexed sequence with lazy catch-up
//!
//! A sequence is a non-negative value that changes at known future epochs.
//! Instead of running a scheduler, changes are recorded as pending diffs and
//! folded in the first time somebody reads the value at or after their epoch.
//!
//! ```text
//! value = 100, resolved = 4
//! pending: { 5: +20, 7: -50 }
//!
//! get_and_update(6) -> 120    pending: { 7: -50 }
//! get_and_update(9) ->  70    pending: {}
//! ```
//!
//! Subtraction is bounded: a diff that would take the value below zero
//! leaves it at zero (the clamp is logged and remembered in `drained_at`).
//!
//! Folded diffs are kept per epoch next to a checkpoint of the value after
//! that epoch. A delta landing on an already-resolved epoch is merged into
//! that epoch's diff and every checkpoint from there on is folded again, so
//! the result is the same as if the delta had been written before the
//! epoch was resolved. Slashing relies on this when a holder's balances are
//! caught up long after the slash happened.
//!
//! ```text
//! add 10@0, add 100@3, resolve 5        checkpoints { 0: 10, 3: 110 }
//! subtract 15@1                         checkpoints { 0: 10, 1: 0, 3: 100 }
//! ```
//!
//! Detail older than what can still be written to is dropped with
//! [`Sequence::compact`].

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::debug;

use crate::error::SequenceError;
use crate::types::{Amount, Epoch, Fraction};

/// Pending change at one epoch
///
/// Additions and subtractions are kept apart so a reduction can scale the
/// subtractions without touching the additions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diff {
    pub add: Amount,
    pub subtract: Amount,
}

impl Diff {
    fn merge(&mut self, other: Diff) {
        self.add = self.add.saturating_add(other.add);
        self.subtract = self.subtract.saturating_add(other.subtract);
    }
}

/// What was folded at a resolved epoch, replayed on retroactive writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Change(Diff),
    Scale(Fraction),
}

#[derive(Debug, Clone, Default)]
pub struct Sequence {
    /// Value as of `resolved`
    value: Amount,
    /// Latest epoch folded into `value`, `None` until the first resolution
    resolved: Option<Epoch>,
    /// Diffs at epochs after `resolved`
    pending: BTreeMap<Epoch, Diff>,
    /// Steps folded at each resolved epoch since `horizon`
    applied: BTreeMap<Epoch, Vec<Step>>,
    /// Value after each epoch in `applied`
    history: BTreeMap<Epoch, Amount>,
    /// Epochs before this were compacted into `base`
    horizon: Epoch,
    base: Amount,
    drained_at: Option<Epoch>,
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing was ever written or resolved
    pub fn is_untouched(&self) -> bool {
        self.resolved.is_none() && self.pending.is_empty()
    }

    pub fn resolved_epoch(&self) -> Option<Epoch> {
        self.resolved
    }

    /// Last epoch at which a subtraction was clamped to zero
    pub fn drained_at(&self) -> Option<Epoch> {
        self.drained_at
    }

    pub fn pending(&self) -> &BTreeMap<Epoch, Diff> {
        &self.pending
    }

    /// Earliest epoch whose value is still kept exactly
    pub fn horizon(&self) -> Epoch {
        self.horizon
    }

    /// Schedule `+amount` at `epoch`
    pub fn add(&mut self, amount: Amount, epoch: Epoch) {
        if amount == 0 {
            return;
        }
        self.write(
            Diff {
                add: amount,
                subtract: 0,
            },
            epoch,
        );
    }

    /// Schedule `-amount` at `epoch` (bounded at zero on resolution)
    pub fn subtract(&mut self, amount: Amount, epoch: Epoch) {
        if amount == 0 {
            return;
        }
        self.write(
            Diff {
                add: 0,
                subtract: amount,
            },
            epoch,
        );
    }

    /// Fold every pending diff up to and including `epoch` and return the value
    ///
    /// Resolving the same epoch again returns the same value. Asking for an
    /// epoch before the resolved one fails without touching the sequence, use
    /// [`Sequence::value_at`] for past values.
    pub fn get_and_update(&mut self, epoch: Epoch) -> Result<Amount, SequenceError> {
        if let Some(resolved) = self.resolved {
            if epoch < resolved {
                return Err(SequenceError::EpochInPast {
                    requested: epoch,
                    resolved,
                });
            }
        }

        let later = match epoch.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.pending, later);

        for (at, diff) in due {
            let (value, clamped) = fold(self.value, diff);
            if clamped {
                debug!(epoch = at, subtract = %diff.subtract, "subtraction clamped at zero");
                self.drained_at = Some(at);
            }
            self.applied.entry(at).or_default().push(Step::Change(diff));
            self.history.insert(at, value);
            self.value = value;
        }

        self.resolved = Some(epoch);
        Ok(self.value)
    }

    /// Value at `epoch` without mutating anything
    ///
    /// Epochs before [`Sequence::horizon`] read as the last compacted value.
    pub fn value_at(&self, epoch: Epoch) -> Amount {
        if self.is_resolved(epoch) {
            return self.checkpoint_at(epoch);
        }
        self.pending
            .range(..=epoch)
            .fold(self.value, |value, (_, diff)| fold(value, *diff).0)
    }

    /// Scale the sequence by `coefficient` from epoch `from` on
    ///
    /// The value at `from` is multiplied by the coefficient, as are the
    /// subtractions scheduled strictly between `from` and `to`. Scheduled
    /// additions keep their size: they are new tokens entering after the
    /// reduction.
    pub fn reduce(
        &mut self,
        coefficient: Fraction,
        from: Epoch,
        to: Epoch,
    ) -> Result<(), SequenceError> {
        if !coefficient.is_at_most_one() {
            return Err(SequenceError::IncreasingReduction {
                numerator: coefficient.numerator(),
                denominator: coefficient.denominator(),
            });
        }
        if self.is_untouched() {
            return Ok(());
        }

        self.get_and_update(from)?;
        self.applied
            .entry(from)
            .or_default()
            .push(Step::Scale(coefficient));
        self.refold(from);

        if to > from {
            for (_, diff) in self
                .pending
                .range_mut((Bound::Excluded(from), Bound::Excluded(to)))
            {
                diff.subtract = coefficient.apply(diff.subtract);
            }
        }
        Ok(())
    }

    /// Drop per-epoch detail before `before`
    ///
    /// Only resolved epochs are compacted. Deltas written before the horizon
    /// afterwards are folded into the compacted value.
    pub fn compact(&mut self, before: Epoch) {
        let Some(resolved) = self.resolved else {
            return;
        };
        let before = before.min(resolved.saturating_add(1));
        if before <= self.horizon {
            return;
        }

        let kept = self.applied.split_off(&before);
        self.applied = kept;
        let kept = self.history.split_off(&before);
        if let Some(value) = self.history.values().next_back() {
            self.base = *value;
        }
        self.history = kept;
        self.horizon = before;
    }

    fn is_resolved(&self, epoch: Epoch) -> bool {
        self.resolved.is_some_and(|resolved| epoch <= resolved)
    }

    fn checkpoint_at(&self, epoch: Epoch) -> Amount {
        self.history
            .range(..=epoch)
            .next_back()
            .map(|(_, value)| *value)
            .unwrap_or(self.base)
    }

    fn write(&mut self, diff: Diff, epoch: Epoch) {
        if !self.is_resolved(epoch) {
            self.pending.entry(epoch).or_default().merge(diff);
            return;
        }

        if epoch < self.horizon {
            let (base, clamped) = fold(self.base, diff);
            if clamped {
                debug!(epoch, "retroactive subtraction clamped at zero");
                self.drained_at = Some(epoch);
            }
            self.base = base;
            self.refold(self.horizon);
            return;
        }

        let steps = self.applied.entry(epoch).or_default();
        match steps.last_mut() {
            Some(Step::Change(last)) => last.merge(diff),
            _ => steps.push(Step::Change(diff)),
        }
        self.refold(epoch);
    }

    /// Replay every resolved step from `from` on and rewrite the checkpoints
    fn refold(&mut self, from: Epoch) {
        let mut value = self
            .history
            .range(..from)
            .next_back()
            .map(|(_, value)| *value)
            .unwrap_or(self.base);

        for (at, steps) in self.applied.range(from..) {
            for step in steps {
                value = match step {
                    Step::Change(diff) => {
                        let (next, clamped) = fold(value, *diff);
                        if clamped {
                            debug!(epoch = *at, "retroactive subtraction clamped at zero");
                            self.drained_at = Some(*at);
                        }
                        next
                    }
                    Step::Scale(coefficient) => coefficient.apply(value),
                };
            }
            self.history.insert(*at, value);
        }
        self.value = value;
    }
}

/// Apply one diff, returning the new value and whether it was clamped
fn fold(value: Amount, diff: Diff) -> (Amount, bool) {
    let raised = value.saturating_add(diff.add);
    match raised.checked_sub(diff.subtract) {
        Some(lowered) => (lowered, false),
        None => (0, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: Amount = 10_000_000;

    fn half() -> Fraction {
        Fraction::new(1, 2).unwrap()
    }

    /// add 5M@1, sub 3M@3, add 1M x3 @4, sub 5M@5
    fn staircase() -> Sequence {
        let mut seq = Sequence::new();
        seq.add(5 * M, 1);
        seq.subtract(3 * M, 3);
        seq.add(M, 4);
        seq.add(M, 4);
        seq.add(M, 4);
        seq.subtract(5 * M, 5);
        seq
    }

    #[test]
    fn test_staircase_values() {
        let mut seq = staircase();
        assert_eq!(seq.get_and_update(1).unwrap(), 5 * M);
        assert_eq!(seq.get_and_update(2).unwrap(), 5 * M);
        assert_eq!(seq.get_and_update(3).unwrap(), 2 * M);
        assert_eq!(seq.get_and_update(4).unwrap(), 5 * M);
        assert_eq!(seq.get_and_update(5).unwrap(), 0);
        assert!(seq.pending().is_empty());
    }

    #[test]
    fn test_reduce_scales_value_and_subtractions() {
        let mut seq = staircase();
        assert_eq!(seq.get_and_update(1).unwrap(), 5 * M);

        seq.reduce(half(), 2, 5).unwrap();

        assert_eq!(seq.value_at(1), 5 * M, "history before the reduction is kept");
        assert_eq!(seq.get_and_update(2).unwrap(), 25 * M / 10);
        assert_eq!(seq.get_and_update(3).unwrap(), M);
        assert_eq!(seq.get_and_update(4).unwrap(), 4 * M);
        assert_eq!(seq.get_and_update(5).unwrap(), 0);
    }

    #[test]
    fn test_reduce_zero_value_is_noop() {
        let mut seq = Sequence::new();
        seq.subtract(1, 1);
        seq.add(1, 1);
        assert_eq!(seq.get_and_update(1).unwrap(), 0);
        seq.reduce(half(), 1, Epoch::MAX).unwrap();
        assert_eq!(seq.get_and_update(1).unwrap(), 0);
    }

    #[test]
    fn test_reduce_untouched_is_noop() {
        let mut seq = Sequence::new();
        seq.reduce(half(), 10, Epoch::MAX).unwrap();
        assert!(seq.is_untouched());
    }

    #[test]
    fn test_reduce_rejects_increase_and_past() {
        let mut seq = Sequence::new();
        seq.add(10, 0);
        seq.get_and_update(3).unwrap();

        let double = Fraction::new(2, 1).unwrap();
        assert!(matches!(
            seq.reduce(double, 3, Epoch::MAX),
            Err(SequenceError::IncreasingReduction { .. })
        ));
        assert_eq!(
            seq.reduce(half(), 2, Epoch::MAX),
            Err(SequenceError::EpochInPast {
                requested: 2,
                resolved: 3
            })
        );
        assert_eq!(seq.get_and_update(3).unwrap(), 10);
    }

    #[test]
    fn test_bounded_subtraction() {
        let mut seq = Sequence::new();
        seq.add(3, 0);
        seq.subtract(5, 1);
        assert_eq!(seq.get_and_update(1).unwrap(), 0);
        assert_eq!(seq.drained_at(), Some(1));
    }

    #[test]
    fn test_get_and_update_is_idempotent() {
        let mut seq = Sequence::new();
        seq.add(7, 2);
        seq.subtract(3, 4);
        assert_eq!(seq.get_and_update(2).unwrap(), 7);
        assert_eq!(seq.get_and_update(2).unwrap(), 7);
        assert_eq!(seq.pending().len(), 1);
    }

    #[test]
    fn test_past_epoch_is_rejected_without_change() {
        let mut seq = Sequence::new();
        seq.add(7, 2);
        seq.get_and_update(5).unwrap();
        assert_eq!(
            seq.get_and_update(4),
            Err(SequenceError::EpochInPast {
                requested: 4,
                resolved: 5
            })
        );
        assert_eq!(seq.value_at(4), 7);
        assert_eq!(seq.value_at(1), 0);
    }

    #[test]
    fn test_value_at_does_not_mutate() {
        let mut seq = Sequence::new();
        seq.add(10, 1);
        seq.subtract(4, 3);
        assert_eq!(seq.value_at(0), 0);
        assert_eq!(seq.value_at(2), 10);
        assert_eq!(seq.value_at(3), 6);
        assert_eq!(seq.resolved_epoch(), None);
        assert_eq!(seq.pending().len(), 2);
    }

    #[test]
    fn test_retroactive_merge() {
        let mut seq = Sequence::new();
        seq.add(100, 1);
        seq.subtract(30, 4);
        assert_eq!(seq.get_and_update(6).unwrap(), 70);

        // delta lands on an epoch that is already resolved
        seq.subtract(20, 2);
        assert_eq!(seq.value_at(1), 100);
        assert_eq!(seq.value_at(2), 80);
        assert_eq!(seq.value_at(5), 50);
        assert_eq!(seq.get_and_update(6).unwrap(), 50);

        seq.add(5, 6);
        assert_eq!(seq.get_and_update(7).unwrap(), 55);
    }

    #[test]
    fn test_retroactive_subtract_is_bounded() {
        let mut seq = Sequence::new();
        seq.add(10, 0);
        seq.get_and_update(2).unwrap();
        seq.subtract(15, 1);
        assert_eq!(seq.get_and_update(2).unwrap(), 0);
        assert_eq!(seq.drained_at(), Some(1));
        assert_eq!(seq.value_at(0), 10);
    }

    #[test]
    fn test_clamped_retroactive_write_matches_pending_write() {
        let mut early = Sequence::new();
        early.add(10, 0);
        early.add(100, 3);
        early.subtract(15, 1);

        let mut late = Sequence::new();
        late.add(10, 0);
        late.add(100, 3);
        assert_eq!(late.get_and_update(5).unwrap(), 110);
        late.subtract(15, 1);

        assert_eq!(early.get_and_update(5).unwrap(), 100);
        assert_eq!(late.get_and_update(5).unwrap(), 100);
        for epoch in 0..=5 {
            assert_eq!(late.value_at(epoch), early.value_at(epoch), "epoch {}", epoch);
        }
        assert_eq!(late.drained_at(), Some(1));
    }

    #[test]
    fn test_retroactive_write_before_reduction_is_scaled() {
        let mut seq = Sequence::new();
        seq.add(100, 0);
        seq.reduce(half(), 2, Epoch::MAX).unwrap();
        assert_eq!(seq.get_and_update(2).unwrap(), 50);

        seq.add(20, 1);
        assert_eq!(seq.value_at(1), 120);
        assert_eq!(seq.get_and_update(3).unwrap(), 60);
    }

    #[test]
    fn test_compact_keeps_later_epochs() {
        let mut seq = staircase();
        assert_eq!(seq.get_and_update(4).unwrap(), 5 * M);

        seq.compact(3);
        assert_eq!(seq.horizon(), 3);
        assert_eq!(seq.value_at(1), 5 * M);
        assert_eq!(seq.value_at(3), 2 * M);

        // writes at or after the horizon behave as before
        seq.subtract(M, 3);
        assert_eq!(seq.value_at(3), M);
        assert_eq!(seq.get_and_update(4).unwrap(), 4 * M);
        assert_eq!(seq.get_and_update(5).unwrap(), 0);
    }

    #[test]
    fn test_compact_is_bounded_by_resolution() {
        let mut seq = Sequence::new();
        seq.compact(10);
        assert_eq!(seq.horizon(), 0);

        seq.add(10, 1);
        seq.add(5, 6);
        seq.get_and_update(2).unwrap();
        seq.compact(10);
        assert_eq!(seq.horizon(), 3);
        assert_eq!(seq.get_and_update(6).unwrap(), 15);

        // older writes land on the compacted value
        seq.subtract(4, 0);
        assert_eq!(seq.value_at(2), 6);
        assert_eq!(seq.get_and_update(6).unwrap(), 11);
    }
}
