//! Exclusive per-state lock table.
//!
//! [`LockTable`] maps each reserved [`StateRef`] to the flow run holding
//! it. Acquisition is batch-only with all-or-nothing semantics; release
//! is idempotent and silently skips entries held by other flow runs.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use statevault_core::{LockId, StateRef};

/// Errors from lock table operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// One or more requested states are reserved by a different flow run.
    /// The table is left unchanged.
    #[error("{} state(s) unavailable (reserved by another flow)", conflicts.len())]
    StatesUnavailable {
        /// Each conflicting ref with its current holder.
        conflicts: Vec<(StateRef, LockId)>,
    },
}

/// Status entry for a single held lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockStatusEntry {
    pub state_ref: StateRef,
    pub holder: LockId,
}

/// Process-wide table of soft-locked states.
///
/// Uses `DashMap` for concurrent access; each entry is one reservation.
/// An invariant of the design: a [`StateRef`] maps to at most one holder,
/// and only the [`super::SoftLockManager`] mutates the table.
#[derive(Debug, Default)]
pub struct LockTable {
    entries: DashMap<StateRef, LockId>,
}

impl LockTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        LockTable::default()
    }

    /// Atomically reserves all given states for `lock_id`.
    ///
    /// Refs are sorted and deduplicated so concurrent batches acquire in a
    /// consistent order. If any ref is held by a *different* flow run,
    /// every entry inserted by this call is removed again and the error
    /// reports all conflicting refs -- the table ends unchanged. Refs
    /// already held by `lock_id` itself are fine (checkpoint replay
    /// re-executes the build step).
    pub fn try_lock(&self, lock_id: LockId, refs: &[StateRef]) -> Result<(), LockError> {
        let mut sorted: Vec<StateRef> = refs.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut inserted = Vec::new();
        let mut conflicts = Vec::new();

        for r in &sorted {
            match self.entries.entry(*r) {
                Entry::Occupied(e) => {
                    if *e.get() != lock_id {
                        conflicts.push((*r, *e.get()));
                    }
                }
                Entry::Vacant(v) => {
                    // Once doomed, keep scanning for conflicts to report
                    // but stop reserving
                    if conflicts.is_empty() {
                        v.insert(lock_id);
                        inserted.push(*r);
                    }
                }
            }
        }

        if conflicts.is_empty() {
            tracing::debug!(%lock_id, count = sorted.len(), "soft locks acquired");
            Ok(())
        } else {
            // Roll back only what this call inserted; refs the flow already
            // held from an earlier build step stay locked.
            for r in &inserted {
                self.entries.remove_if(r, |_, holder| *holder == lock_id);
            }
            tracing::debug!(%lock_id, conflicts = conflicts.len(), "soft lock denied");
            Err(LockError::StatesUnavailable { conflicts })
        }
    }

    /// Releases locks held by `lock_id`.
    ///
    /// `None` releases every entry held by the flow run; `Some(refs)`
    /// releases only those of the given refs it still holds. Entries held
    /// by other flow runs, or not present, are silently skipped.
    /// Returns the refs actually released.
    pub fn release(&self, lock_id: LockId, refs: Option<&[StateRef]>) -> Vec<StateRef> {
        let targets: Vec<StateRef> = match refs {
            Some(rs) => {
                let mut v = rs.to_vec();
                v.sort();
                v.dedup();
                v
            }
            None => self.locked_by(lock_id),
        };

        let mut released = Vec::new();
        for r in targets {
            if self
                .entries
                .remove_if(&r, |_, holder| *holder == lock_id)
                .is_some()
            {
                released.push(r);
            }
        }
        if !released.is_empty() {
            tracing::debug!(%lock_id, count = released.len(), "soft locks released");
        }
        released
    }

    /// Drops entries for consumed states regardless of holder.
    ///
    /// Consumption by a finalized transaction supersedes any soft lock,
    /// so no holder check applies. Returns the refs that were held.
    pub fn evict(&self, refs: &[StateRef]) -> Vec<StateRef> {
        let mut evicted = Vec::new();
        for r in refs {
            if self.entries.remove(r).is_some() {
                evicted.push(*r);
            }
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "consumed states evicted");
        }
        evicted
    }

    /// The `isLocked` query: who holds `state_ref`, if anyone?
    pub fn holder_of(&self, state_ref: &StateRef) -> Option<LockId> {
        self.entries.get(state_ref).map(|e| *e.value())
    }

    /// All refs currently held by `lock_id`, sorted.
    pub fn locked_by(&self, lock_id: LockId) -> Vec<StateRef> {
        let mut refs: Vec<StateRef> = self
            .entries
            .iter()
            .filter(|e| *e.value() == lock_id)
            .map(|e| *e.key())
            .collect();
        refs.sort();
        refs
    }

    /// Current table contents, for observability.
    pub fn status(&self) -> Vec<LockStatusEntry> {
        let mut entries: Vec<LockStatusEntry> = self
            .entries
            .iter()
            .map(|e| LockStatusEntry {
                state_ref: *e.key(),
                holder: *e.value(),
            })
            .collect();
        entries.sort_by_key(|e| e.state_ref);
        entries
    }

    /// Number of held locks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is locked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statevault_core::TxHash;

    fn sref(fill: u8, index: u32) -> StateRef {
        StateRef::new(TxHash([fill; 32]), index)
    }

    #[test]
    fn lock_and_query() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let (a, b) = (sref(1, 0), sref(1, 1));

        table.try_lock(me, &[a, b]).unwrap();
        assert_eq!(table.holder_of(&a), Some(me));
        assert_eq!(table.locked_by(me), vec![a, b]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn relock_by_same_holder_is_idempotent() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let a = sref(1, 0);

        table.try_lock(me, &[a]).unwrap();
        table.try_lock(me, &[a]).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn conflict_leaves_table_unchanged() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let them = LockId::fresh();
        let (a, b, c) = (sref(1, 0), sref(1, 1), sref(2, 0));

        table.try_lock(them, &[b]).unwrap();

        let err = table.try_lock(me, &[a, b, c]).unwrap_err();
        let LockError::StatesUnavailable { conflicts } = err;
        assert_eq!(conflicts, vec![(b, them)]);

        // No partial lock: a and c were rolled back, b still theirs
        assert_eq!(table.holder_of(&a), None);
        assert_eq!(table.holder_of(&b), Some(them));
        assert_eq!(table.holder_of(&c), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn conflict_rollback_keeps_previously_held_refs() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let them = LockId::fresh();
        let (a, b) = (sref(1, 0), sref(1, 1));

        table.try_lock(me, &[a]).unwrap();
        table.try_lock(them, &[b]).unwrap();

        // Replay requests a again plus a conflicting ref; a must survive
        assert!(table.try_lock(me, &[a, b]).is_err());
        assert_eq!(table.holder_of(&a), Some(me));
    }

    #[test]
    fn release_is_idempotent_and_holder_checked() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let them = LockId::fresh();
        let (a, b) = (sref(1, 0), sref(1, 1));

        table.try_lock(me, &[a]).unwrap();
        table.try_lock(them, &[b]).unwrap();

        // Foreign-held and unknown refs are silently skipped
        assert_eq!(table.release(me, Some(&[a, b, sref(9, 9)])), vec![a]);
        // Releasing again is a no-op
        assert!(table.release(me, Some(&[a])).is_empty());
        assert_eq!(table.holder_of(&b), Some(them));
    }

    #[test]
    fn evict_removes_regardless_of_holder() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let them = LockId::fresh();
        let (a, b) = (sref(1, 0), sref(1, 1));

        table.try_lock(me, &[a]).unwrap();
        table.try_lock(them, &[b]).unwrap();

        // Unknown refs are skipped; held ones go no matter the holder
        assert_eq!(table.evict(&[a, b, sref(9, 9)]), vec![a, b]);
        assert!(table.is_empty());
    }

    #[test]
    fn release_all_for_holder() {
        let table = LockTable::new();
        let me = LockId::fresh();
        let them = LockId::fresh();
        let (a, b, c) = (sref(1, 0), sref(1, 1), sref(2, 0));

        table.try_lock(me, &[a, c]).unwrap();
        table.try_lock(them, &[b]).unwrap();

        assert_eq!(table.release(me, None), vec![a, c]);
        assert!(table.release(me, None).is_empty());
        assert_eq!(table.status().len(), 1);
    }
}
