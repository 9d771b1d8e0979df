//! In-memory implementation of [`VaultStore`].
//!
//! [`InMemoryVault`] is a first-class backend for tests, ephemeral nodes,
//! and anywhere persistence isn't needed. It stores all data in a
//! mutex-guarded map with identical observable semantics to the SQLite
//! backend.

use std::collections::BTreeMap;
use std::sync::Mutex;

use statevault_core::{LockId, StateAndRef, StateRef, TransactionState, TxHash};

use crate::error::VaultError;
use crate::traits::VaultStore;
use crate::types::{SoftLockFilter, StateStatus, VaultQuery};

/// Data stored for a single state in the in-memory backend.
#[derive(Debug, Clone)]
struct StoredState {
    state: TransactionState,
    /// Transaction that consumed this state, if any.
    consumed_by: Option<TxHash>,
    /// Flow run currently holding a soft lock, if any.
    lock_id: Option<LockId>,
}

/// In-memory vault backend.
///
/// A `BTreeMap` keyed by [`StateRef`] gives query results a stable order
/// matching the SQLite backend's `ORDER BY` without extra sorting.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    states: Mutex<BTreeMap<StateRef, StoredState>>,
}

impl InMemoryVault {
    /// Creates an empty vault.
    pub fn new() -> Self {
        InMemoryVault::default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<StateRef, StoredState>>, VaultError> {
        self.states.lock().map_err(|_| VaultError::Poisoned)
    }
}

impl VaultStore for InMemoryVault {
    fn insert_state(
        &self,
        state_ref: &StateRef,
        state: &TransactionState,
    ) -> Result<(), VaultError> {
        let mut states = self.guard()?;
        if let Some(existing) = states.get(state_ref) {
            // Replay-tolerant: identical re-record is a no-op
            if existing.state == *state {
                return Ok(());
            }
            return Err(VaultError::DuplicateState(*state_ref));
        }
        states.insert(
            *state_ref,
            StoredState {
                state: state.clone(),
                consumed_by: None,
                lock_id: None,
            },
        );
        Ok(())
    }

    fn get_state(&self, state_ref: &StateRef) -> Result<StateAndRef, VaultError> {
        let states = self.guard()?;
        let stored = states
            .get(state_ref)
            .ok_or(VaultError::StateNotFound(*state_ref))?;
        Ok(StateAndRef {
            state_ref: *state_ref,
            state: stored.state.clone(),
        })
    }

    fn consume_states(&self, refs: &[StateRef], consuming: &TxHash) -> Result<(), VaultError> {
        let mut states = self.guard()?;
        // Validate first so a failure leaves nothing half-consumed
        for r in refs {
            match states.get(r) {
                None => return Err(VaultError::StateNotFound(*r)),
                Some(s) => {
                    if let Some(prev) = &s.consumed_by {
                        if prev != consuming {
                            return Err(VaultError::StateConsumed(*r));
                        }
                    }
                }
            }
        }
        for r in refs {
            if let Some(s) = states.get_mut(r) {
                s.consumed_by = Some(*consuming);
                // Consumption supersedes any soft lock
                s.lock_id = None;
            }
        }
        Ok(())
    }

    fn mark_locked(&self, lock_id: LockId, refs: &[StateRef]) -> Result<usize, VaultError> {
        let mut states = self.guard()?;
        for r in refs {
            if !states.contains_key(r) {
                return Err(VaultError::StateNotFound(*r));
            }
        }
        let mut updated = 0;
        for r in refs {
            if let Some(s) = states.get_mut(r) {
                s.lock_id = Some(lock_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn clear_locks(
        &self,
        lock_id: LockId,
        refs: Option<&[StateRef]>,
    ) -> Result<usize, VaultError> {
        let mut states = self.guard()?;
        let mut cleared = 0;
        match refs {
            None => {
                for s in states.values_mut() {
                    if s.lock_id == Some(lock_id) {
                        s.lock_id = None;
                        cleared += 1;
                    }
                }
            }
            Some(refs) => {
                for r in refs {
                    if let Some(s) = states.get_mut(r) {
                        if s.lock_id == Some(lock_id) {
                            s.lock_id = None;
                            cleared += 1;
                        }
                    }
                }
            }
        }
        Ok(cleared)
    }

    fn locked_states(&self) -> Result<Vec<(StateRef, LockId)>, VaultError> {
        let states = self.guard()?;
        Ok(states
            .iter()
            .filter_map(|(r, s)| s.lock_id.map(|l| (*r, l)))
            .collect())
    }

    fn query(&self, query: &VaultQuery) -> Result<Vec<StateAndRef>, VaultError> {
        let states = self.guard()?;
        Ok(states
            .iter()
            .filter(|(_, s)| match query.status {
                StateStatus::Unconsumed => s.consumed_by.is_none(),
                StateStatus::Consumed => s.consumed_by.is_some(),
                StateStatus::All => true,
            })
            .filter(|(_, s)| match query.lock_filter {
                SoftLockFilter::All => true,
                SoftLockFilter::LockedOnly => s.lock_id.is_some(),
                SoftLockFilter::UnlockedOnly => s.lock_id.is_none(),
                SoftLockFilter::LockedBy(id) => s.lock_id == Some(id),
            })
            .filter(|(_, s)| match query.contract {
                Some(c) => s.state.contract == c,
                None => true,
            })
            .map(|(r, s)| StateAndRef {
                state_ref: *r,
                state: s.state.clone(),
            })
            .collect())
    }
}
