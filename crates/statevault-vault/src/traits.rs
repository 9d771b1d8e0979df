//! The [`VaultStore`] trait defining the storage contract for ledger states.
//!
//! All backends (InMemoryVault, SqliteVault, test doubles) implement this
//! trait, ensuring they are fully swappable without changing node logic.
//! Methods take `&self`: backends guard their interior state themselves so
//! the store can be shared as `Arc<dyn VaultStore>` across flow tasks.

use statevault_core::{LockId, StateAndRef, StateRef, TransactionState, TxHash};

use crate::error::VaultError;
use crate::types::VaultQuery;

/// The storage contract for the vault.
pub trait VaultStore: Send + Sync {
    // -------------------------------------------------------------------
    // State recording
    // -------------------------------------------------------------------

    /// Records a transaction output as an unconsumed state.
    ///
    /// Idempotent under replay: re-recording the same reference with the
    /// same content succeeds; differing content is a
    /// [`VaultError::DuplicateState`].
    fn insert_state(&self, state_ref: &StateRef, state: &TransactionState)
        -> Result<(), VaultError>;

    /// Retrieves a state by reference.
    fn get_state(&self, state_ref: &StateRef) -> Result<StateAndRef, VaultError>;

    /// Marks states as consumed by a finalized transaction.
    ///
    /// Consumption supersedes any soft lock on the state, which is cleared
    /// in the same operation. Re-consuming by the same transaction is a
    /// no-op; by a different one, [`VaultError::StateConsumed`].
    fn consume_states(&self, refs: &[StateRef], consuming: &TxHash) -> Result<(), VaultError>;

    // -------------------------------------------------------------------
    // Soft-lock mirror
    // -------------------------------------------------------------------

    /// Sets the soft-lock annotation on the given states.
    ///
    /// Returns the number of rows updated. Missing refs are an error;
    /// the node only marks states it has just recorded or selected.
    fn mark_locked(&self, lock_id: LockId, refs: &[StateRef]) -> Result<usize, VaultError>;

    /// Clears the soft-lock annotation for a flow run.
    ///
    /// With `refs = None`, clears every state held by `lock_id` (the
    /// full-set release issued at flow termination). With `Some(refs)`,
    /// clears only those of the given refs still annotated with `lock_id`;
    /// others are silently skipped. Returns the number of rows cleared.
    fn clear_locks(&self, lock_id: LockId, refs: Option<&[StateRef]>)
        -> Result<usize, VaultError>;

    /// All currently soft-locked states with their holders.
    ///
    /// Used to rebuild the in-memory lock table after a process restart.
    fn locked_states(&self) -> Result<Vec<(StateRef, LockId)>, VaultError>;

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// Returns states matching the query, ordered by state ref.
    fn query(&self, query: &VaultQuery) -> Result<Vec<StateAndRef>, VaultError>;
}
