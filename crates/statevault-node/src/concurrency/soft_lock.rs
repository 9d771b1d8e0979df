//! Policy layer orchestrating soft locks around the flow lifecycle.
//!
//! [`SoftLockManager`] decides *which* output states require locking
//! (fungible-asset contracts only) and guarantees the release at flow
//! termination happens exactly once per flow run. Releasing goes through
//! the vault and is comparatively expensive, so the manager tracks per
//! [`LockId`] whether any lock was actually taken and skips the vault
//! round-trip entirely when none was.
//!
//! Per-LockId state machine: absent (no locks) -> `Locked` -> `Released`
//! (terminal), with the shortcut absent -> `Released` when the flow never
//! locked anything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use statevault_core::{BuiltTransaction, ContractRegistry, LockId, StateRef};
use statevault_vault::VaultStore;

use crate::concurrency::lock_table::LockTable;
use crate::error::NodeError;

/// Lifecycle phase of a flow run's lock set. Absence from the tracking
/// map means the flow has not locked anything yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    /// At least one lock acquired and not yet released.
    Locked,
    /// Terminal: the release for this flow run already happened (or was
    /// skipped because nothing was ever locked).
    Released,
}

/// Tracking record for one flow run.
#[derive(Debug, Clone, Copy)]
struct Tracking {
    phase: LockPhase,
    /// When the record last changed phase. Drives retirement sweeps.
    since: Instant,
}

/// The soft-lock policy layer.
///
/// Sole mutator of the [`LockTable`]; also keeps the vault's soft-lock
/// annotations in step with the table so the `LockedOnly` query filter
/// stays truthful and locks survive a process restart.
pub struct SoftLockManager {
    table: Arc<LockTable>,
    vault: Arc<dyn VaultStore>,
    contracts: Arc<ContractRegistry>,
    tracking: DashMap<LockId, Tracking>,
}

impl SoftLockManager {
    pub fn new(
        table: Arc<LockTable>,
        vault: Arc<dyn VaultStore>,
        contracts: Arc<ContractRegistry>,
    ) -> Self {
        SoftLockManager {
            table,
            vault,
            contracts,
            tracking: DashMap::new(),
        }
    }

    /// Scans a freshly built transaction and locks its fungible-asset
    /// outputs under `lock_id`.
    ///
    /// Plain (non-fungible) outputs are never locked; if the transaction
    /// has no fungible outputs this touches neither the table nor the
    /// vault. A conflict fails the build step with
    /// [`NodeError::Lock`]; the caller must abort transaction
    /// construction (and may retry with different inputs).
    ///
    /// Returns the refs locked by this call. Idempotent under checkpoint
    /// replay: the deterministic transaction id makes the replayed refs
    /// identical, and re-locking refs already held by `lock_id` succeeds.
    pub fn on_transaction_built(
        &self,
        lock_id: LockId,
        tx: &BuiltTransaction,
    ) -> Result<Vec<StateRef>, NodeError> {
        let mut fungible = Vec::new();
        for (index, output) in tx.outputs.iter().enumerate() {
            if self.contracts.is_fungible(output.contract)? {
                fungible.push(StateRef::new(tx.id, index as u32));
            }
        }
        if fungible.is_empty() {
            return Ok(fungible);
        }

        // The tracking entry is held across the whole acquisition, so a
        // termination racing for the same flow run cannot interleave
        // between the phase check and the table and vault updates.
        let mut guard = match self.tracking.entry(lock_id) {
            Entry::Occupied(e) => {
                if e.get().phase == LockPhase::Released {
                    // Late replay after release must not re-acquire
                    return Err(NodeError::FlowRetired(lock_id));
                }
                self.table.try_lock(lock_id, &fungible)?;
                e.into_ref()
            }
            Entry::Vacant(v) => {
                self.table.try_lock(lock_id, &fungible)?;
                v.insert(Tracking {
                    phase: LockPhase::Locked,
                    since: Instant::now(),
                })
            }
        };
        guard.since = Instant::now();

        // The phase is `Locked` before the vault write: if the write
        // fails, the error propagates and the termination hook still
        // releases the table entries and clears whatever annotations
        // landed.
        self.vault.mark_locked(lock_id, &fungible)?;
        drop(guard);

        tracing::info!(%lock_id, tx = %tx.id, count = fungible.len(), "fungible outputs soft-locked");
        Ok(fungible)
    }

    /// Consumes a finalized transaction's inputs.
    ///
    /// Consumption supersedes any soft lock: the vault clears the
    /// annotations as part of the consume, and the consumed refs are
    /// dropped from the lock table regardless of holder so the two views
    /// stay consistent.
    pub fn on_transaction_finalized(&self, tx: &BuiltTransaction) -> Result<(), NodeError> {
        self.vault.consume_states(&tx.inputs, &tx.id)?;
        let evicted = self.table.evict(&tx.inputs);
        if !evicted.is_empty() {
            tracing::debug!(tx = %tx.id, count = evicted.len(), "consumed states evicted from lock table");
        }
        Ok(())
    }

    /// Terminal-state notification: releases everything held by `lock_id`,
    /// exactly once per logical flow run.
    ///
    /// Only the `Locked -> Released` transition issues the full-set table
    /// release plus the vault `clear_locks(lock_id, None)` call. A flow
    /// that never locked anything transitions straight to `Released`
    /// without any vault interaction, and duplicate invocations observe
    /// `Released` and return immediately. The transition runs under the
    /// tracking map's per-entry lock, so concurrent duplicates still
    /// release once.
    pub fn on_flow_terminated(&self, lock_id: LockId) -> Result<(), NodeError> {
        match self.tracking.entry(lock_id) {
            Entry::Occupied(mut e) => match e.get().phase {
                LockPhase::Released => Ok(()),
                LockPhase::Locked => {
                    let released = self.table.release(lock_id, None);
                    // On vault failure the phase stays Locked: the error
                    // propagates and a later termination retry will find
                    // the annotations still to clear.
                    self.vault.clear_locks(lock_id, None)?;
                    *e.get_mut() = Tracking {
                        phase: LockPhase::Released,
                        since: Instant::now(),
                    };
                    tracing::info!(%lock_id, count = released.len(), "flow terminated, soft locks released");
                    Ok(())
                }
            },
            Entry::Vacant(v) => {
                // Never locked anything: skip the vault round-trip entirely
                v.insert(Tracking {
                    phase: LockPhase::Released,
                    since: Instant::now(),
                });
                tracing::debug!(%lock_id, "flow terminated with no soft locks, release skipped");
                Ok(())
            }
        }
    }

    /// Current phase for a flow run, if it ever interacted with the
    /// manager. `None` means no locks and no termination seen.
    pub fn phase(&self, lock_id: LockId) -> Option<LockPhase> {
        self.tracking.get(&lock_id).map(|t| t.phase)
    }

    /// Rebuilds the lock table and tracking map from the vault's persisted
    /// soft-lock annotations after a process restart.
    ///
    /// Returns the number of locks recovered.
    pub fn recover(&self) -> Result<usize, NodeError> {
        let locked = self.vault.locked_states()?;
        let mut recovered = 0;
        for (state_ref, lock_id) in locked {
            self.table.try_lock(lock_id, &[state_ref])?;
            self.tracking.insert(
                lock_id,
                Tracking {
                    phase: LockPhase::Locked,
                    since: Instant::now(),
                },
            );
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(count = recovered, "soft locks recovered from vault");
        }
        Ok(recovered)
    }

    /// Retires `Released` tracking records older than `max_age`.
    ///
    /// Returns the number of records removed.
    pub fn sweep_released(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.tracking.len();
        self.tracking.retain(|_, t| {
            t.phase != LockPhase::Released || now.duration_since(t.since) < max_age
        });
        before - self.tracking.len()
    }

    /// Spawns a background tokio task that periodically retires old
    /// `Released` records.
    pub fn start_retire_sweep(self: &Arc<Self>, interval: Duration, max_age: Duration) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                let retired = manager.sweep_released(max_age);
                if retired > 0 {
                    tracing::info!("Retired {} released lock record(s)", retired);
                }
            }
        });
    }
}
