//! The flow lifecycle hook.
//!
//! [`FlowLifecycle`] guarantees the soft-lock release fires precisely once
//! per logical flow run, including across a checkpoint-restore cycle. It
//! distinguishes "flow rebuilt from checkpoint, still running" (no-op)
//! from "flow reached terminal state" (fire), and keeps its own
//! fired-marker map so a duplicated terminal notification never reaches
//! the manager twice -- the manager's own `Released` phase is the second
//! line of defense.

use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use statevault_core::LockId;

use crate::concurrency::SoftLockManager;
use crate::error::NodeError;
use crate::flow::FlowStatus;

/// Hook between the flow execution environment and the soft-lock manager.
pub struct FlowLifecycle {
    manager: Arc<SoftLockManager>,
    /// Flow runs whose terminal notification already fired.
    fired: DashMap<LockId, Instant>,
}

impl FlowLifecycle {
    pub fn new(manager: Arc<SoftLockManager>) -> Self {
        FlowLifecycle {
            manager,
            fired: DashMap::new(),
        }
    }

    /// The soft-lock manager this hook notifies.
    pub fn manager(&self) -> &Arc<SoftLockManager> {
        &self.manager
    }

    /// Observes a flow status transition.
    ///
    /// Non-terminal transitions (including a restore re-admitting a
    /// suspended flow as `Running`) do nothing. The first terminal
    /// transition for a lock id triggers the release; later ones are
    /// no-ops. If the release fails, the marker is not set, so a retried
    /// termination can complete the release.
    pub fn on_status_change(
        &self,
        lock_id: LockId,
        status: FlowStatus,
    ) -> Result<(), NodeError> {
        if !status.is_terminal() {
            return Ok(());
        }
        match self.fired.entry(lock_id) {
            Entry::Occupied(_) => {
                tracing::debug!(%lock_id, "duplicate terminal notification ignored");
                Ok(())
            }
            Entry::Vacant(v) => {
                self.manager.on_flow_terminated(lock_id)?;
                v.insert(Instant::now());
                Ok(())
            }
        }
    }

    /// Whether the terminal notification already fired for `lock_id`.
    pub fn has_fired(&self, lock_id: LockId) -> bool {
        self.fired.contains_key(&lock_id)
    }
}
