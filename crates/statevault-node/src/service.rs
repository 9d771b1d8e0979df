//! Node service wiring the soft-lock layers to a vault backend.
//!
//! [`NodeService`] owns the shared pieces (contract registry, vault, lock
//! table, manager, lifecycle hook, flow registry) and exposes the handful
//! of operations flows call. Construction picks the backend:
//! `in_memory()` for tests and ephemeral nodes, `open()` for a SQLite
//! database on disk, `with_vault()` for a caller-supplied store (test
//! doubles included).

use std::sync::Arc;
use std::time::Duration;

use statevault_core::{BuiltTransaction, ContractRegistry, LockId, StateAndRef, StateRef};
use statevault_vault::{InMemoryVault, SqliteVault, VaultQuery, VaultStore};

use crate::concurrency::{LockTable, SoftLockManager};
use crate::error::NodeError;
use crate::flow::{FlowLifecycle, FlowRegistry, FlowStatus};

/// How long a `Released` tracking record lingers before the retire sweep
/// drops it.
const RELEASED_RECORD_TTL: Duration = Duration::from_secs(30 * 60);

/// The in-process vault soft-lock service.
pub struct NodeService {
    pub contracts: Arc<ContractRegistry>,
    pub vault: Arc<dyn VaultStore>,
    pub lock_table: Arc<LockTable>,
    pub soft_locks: Arc<SoftLockManager>,
    pub lifecycle: Arc<FlowLifecycle>,
    pub flows: Arc<FlowRegistry>,
}

impl NodeService {
    /// Creates a service over a caller-supplied vault backend.
    pub fn with_vault(vault: Arc<dyn VaultStore>, contracts: ContractRegistry) -> Self {
        let contracts = Arc::new(contracts);
        let lock_table = Arc::new(LockTable::new());
        let soft_locks = Arc::new(SoftLockManager::new(
            Arc::clone(&lock_table),
            Arc::clone(&vault),
            Arc::clone(&contracts),
        ));
        let lifecycle = Arc::new(FlowLifecycle::new(Arc::clone(&soft_locks)));
        let flows = Arc::new(FlowRegistry::new(Arc::clone(&lifecycle)));
        NodeService {
            contracts,
            vault,
            lock_table,
            soft_locks,
            lifecycle,
            flows,
        }
    }

    /// Creates a service with an in-memory vault (for testing).
    pub fn in_memory(contracts: ContractRegistry) -> Self {
        Self::with_vault(Arc::new(InMemoryVault::new()), contracts)
    }

    /// Creates a service backed by a SQLite database at `path`, recovering
    /// any soft locks persisted by a previous process.
    pub fn open(path: &str, contracts: ContractRegistry) -> Result<Self, NodeError> {
        let service = Self::with_vault(Arc::new(SqliteVault::open(path)?), contracts);
        service.soft_locks.recover()?;
        Ok(service)
    }

    /// Spawns the background maintenance task retiring old released-lock
    /// records. Call once from an async context.
    pub fn spawn_maintenance(&self, interval: Duration) {
        self.soft_locks
            .start_retire_sweep(interval, RELEASED_RECORD_TTL);
    }

    // -------------------------------------------------------------------
    // Flow-facing operations
    // -------------------------------------------------------------------

    /// Records a built transaction's outputs in the vault, then runs the
    /// soft-lock scan over them. Returns the refs locked for this flow.
    pub fn record_transaction(
        &self,
        lock_id: LockId,
        tx: &BuiltTransaction,
    ) -> Result<Vec<StateRef>, NodeError> {
        for pair in tx.outputs_and_refs() {
            self.vault.insert_state(&pair.state_ref, &pair.state)?;
        }
        self.soft_locks.on_transaction_built(lock_id, tx)
    }

    /// Finalizes a transaction: consumes its inputs, superseding any soft
    /// locks on them in both the vault and the lock table.
    pub fn finalize_transaction(&self, tx: &BuiltTransaction) -> Result<(), NodeError> {
        self.soft_locks.on_transaction_finalized(tx)
    }

    /// Completes a flow, triggering the lifecycle release.
    pub fn complete_flow(&self, lock_id: LockId) -> Result<(), NodeError> {
        self.flows.transition(lock_id, FlowStatus::Completed)
    }

    /// Fails a flow; its locks are still released.
    pub fn fail_flow(&self, lock_id: LockId) -> Result<(), NodeError> {
        self.flows.transition(lock_id, FlowStatus::Failed)
    }

    /// Vault query pass-through for observers.
    pub fn query(&self, query: &VaultQuery) -> Result<Vec<StateAndRef>, NodeError> {
        Ok(self.vault.query(query)?)
    }

    /// Rebuilds the in-memory side of the node over the same vault, as
    /// after a process crash and restart: a fresh lock table recovered
    /// from the vault's persisted annotations, and the flow registry
    /// restored from this service's checkpoints.
    pub fn restart(&self) -> Result<NodeService, NodeError> {
        let restarted = Self::with_vault(Arc::clone(&self.vault), (*self.contracts).clone());
        restarted.soft_locks.recover()?;
        let flows = FlowRegistry::restore(
            Arc::clone(&restarted.lifecycle),
            self.flows.checkpoints(),
        );
        Ok(NodeService {
            flows: Arc::new(flows),
            ..restarted
        })
    }
}
