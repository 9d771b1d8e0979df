//! Flow registry: identity, status, and checkpoint records.
//!
//! [`FlowRegistry`] tracks live flow runs via their [`LockId`]. Each run
//! carries a serializable [`FlowCheckpoint`]; exporting the checkpoints
//! and rebuilding a registry from them models a process restart, after
//! which non-terminal flows resume under the *same* lock id.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use statevault_core::LockId;

use crate::error::NodeError;
use crate::flow::lifecycle::FlowLifecycle;
use crate::flow::FlowStatus;

/// In-memory record of one flow run.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub lock_id: LockId,
    pub name: String,
    pub status: FlowStatus,
    /// Flow-specific progress payload, opaque to the registry.
    pub progress: serde_json::Value,
}

/// Persisted form of a flow run, sufficient to rebuild the record after a
/// restart. The lock id travels with the checkpoint, which is what makes
/// it stable across restores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    pub lock_id: LockId,
    pub name: String,
    pub status: FlowStatus,
    pub progress: serde_json::Value,
}

/// Registry of flow runs, wired to the lifecycle hook.
pub struct FlowRegistry {
    flows: DashMap<LockId, FlowRecord>,
    lifecycle: Arc<FlowLifecycle>,
}

impl FlowRegistry {
    /// Creates an empty registry.
    pub fn new(lifecycle: Arc<FlowLifecycle>) -> Self {
        FlowRegistry {
            flows: DashMap::new(),
            lifecycle,
        }
    }

    /// Rebuilds a registry from exported checkpoints, as after a process
    /// restart. Terminal flows are not re-admitted (their release already
    /// happened before the checkpoint was cut); suspended and running
    /// flows resume as `Running` under their original lock ids.
    pub fn restore(lifecycle: Arc<FlowLifecycle>, checkpoints: Vec<FlowCheckpoint>) -> Self {
        let registry = FlowRegistry::new(lifecycle);
        for cp in checkpoints {
            if cp.status.is_terminal() {
                continue;
            }
            tracing::info!(lock_id = %cp.lock_id, name = %cp.name, "flow restored from checkpoint");
            registry.flows.insert(
                cp.lock_id,
                FlowRecord {
                    lock_id: cp.lock_id,
                    name: cp.name,
                    status: FlowStatus::Running,
                    progress: cp.progress,
                },
            );
        }
        registry
    }

    /// Starts a new flow run, allocating its lock id.
    pub fn start(&self, name: &str) -> LockId {
        let lock_id = LockId::fresh();
        self.flows.insert(
            lock_id,
            FlowRecord {
                lock_id,
                name: name.to_string(),
                status: FlowStatus::Running,
                progress: serde_json::Value::Null,
            },
        );
        tracing::info!(%lock_id, name, "flow started");
        lock_id
    }

    /// Returns a clone of the flow record, if registered.
    pub fn record(&self, lock_id: LockId) -> Option<FlowRecord> {
        self.flows.get(&lock_id).map(|e| e.clone())
    }

    /// Overwrites the flow's progress payload (a checkpoint write).
    pub fn save_progress(
        &self,
        lock_id: LockId,
        progress: serde_json::Value,
    ) -> Result<(), NodeError> {
        let mut record = self
            .flows
            .get_mut(&lock_id)
            .ok_or(NodeError::FlowNotFound(lock_id))?;
        record.progress = progress;
        Ok(())
    }

    /// Transitions a flow to a new status and notifies the lifecycle hook.
    pub fn transition(&self, lock_id: LockId, status: FlowStatus) -> Result<(), NodeError> {
        {
            let mut record = self
                .flows
                .get_mut(&lock_id)
                .ok_or(NodeError::FlowNotFound(lock_id))?;
            record.status = status;
            // Drop the map guard before the hook runs: the release path
            // must not hold a registry entry lock.
        }
        self.lifecycle.on_status_change(lock_id, status)
    }

    /// Exports all flow records as checkpoints.
    pub fn checkpoints(&self) -> Vec<FlowCheckpoint> {
        self.flows
            .iter()
            .map(|e| FlowCheckpoint {
                lock_id: e.lock_id,
                name: e.name.clone(),
                status: e.status,
                progress: e.progress.clone(),
            })
            .collect()
    }

    /// Lock ids of currently registered flows.
    pub fn active(&self) -> Vec<LockId> {
        self.flows.iter().map(|e| *e.key()).collect()
    }
}
