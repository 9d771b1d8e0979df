//! Minimal flow execution environment.
//!
//! Enough of a flow framework to drive the soft-lock lifecycle: flow
//! identity ([`statevault_core::LockId`]), status transitions, checkpoint
//! export/restore, and the [`lifecycle::FlowLifecycle`] hook that turns a
//! terminal transition into exactly one soft-lock release.

pub mod lifecycle;
pub mod registry;

pub use lifecycle::FlowLifecycle;
pub use registry::{FlowCheckpoint, FlowRecord, FlowRegistry};

use serde::{Deserialize, Serialize};

/// Execution status of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Actively executing.
    Running,
    /// Parked at a suspension point (e.g. awaiting a counterparty).
    Suspended,
    /// Finished successfully. Terminal.
    Completed,
    /// Aborted with an error. Terminal.
    Failed,
}

impl FlowStatus {
    /// Terminal statuses trigger the soft-lock release.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Failed)
    }
}
