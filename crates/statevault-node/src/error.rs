//! Unified error type for the node crate.
//!
//! [`NodeError`] wraps the layer-specific errors (`CoreError`,
//! `VaultError`, `LockError`) and adds flow-level failure modes.

use statevault_core::{CoreError, LockId};
use statevault_vault::VaultError;

use crate::concurrency::LockError;

/// Errors produced by node operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Core data model failure (unknown contract, bad hash, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Vault storage failure. Fatal to the operation; never retried here.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Lock acquisition failure (states reserved by another flow).
    #[error(transparent)]
    Lock(#[from] LockError),

    /// No flow registered under the given lock id.
    #[error("flow not found: {0}")]
    FlowNotFound(LockId),

    /// The flow already terminated and released its locks; late build
    /// replays must not re-acquire.
    #[error("flow already retired: {0}")]
    FlowRetired(LockId),
}
