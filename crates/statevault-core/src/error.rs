//! Core error types for statevault-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! all anticipated failure modes in the core data model.

use crate::contract::ContractId;
use thiserror::Error;

/// Core errors produced by the statevault-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Attempting to register a contract name that already exists.
    #[error("duplicate contract name: '{name}'")]
    DuplicateContractName { name: String },

    /// A ContractId was not found in the contract registry.
    #[error("contract not found: ContractId({id})", id = id.0)]
    ContractNotFound { id: ContractId },

    /// A transaction hash failed to parse.
    #[error("invalid transaction hash: {reason}")]
    InvalidHash { reason: String },

    /// An output index was out of range for a transaction.
    #[error("output index {index} out of range ({count} outputs)")]
    OutputOutOfRange { index: u32, count: usize },
}
