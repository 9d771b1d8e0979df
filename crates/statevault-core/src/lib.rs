//! Core domain model for the vault soft-lock subsystem.
//!
//! Defines the identifier newtypes ([`TxHash`], [`StateRef`], [`LockId`]),
//! the contract type registry with the fungibility predicate, and the
//! transaction state types shared by the vault and node crates.

pub mod contract;
pub mod error;
pub mod id;
pub mod state;

// Re-export commonly used types
pub use contract::{ContractId, ContractKind, ContractMeta, ContractRegistry};
pub use error::CoreError;
pub use id::{LockId, StateRef, TxHash};
pub use state::{BuiltTransaction, StateAndRef, TransactionState};
