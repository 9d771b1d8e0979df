//! Vault storage layer for ledger states.
//!
//! Provides the [`VaultStore`] trait defining the storage contract that all
//! backends implement, plus [`InMemoryVault`] and [`SqliteVault`] as
//! first-class backends.
//!
//! # Architecture
//!
//! The vault records unconsumed transaction outputs and two per-state
//! annotations the node keeps current:
//! - **consumption**: which transaction, if any, spent the state;
//! - **soft lock**: which flow run, if any, has the state reserved.
//!
//! The soft-lock column is a mirror of the node's in-memory lock table, so
//! locks survive a process restart and the `LockedOnly` query filter stays
//! consistent with what flows actually hold.
//!
//! # Modules
//!
//! - [`error`]: VaultError enum with all failure modes
//! - [`types`]: query filter types (VaultQuery, SoftLockFilter, ...)
//! - [`traits`]: VaultStore trait definition
//! - [`hash`]: deterministic blake3 transaction hashing
//! - [`memory`]: InMemoryVault implementation
//! - [`schema`]: SQL schema and migration setup
//! - [`sqlite`]: SqliteVault implementation

pub mod error;
pub mod hash;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use error::VaultError;
pub use hash::{build_transaction, transaction_hash};
pub use memory::InMemoryVault;
pub use sqlite::SqliteVault;
pub use traits::VaultStore;
pub use types::{SoftLockFilter, StateStatus, VaultQuery};
