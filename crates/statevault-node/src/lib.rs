//! In-process node service for vault soft-locking.
//!
//! Ties together three layers:
//! - [`concurrency::LockTable`] -- exclusive per-state reservations keyed
//!   by flow run ([`statevault_core::LockId`])
//! - [`concurrency::SoftLockManager`] -- the policy layer deciding which
//!   states get locked (fungible assets only) and orchestrating the
//!   acquire/release cycle around flow termination
//! - [`flow`] -- a minimal flow execution environment: registry,
//!   checkpoints, and the lifecycle hook that fires termination exactly
//!   once per logical flow run
//!
//! [`service::NodeService`] wires all of it to a
//! [`statevault_vault::VaultStore`] backend.

pub mod concurrency;
pub mod error;
pub mod flow;
pub mod service;

pub use concurrency::{LockError, LockPhase, LockStatusEntry, LockTable, SoftLockManager};
pub use error::NodeError;
pub use flow::{FlowCheckpoint, FlowLifecycle, FlowRecord, FlowRegistry, FlowStatus};
pub use service::NodeService;
