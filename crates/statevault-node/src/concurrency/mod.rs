//! Soft-lock concurrency infrastructure.
//!
//! Provides the two core building blocks for concurrent flow execution:
//! - [`lock_table::LockTable`] for exclusive per-state reservations
//! - [`soft_lock::SoftLockManager`] for the lockability policy and the
//!   exactly-once release at flow termination

pub mod lock_table;
pub mod soft_lock;

pub use lock_table::{LockError, LockStatusEntry, LockTable};
pub use soft_lock::{LockPhase, SoftLockManager};
