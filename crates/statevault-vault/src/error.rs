//! Vault error types.
//!
//! [`VaultError`] covers all anticipated failure modes in the storage
//! layer: serialization, SQLite access, migrations, and state-level
//! integrity violations.

use statevault_core::StateRef;
use thiserror::Error;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// No state recorded under the given reference.
    #[error("state not found: {0}")]
    StateNotFound(StateRef),

    /// A different state is already recorded under the given reference.
    #[error("state already recorded with different content: {0}")]
    DuplicateState(StateRef),

    /// The state was already consumed by another transaction.
    #[error("state already consumed: {0}")]
    StateConsumed(StateRef),

    /// A stored row failed to round-trip back into domain types.
    #[error("corrupt vault row: {reason}")]
    CorruptRow { reason: String },

    /// The vault's interior mutex was poisoned by a panicking thread.
    #[error("vault lock poisoned")]
    Poisoned,
}
