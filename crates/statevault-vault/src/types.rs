//! Query filter types for the vault.
//!
//! [`VaultQuery`] is defined here (not in statevault-core) because query
//! shape is a storage concern -- the node and external observers build
//! queries, the backends interpret them.

use serde::{Deserialize, Serialize};

use statevault_core::{ContractId, LockId};

/// Consumption-status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    /// Only states not yet spent.
    Unconsumed,
    /// Only states spent by a finalized transaction.
    Consumed,
    /// No consumption filtering.
    All,
}

/// Soft-lock filter.
///
/// `LockedOnly` is the observation surface flows use to see their own
/// reservations; it must agree with the node's in-memory lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftLockFilter {
    /// No lock filtering.
    All,
    /// Only states currently soft-locked (by anyone).
    LockedOnly,
    /// Only states not soft-locked.
    UnlockedOnly,
    /// Only states soft-locked by the given flow run.
    LockedBy(LockId),
}

/// A vault query: all criteria are ANDed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultQuery {
    pub status: StateStatus,
    pub lock_filter: SoftLockFilter,
    /// Optional contract-type restriction.
    pub contract: Option<ContractId>,
}

impl VaultQuery {
    /// All unconsumed states, locked or not.
    pub fn unconsumed() -> Self {
        VaultQuery {
            status: StateStatus::Unconsumed,
            lock_filter: SoftLockFilter::All,
            contract: None,
        }
    }

    /// Unconsumed states currently soft-locked.
    pub fn locked_only() -> Self {
        VaultQuery {
            status: StateStatus::Unconsumed,
            lock_filter: SoftLockFilter::LockedOnly,
            contract: None,
        }
    }

    /// Unconsumed states free for selection.
    pub fn unlocked_only() -> Self {
        VaultQuery {
            status: StateStatus::Unconsumed,
            lock_filter: SoftLockFilter::UnlockedOnly,
            contract: None,
        }
    }

    /// Restricts the query to one contract type.
    pub fn with_contract(mut self, contract: ContractId) -> Self {
        self.contract = Some(contract);
        self
    }
}
