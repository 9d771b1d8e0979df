//! ContractId and ContractRegistry for contract type identity.
//!
//! Every contract type known to the node has a unique [`ContractId`]
//! providing O(1) identity comparison. The [`ContractRegistry`] manages
//! registration and lookup and answers the one question the soft-lock
//! machinery asks: is this contract a fungible asset?

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Unique identifier for a contract type in the registry.
///
/// The inner value is an index into the [`ContractRegistry`]'s contract
/// vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub u32);

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContractId({})", self.0)
    }
}

/// Lockability classification of a contract type.
///
/// Only `FungibleAsset` states are ever soft-locked; `Plain` states pass
/// through transaction building without touching the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Plain,
    FungibleAsset,
}

/// Metadata for a registered contract type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractMeta {
    /// Unique contract name (e.g. "net.example.cash").
    pub name: String,
    /// Lockability classification.
    pub kind: ContractKind,
}

/// Registry of all contract types known to the node.
///
/// Built up-front during node configuration and shared read-only
/// afterwards, so registration takes `&mut self` and lookups take `&self`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractRegistry {
    /// Contracts indexed by ContractId.0
    contracts: Vec<ContractMeta>,
    /// Named contract lookup
    names: HashMap<String, ContractId>,
}

impl ContractRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        ContractRegistry::default()
    }

    /// Registers a contract type, returning its assigned id.
    ///
    /// Names must be unique; re-registering an existing name returns
    /// [`CoreError::DuplicateContractName`].
    pub fn register(&mut self, name: &str, kind: ContractKind) -> Result<ContractId, CoreError> {
        if self.names.contains_key(name) {
            return Err(CoreError::DuplicateContractName {
                name: name.to_string(),
            });
        }
        let id = ContractId(self.contracts.len() as u32);
        self.contracts.push(ContractMeta {
            name: name.to_string(),
            kind,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Looks up a contract by id.
    pub fn get(&self, id: ContractId) -> Result<&ContractMeta, CoreError> {
        self.contracts
            .get(id.0 as usize)
            .ok_or(CoreError::ContractNotFound { id })
    }

    /// Looks up a contract id by name.
    pub fn lookup(&self, name: &str) -> Option<ContractId> {
        self.names.get(name).copied()
    }

    /// The lockability predicate: does `id` name a fungible asset contract?
    pub fn is_fungible(&self, id: ContractId) -> Result<bool, CoreError> {
        Ok(self.get(id)?.kind == ContractKind::FungibleAsset)
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// True if no contracts are registered.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
