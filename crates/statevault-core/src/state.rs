//! Transaction state types.
//!
//! A [`TransactionState`] is one output of a transaction: a contract id
//! plus an opaque JSON payload. [`BuiltTransaction`] is the product of a
//! flow's build step, carrying the inputs it intends to consume and the
//! outputs it creates.

use serde::{Deserialize, Serialize};

use crate::contract::ContractId;
use crate::error::CoreError;
use crate::id::{StateRef, TxHash};

/// A single ledger output state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionState {
    /// The contract governing this state.
    pub contract: ContractId,
    /// Contract-specific payload (amount, owner, etc.).
    pub data: serde_json::Value,
}

impl TransactionState {
    pub fn new(contract: ContractId, data: serde_json::Value) -> Self {
        TransactionState { contract, data }
    }
}

/// A state paired with the reference identifying it in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAndRef {
    pub state_ref: StateRef,
    pub state: TransactionState,
}

/// A transaction as produced by a flow's build step.
///
/// The id is a deterministic digest over inputs and outputs (see the
/// vault crate's `hash` module), so rebuilding the same transaction after
/// a checkpoint restore yields the same id and therefore the same output
/// state refs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltTransaction {
    /// Deterministic transaction id.
    pub id: TxHash,
    /// References the transaction consumes.
    pub inputs: Vec<StateRef>,
    /// Output states the transaction creates, in output-index order.
    pub outputs: Vec<TransactionState>,
}

impl BuiltTransaction {
    /// The state ref of output `index`, if it exists.
    pub fn output_ref(&self, index: u32) -> Result<StateRef, CoreError> {
        if (index as usize) < self.outputs.len() {
            Ok(StateRef::new(self.id, index))
        } else {
            Err(CoreError::OutputOutOfRange {
                index,
                count: self.outputs.len(),
            })
        }
    }

    /// State refs for every output, in output-index order.
    pub fn output_refs(&self) -> Vec<StateRef> {
        (0..self.outputs.len() as u32)
            .map(|i| StateRef::new(self.id, i))
            .collect()
    }

    /// Outputs paired with their refs, in output-index order.
    pub fn outputs_and_refs(&self) -> Vec<StateAndRef> {
        self.outputs
            .iter()
            .enumerate()
            .map(|(i, state)| StateAndRef {
                state_ref: StateRef::new(self.id, i as u32),
                state: state.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tx() -> BuiltTransaction {
        BuiltTransaction {
            id: TxHash([9; 32]),
            inputs: vec![],
            outputs: vec![
                TransactionState::new(ContractId(0), json!({ "amount": 100 })),
                TransactionState::new(ContractId(1), json!({ "note": "hi" })),
            ],
        }
    }

    #[test]
    fn output_refs_follow_index_order() {
        let tx = tx();
        let refs = tx.output_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], StateRef::new(tx.id, 0));
        assert_eq!(refs[1], StateRef::new(tx.id, 1));
        assert_eq!(tx.output_ref(1).unwrap(), refs[1]);
    }

    #[test]
    fn output_ref_out_of_range() {
        let err = tx().output_ref(2).unwrap_err();
        assert!(matches!(err, CoreError::OutputOutOfRange { index: 2, count: 2 }));
    }

    #[test]
    fn outputs_and_refs_pairs_match() {
        let tx = tx();
        let pairs = tx.outputs_and_refs();
        assert_eq!(pairs[1].state, tx.outputs[1]);
        assert_eq!(pairs[1].state_ref.index, 1);
    }
}
