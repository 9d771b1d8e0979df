//! Deterministic transaction hashing using blake3.
//!
//! A transaction id is a blake3 digest over its inputs and outputs.
//! Determinism matters for checkpoint restores: a flow that rebuilds the
//! same transaction after a restart must arrive at the same id, and
//! therefore the same output state refs, as before the restart.
//!
//! Determinism is ensured by:
//! - Using `serde_json::to_vec` for canonical serialization (the state
//!   types use no HashMap, only Vec and scalar fields)
//! - Hashing inputs in their given order with an explicit count prefix,
//!   so `[a, b] + []` never collides with `[a] + [b]`

use statevault_core::{BuiltTransaction, StateRef, TransactionState, TxHash};

/// Computes the deterministic id for a transaction's content.
pub fn transaction_hash(inputs: &[StateRef], outputs: &[TransactionState]) -> TxHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(inputs.len() as u64).to_le_bytes());
    for input in inputs {
        hasher.update(&input.txhash.0);
        hasher.update(&input.index.to_le_bytes());
    }
    hasher.update(&(outputs.len() as u64).to_le_bytes());
    for output in outputs {
        // Deterministic because TransactionState serialization is
        // field-ordered and uses no HashMap
        let bytes = serde_json::to_vec(output)
            .expect("TransactionState serialization should never fail");
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    TxHash(*hasher.finalize().as_bytes())
}

/// Builds a [`BuiltTransaction`] with its id derived from content.
pub fn build_transaction(
    inputs: Vec<StateRef>,
    outputs: Vec<TransactionState>,
) -> BuiltTransaction {
    let id = transaction_hash(&inputs, &outputs);
    BuiltTransaction {
        id,
        inputs,
        outputs,
    }
}
