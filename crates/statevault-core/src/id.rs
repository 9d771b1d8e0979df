//! Stable identifier newtypes for ledger entities.
//!
//! All identifiers are distinct newtype wrappers, providing type safety so
//! that a [`LockId`] cannot be accidentally used where a [`TxHash`] is
//! expected. [`StateRef`] is `Ord` so that callers acquiring multiple locks
//! can sort request sets into a consistent order.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Identifier of a recorded transaction: a 32-byte content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Renders the hash as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push(HEX[(byte >> 4) as usize]);
            out.push(HEX[(byte & 0x0f) as usize]);
        }
        out
    }

    /// Parses a 64-character hex string back into a hash.
    pub fn from_hex(s: &str) -> Result<TxHash, CoreError> {
        if s.len() != 64 {
            return Err(CoreError::InvalidHash {
                reason: format!("expected 64 hex chars, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = hex_val(chunk[0]).ok_or_else(|| CoreError::InvalidHash {
                reason: format!("invalid hex char at {}", i * 2),
            })?;
            let lo = hex_val(chunk[1]).ok_or_else(|| CoreError::InvalidHash {
                reason: format!("invalid hex char at {}", i * 2 + 1),
            })?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(TxHash(bytes))
    }
}

const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Reference to a single transaction output: transaction hash plus output
/// index. Globally unique and immutable once a transaction is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateRef {
    pub txhash: TxHash,
    pub index: u32,
}

impl StateRef {
    pub fn new(txhash: TxHash, index: u32) -> Self {
        StateRef { txhash, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txhash, self.index)
    }
}

/// Identifier of the flow run holding a set of soft locks (UUID v4 newtype).
///
/// Generated once per logical flow run and persisted in the flow checkpoint,
/// so the same value survives a checkpoint restore. The soft-lock machinery
/// keys everything by this value; it never holds a reference to the flow
/// object itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockId(pub Uuid);

impl LockId {
    /// Allocates a fresh lock id for a new flow run.
    pub fn fresh() -> Self {
        LockId(Uuid::new_v4())
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
