//! Blocks and mining (spec §3, §4.3).

use crate::error::ChainError;
use crate::pow::{self, Difficulty};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// `prev_hash` for the synthetic genesis stub (spec §6).
pub const GENESIS_PREV_HASH: [u8; 32] = [0u8; 32];

/// Sentinel nonce marking a snapshot stub: a block standing in for history
/// that was loaded from a snapshot rather than replayed (spec §3).
pub const SNAPSHOT_STUB_NONCE: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub timestamp: u64,
    pub nonce: i64,
    #[serde(with = "hash_hex")]
    pub prev_hash: [u8; 32],
    pub txs: Vec<Transaction>,
}

mod hash_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(serde::de::Error::custom("hash must be 32 bytes"));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(out)
    }
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("time went backwards").as_secs()
}

impl Block {
    pub fn genesis_stub(timestamp: u64) -> Self {
        Block { number: 0, timestamp, nonce: SNAPSHOT_STUB_NONCE, prev_hash: GENESIS_PREV_HASH, txs: Vec::new() }
    }

    /// A snapshot stub standing in for history that was loaded rather than
    /// replayed; `prev_hash` here *is* the stub's hash (spec §3).
    pub fn snapshot_stub(number: u64, timestamp: u64, hash: [u8; 32]) -> Self {
        Block { number, timestamp, nonce: SNAPSHOT_STUB_NONCE, prev_hash: hash, txs: Vec::new() }
    }

    pub fn is_snapshot_stub(&self) -> bool {
        self.nonce == SNAPSHOT_STUB_NONCE
    }

    pub fn new_candidate(number: u64, prev_hash: [u8; 32], txs: Vec<Transaction>) -> Self {
        Block { number, timestamp: now_unix(), nonce: 0, prev_hash, txs }
    }

    /// `SHA256("Block "n", Timestamp: "t", Nonce: "k", PrevHash: "p", Tx
    /// Hashes: "H)` where `H` is the newline-joined transaction hashes
    /// (spec §3). For a snapshot stub, `prev_hash` *is* the hash.
    pub fn hash(&self) -> [u8; 32] {
        if self.is_snapshot_stub() {
            return self.prev_hash;
        }
        let tx_hashes: Vec<String> = self.txs.iter().map(|t| t.tx_hash()).collect();
        let message = format!(
            "Block {}, Timestamp: {}, Nonce: {}, PrevHash: {}, Tx Hashes: {}",
            self.number,
            self.timestamp,
            self.nonce,
            hex::encode(self.prev_hash),
            tx_hashes.join("\n"),
        );
        crate::crypto::sha256(message.as_bytes())
    }

    pub fn meets_target(&self, target: &primitive_types::U256) -> bool {
        pow::hash_meets_target(&self.hash(), target)
    }

    /// Validates this block against the current tip per spec §4.4's
    /// `add_block` preconditions, without mutating anything.
    pub fn validate_against_tip(&self, tip: Option<&Block>, target: &primitive_types::U256) -> Result<(), ChainError> {
        if !self.meets_target(target) {
            return Err(ChainError::DifficultyNotMet);
        }
        if let Some(tip) = tip {
            if self.number != tip.number + 1 {
                return Err(ChainError::NonSequentialNumber { got: self.number, tip: tip.number });
            }
            if self.prev_hash != tip.hash() {
                return Err(ChainError::PrevHashMismatch);
            }
            if self.timestamp < tip.timestamp {
                return Err(ChainError::TimestampRegression { got: self.timestamp, tip: tip.timestamp });
            }
        }
        Ok(())
    }

    /// Searches for a nonce making `hash() < target`, starting from 0 and
    /// incrementing. Updates `timestamp` to wall-clock time on every
    /// attempt, so the winning block's timestamp is when the nonce was
    /// found (spec §4.3). Checks `cancel` before each attempt and returns
    /// `None` without declaring a result if it becomes set — the
    /// cooperative cancellation token a peer's block raises (spec §4.3,
    /// §5).
    pub fn mine(mut self, difficulty: &Difficulty, cancel: &AtomicBool) -> Option<Self> {
        let target = difficulty.target();
        let mut i: u64 = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            self.nonce = i as i64;
            self.timestamp = now_unix();
            if self.meets_target(&target) {
                return Some(self);
            }
            i = i.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    #[test]
    fn snapshot_stub_hash_is_its_prev_hash_field() {
        let stub = Block::snapshot_stub(5, 1000, [7u8; 32]);
        assert_eq!(stub.hash(), [7u8; 32]);
    }

    #[test]
    fn permuting_transactions_changes_the_hash() {
        use crate::address::ZERO_ADDRESS;
        use crate::transaction::TxData;
        let mut key_a = [0u8; 32];
        key_a[31] = 1;
        let addr = crate::crypto::derive_address(&key_a).unwrap();
        let tx1 = crate::transaction::Transaction::new_signed(&key_a, addr, ZERO_ADDRESS, 1, 0, 1, TxData::Transfer {}).unwrap();
        let tx2 = crate::transaction::Transaction::new_signed(&key_a, addr, ZERO_ADDRESS, 2, 1, 1, TxData::Transfer {}).unwrap();

        let forward = Block { number: 1, timestamp: 10, nonce: 0, prev_hash: [0; 32], txs: vec![tx1.clone(), tx2.clone()] };
        let reversed = Block { number: 1, timestamp: 10, nonce: 0, prev_hash: [0; 32], txs: vec![tx2, tx1] };
        assert_ne!(forward.hash(), reversed.hash());
    }

    #[test]
    fn mining_never_exceeds_difficulty_one_target() {
        let candidate = Block::new_candidate(1, [0; 32], Vec::new());
        let difficulty = crate::pow::Difficulty::ONE;
        let cancel = AtomicBool::new(false);
        let mined = candidate.mine(&difficulty, &cancel).unwrap();
        assert!(pow::hash_meets_target(&mined.hash(), &U256::max_value()));
    }

    #[test]
    fn mining_abandons_when_cancelled_up_front() {
        let candidate = Block::new_candidate(1, [0; 32], Vec::new());
        let tiny_difficulty = crate::pow::Difficulty { num: u128::MAX, den: 1 };
        let cancel = AtomicBool::new(true);
        assert!(candidate.mine(&tiny_difficulty, &cancel).is_none());
    }
}
