//! State snapshot file (spec §6): `state.json`, letting a node bootstrap
//! another peer (or restart itself) without replaying history.

use crate::account::Account;
use crate::chain::Chain;
use crate::error::ChainError;
use crate::pow::Difficulty;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub difficulty: Difficulty,
    #[serde(with = "u256_hex")]
    pub target: U256,
    pub recalculate_every_x_blocks: u64,
    pub xth_last_block_time: u64,
    pub last_block_time: u64,
    pub last_block_number: u64,
    #[serde(with = "hash_hex")]
    pub last_block_hash: [u8; 32],
    pub genesis_time: u64,
    pub expected_block_time: u64,
    pub accounts: Vec<Account>,
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

mod u256_hex {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{value:x}"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let hex_part = s.strip_prefix("0x").unwrap_or(&s);
        U256::from_str_radix(hex_part, 16).map_err(serde::de::Error::custom)
    }
}

impl Snapshot {
    /// Captures the current tip and account table (spec §6). `save_state`
    /// in the original implementation.
    pub fn save(chain: &Chain) -> Self {
        let tip = chain.tip();
        Snapshot {
            difficulty: chain.difficulty,
            target: chain.target(),
            recalculate_every_x_blocks: chain.recalculate_every_x_blocks,
            xth_last_block_time: chain.xth_last_block_time,
            last_block_time: tip.timestamp,
            last_block_number: tip.number,
            last_block_hash: tip.hash(),
            genesis_time: chain.genesis_time,
            expected_block_time: chain.expected_block_time,
            accounts: chain.accounts.clone(),
        }
    }

    /// Rebuilds a chain whose tip is a snapshot stub standing in for the
    /// history this snapshot summarizes (spec §6: "Loading this file
    /// produces a single snapshot-stub block... with `nonce = -1`").
    pub fn load(self) -> Chain {
        Chain::from_snapshot_parts(
            self.difficulty,
            self.recalculate_every_x_blocks,
            self.xth_last_block_time,
            self.genesis_time,
            self.expected_block_time,
            self.last_block_number,
            self.last_block_hash,
            self.last_block_time,
            self.accounts,
        )
    }

    pub fn to_json(&self) -> Result<String, ChainError> {
        serde_json::to_string_pretty(self).map_err(|e| ChainError::MalformedSnapshot(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self, ChainError> {
        serde_json::from_str(s).map_err(|e| ChainError::MalformedSnapshot(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainParams;

    #[test]
    fn snapshot_round_trips_through_json() {
        let chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let snapshot = Snapshot::save(&chain);
        let json = snapshot.to_json().unwrap();
        let reloaded_snapshot = Snapshot::from_json(&json).unwrap();
        let reloaded = reloaded_snapshot.load();

        assert_eq!(reloaded.tip().number, chain.tip().number);
        assert_eq!(reloaded.tip().hash(), chain.tip().hash());
        assert_eq!(reloaded.difficulty, chain.difficulty);
        assert_eq!(reloaded.target(), chain.target());
        assert_eq!(reloaded.accounts, chain.accounts);
    }

    #[test]
    fn loaded_chain_tip_is_a_snapshot_stub() {
        let chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let snapshot = Snapshot::save(&chain);
        let reloaded = snapshot.load();
        assert!(reloaded.tip().is_snapshot_stub());
        assert_eq!(reloaded.tip().prev_hash, chain.tip().hash());
    }
}
