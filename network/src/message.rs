//! Wire messages (spec §4.6, §6): one JSON object per line, one of three
//! shapes. `#[serde(untagged)]` keeps each shape exactly the bare object
//! spec §6 describes (`{state: ...}`, `{new_block: ...}`, `{new_tx: ...}`)
//! instead of wrapping it in a tagged envelope.

use chain_core::snapshot::Snapshot;
use chain_core::{Block, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    State { state: Snapshot },
    NewBlock { new_block: Block },
    NewTx { new_tx: Transaction },
}
