//! Chain state machine (spec §3, §4.4): account table, block list, difficulty
//! retarget, block execution, contract dispatch.

use crate::account::{self, Account};
use crate::block::Block;
use crate::contract;
use crate::crypto::CryptoError;
use crate::error::{ChainError, ChainResult, TxError};
use crate::pow::Difficulty;
use crate::transaction::{Transaction, TxData};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;

/// Runtime-tunable parameters a `Chain` is built from (spec §6's CLI flags
/// plus the retarget window, carried by `chain-cli`'s `Config`).
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    pub difficulty: Difficulty,
    pub expected_block_time: u64,
    pub recalculate_every_x_blocks: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        ChainParams { difficulty: Difficulty::ONE, expected_block_time: 10, recalculate_every_x_blocks: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct Chain {
    pub difficulty: Difficulty,
    pub expected_block_time: u64,
    pub recalculate_every_x_blocks: u64,
    pub xth_last_block_time: u64,
    pub genesis_time: u64,
    pub blocks: Vec<Block>,
    pub accounts: Vec<Account>,
    pub pending_txs: Vec<Transaction>,
    pub new_blocks: Vec<Block>,
    blocks_since_retarget: u64,
}

impl Chain {
    /// A fresh standalone chain: difficulty 1, genesis stub with
    /// `prev_hash = 64·"0"`, seeded accounts (spec §4.6 bootstrap, no-peers
    /// branch).
    pub fn new_standalone(params: ChainParams) -> Result<Self, CryptoError> {
        let now = crate::block::now_unix();
        let genesis = Block::genesis_stub(now);
        let accounts = account::generate_genesis_accounts()?;
        Ok(Chain {
            difficulty: params.difficulty,
            expected_block_time: params.expected_block_time,
            recalculate_every_x_blocks: params.recalculate_every_x_blocks,
            xth_last_block_time: now,
            genesis_time: now,
            blocks: vec![genesis],
            accounts,
            pending_txs: Vec::new(),
            new_blocks: Vec::new(),
            blocks_since_retarget: 0,
        })
    }

    /// Rebuilds a chain around a loaded snapshot stub (spec §6): the stub's
    /// `prev_hash` field *is* the snapshot's last block hash.
    #[allow(clippy::too_many_arguments)]
    pub fn from_snapshot_parts(
        difficulty: Difficulty,
        recalculate_every_x_blocks: u64,
        xth_last_block_time: u64,
        genesis_time: u64,
        expected_block_time: u64,
        last_block_number: u64,
        last_block_hash: [u8; 32],
        last_block_time: u64,
        accounts: Vec<Account>,
    ) -> Self {
        let stub = Block::snapshot_stub(last_block_number, last_block_time, last_block_hash);
        Chain {
            difficulty,
            expected_block_time,
            recalculate_every_x_blocks,
            xth_last_block_time,
            genesis_time,
            blocks: vec![stub],
            accounts,
            pending_txs: Vec::new(),
            new_blocks: Vec::new(),
            blocks_since_retarget: 0,
        }
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always has at least the genesis stub")
    }

    pub fn target(&self) -> primitive_types::U256 {
        self.difficulty.target()
    }

    fn account_index(&self, address: &crate::address::Address) -> Option<usize> {
        self.accounts.iter().position(|a| &a.address == address)
    }

    pub fn account(&self, address: &crate::address::Address) -> Option<&Account> {
        self.account_index(address).map(|i| &self.accounts[i])
    }

    pub fn account_mut(&mut self, address: &crate::address::Address) -> Option<&mut Account> {
        let idx = self.account_index(address)?;
        Some(&mut self.accounts[idx])
    }

    pub fn total_balance(&self) -> u128 {
        self.accounts.iter().map(|a| a.balance as u128).sum()
    }

    /// Builds the next candidate block over the current pending transactions
    /// (spec §2: "assembles a candidate block on top of the current tip").
    pub fn compose_candidate(&self) -> Block {
        Block::new_candidate(self.tip().number + 1, self.tip().hash(), self.pending_txs.clone())
    }

    /// Mines one block and, on success, applies it locally (spec §4.4:
    /// "`execute_block` must be called before `add_block` in local mining").
    /// Returns `Ok(true)` if a block was found and applied, `Ok(false)` if
    /// the search was cancelled by a peer's block.
    pub fn mine_next(&mut self, cancel: &AtomicBool) -> ChainResult<bool> {
        let candidate = self.compose_candidate();
        match candidate.mine(&self.difficulty, cancel) {
            Some(mined) => {
                self.apply_block(mined)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Validates, executes, and commits `block` as a single atomic
    /// operation (spec §9: "a single `apply_block` operation that is
    /// atomic with respect to chain state"), then removes from
    /// `pending_txs` only the transactions that made it into `block` (spec
    /// §9's pending-tx-clearing fix).
    pub fn apply_block(&mut self, block: Block) -> ChainResult<()> {
        let target = self.target();
        block.validate_against_tip(self.blocks.last(), &target)?;
        self.execute_block(&block);

        let included: HashSet<String> = block.txs.iter().map(Transaction::tx_hash).collect();
        self.pending_txs.retain(|tx| !included.contains(&tx.tx_hash()));

        self.blocks.push(block);
        self.blocks_since_retarget += 1;
        self.maybe_retarget();
        Ok(())
    }

    /// Drains and applies every block buffered from peers (spec §4.6: the
    /// mining loop calls this on its next iteration after being preempted).
    /// A block that fails validation is logged and dropped rather than
    /// crashing the node (spec §9: no fork choice).
    pub fn append_new_blocks(&mut self) {
        let buffered: Vec<Block> = self.new_blocks.drain(..).collect();
        for block in buffered {
            if let Err(e) = self.apply_block(block) {
                log::warn!("dropping peer block: {e}");
            }
        }
    }

    fn maybe_retarget(&mut self) {
        if self.recalculate_every_x_blocks == 0 || self.blocks_since_retarget < self.recalculate_every_x_blocks {
            return;
        }
        let now = self.tip().timestamp;
        let expected = self.recalculate_every_x_blocks * self.expected_block_time;
        let actual = now.saturating_sub(self.xth_last_block_time);
        let old = self.difficulty;
        self.difficulty = self.difficulty.retarget(expected, actual);
        self.xth_last_block_time = now;
        self.blocks_since_retarget = 0;
        log::info!("retargeted difficulty {:.4} -> {:.4}", old.as_f64(), self.difficulty.as_f64());
    }

    /// Applies every transaction in `block` in order, per spec §4.4 steps
    /// 1-7. Each transaction that fails any check is logged and skipped
    /// without aborting the block (spec §4.2, §7).
    fn execute_block(&mut self, block: &Block) {
        for tx in &block.txs {
            self.execute_transaction(tx);
        }
    }

    fn execute_transaction(&mut self, tx: &Transaction) {
        if let Err(e) = self.try_execute_transaction(tx) {
            log::warn!("skipping tx {} from {}: {e}", tx.tx_hash(), tx.from);
        }
    }

    /// Validates and applies `tx`, returning the matching [`TxError`] on the
    /// first failed check (spec §4.2/§4.4's ordered validation list).
    fn try_execute_transaction(&mut self, tx: &Transaction) -> Result<(), TxError> {
        let from_idx = self.account_index(&tx.from).ok_or_else(|| TxError::UnknownAccount(tx.from.to_string()))?;
        let to_idx = self.account_index(&tx.to).ok_or_else(|| TxError::UnknownAccount(tx.to.to_string()))?;

        let have = self.accounts[from_idx].balance;
        if tx.amount > have {
            return Err(TxError::InsufficientBalance { have, need: tx.amount });
        }
        if !tx.verify_signature() {
            return Err(TxError::BadSignature);
        }
        let account_nonce = self.accounts[from_idx].nonce;
        if tx.nonce != account_nonce {
            return Err(TxError::NonceMismatch { account_nonce, tx_nonce: tx.nonce });
        }

        self.accounts[from_idx].balance -= tx.amount;
        self.accounts[to_idx].balance += tx.amount;
        self.accounts[from_idx].nonce += 1;

        let is_creation = tx.to.is_zero() && matches!(tx.data, TxData::Create { .. });
        if is_creation {
            if let TxData::Create { code, variables } = &tx.data {
                let deploy_address = tx.deploy_address();
                match contract::run(code, variables, tx.from, "constructor()") {
                    Ok(storage) => self.accounts.push(Account::new_contract(deploy_address, code.clone(), storage)),
                    Err(e) => log::warn!("contract constructor failed for {deploy_address}: {e}"),
                }
            }
        } else if self.accounts[to_idx].is_contract() {
            if let TxData::Call { call } = &tx.data {
                let code = self.accounts[to_idx].code.clone();
                let storage_before = self.accounts[to_idx].storage.clone();
                match contract::run(&code, &storage_before, tx.from, call) {
                    Ok(storage) => self.accounts[to_idx].storage = storage,
                    Err(e) => log::warn!("contract call to {} failed: {e}", tx.to),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use crate::address::Address;
    use crate::contract::Value;
    use crate::crypto::PrivateKey;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicBool;

    fn key(byte: u8) -> PrivateKey {
        let mut k = [0u8; 32];
        k[31] = byte;
        k
    }

    fn account0_key() -> PrivateKey {
        key(1)
    }

    fn account1_address(chain: &Chain) -> Address {
        chain.accounts[1].address
    }

    #[test]
    fn fresh_chain_plus_one_transfer() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let from = chain.accounts[0].address;
        let to = account1_address(&chain);
        let tx = Transaction::new_signed(&account0_key(), from, to, 100, 0, 1, TxData::Transfer {}).unwrap();
        chain.pending_txs.push(tx);

        let cancel = AtomicBool::new(false);
        assert!(chain.mine_next(&cancel).unwrap());

        let from_acc = chain.account(&from).unwrap();
        let to_acc = chain.account(&to).unwrap();
        assert_eq!(from_acc.balance, 0);
        assert_eq!(to_acc.balance, 100);
        assert_eq!(from_acc.nonce, 1);
        assert_eq!(chain.blocks.len(), 2);
    }

    #[test]
    fn bad_signature_is_skipped_but_block_still_appends() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let from = chain.accounts[0].address;
        let to = account1_address(&chain);
        let mut tx = Transaction::new_signed(&account0_key(), from, to, 100, 0, 1, TxData::Transfer {}).unwrap();
        tx.signature.0[0] ^= 0xFF;
        chain.pending_txs.push(tx);

        let cancel = AtomicBool::new(false);
        assert!(chain.mine_next(&cancel).unwrap());

        assert_eq!(chain.account(&from).unwrap().balance, 0);
        assert_eq!(chain.account(&to).unwrap().balance, 0);
        assert_eq!(chain.blocks.len(), 2);
    }

    #[test]
    fn nonce_mismatch_is_skipped() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let from = chain.accounts[0].address;
        let to = account1_address(&chain);
        let tx = Transaction::new_signed(&account0_key(), from, to, 100, 5, 1, TxData::Transfer {}).unwrap();
        chain.pending_txs.push(tx);

        let cancel = AtomicBool::new(false);
        chain.mine_next(&cancel).unwrap();

        assert_eq!(chain.account(&from).unwrap().balance, 0);
        assert_eq!(chain.account(&from).unwrap().nonce, 0);
    }

    #[test]
    fn contract_creation_then_call() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let from = chain.accounts[0].address;

        let mut variables = BTreeMap::new();
        variables.insert("a".to_string(), Value::Int(0));
        let code = "fn constructor() {\n}\nfn set_a(n) {\n  a = n + 1;\n}\n".to_string();
        let deploy_tx = Transaction::new_signed(
            &account0_key(),
            from,
            crate::address::ZERO_ADDRESS,
            0,
            0,
            1,
            TxData::Create { code: code.clone(), variables },
        )
        .unwrap();
        let deploy_address = deploy_tx.deploy_address();
        chain.pending_txs.push(deploy_tx);

        let cancel = AtomicBool::new(false);
        assert!(chain.mine_next(&cancel).unwrap());

        let deployed = chain.account(&deploy_address).expect("contract account created");
        assert!(deployed.is_contract());
        assert_eq!(deployed.storage.get("a"), Some(&Value::Int(0)));

        let call_tx = Transaction::new_signed(
            &account0_key(),
            from,
            deploy_address,
            0,
            1,
            1,
            TxData::Call { call: "set_a(5)".to_string() },
        )
        .unwrap();
        chain.pending_txs.push(call_tx);
        assert!(chain.mine_next(&cancel).unwrap());

        let deployed = chain.account(&deploy_address).unwrap();
        assert_eq!(deployed.storage.get("a"), Some(&Value::Int(6)));
    }

    #[test]
    fn conservation_holds_across_blocks() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let total_before = chain.total_balance();
        let from = chain.accounts[0].address;
        let to = account1_address(&chain);
        let tx = Transaction::new_signed(&account0_key(), from, to, 50, 0, 1, TxData::Transfer {}).unwrap();
        chain.pending_txs.push(tx);

        let cancel = AtomicBool::new(false);
        chain.mine_next(&cancel).unwrap();
        assert_eq!(chain.total_balance(), total_before);
    }

    #[test]
    fn mining_abandons_on_preemption_and_appends_peer_block_first() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let peer_block = Block::new_candidate(1, chain.tip().hash(), Vec::new());
        let cancel = AtomicBool::new(false);
        let mined_peer = peer_block.mine(&chain.difficulty, &cancel).unwrap();
        chain.new_blocks.push(mined_peer.clone());

        let flag = AtomicBool::new(true);
        assert!(!chain.mine_next(&flag).unwrap());
        chain.append_new_blocks();
        assert_eq!(chain.tip().hash(), mined_peer.hash());

        let flag = AtomicBool::new(false);
        assert!(chain.mine_next(&flag).unwrap());
        assert_eq!(chain.tip().number, 2);
        assert_eq!(chain.tip().prev_hash, mined_peer.hash());
    }

    #[test]
    fn peer_block_with_wrong_parent_is_dropped_not_fatal() {
        let mut chain = Chain::new_standalone(ChainParams::default()).unwrap();
        let bogus = Block::new_candidate(5, [9u8; 32], Vec::new());
        let cancel = AtomicBool::new(false);
        let mined = bogus.mine(&chain.difficulty, &cancel).unwrap();
        chain.new_blocks.push(mined);
        chain.append_new_blocks();
        assert_eq!(chain.blocks.len(), 1);
    }

    #[test]
    fn retarget_ratio_matches_expected_over_actual() {
        let params = ChainParams { difficulty: Difficulty::ONE, expected_block_time: 10, recalculate_every_x_blocks: 1 };
        let mut chain = Chain::new_standalone(params).unwrap();
        chain.xth_last_block_time = chain.tip().timestamp.saturating_sub(5);
        let cancel = AtomicBool::new(false);
        let before = chain.difficulty;
        chain.mine_next(&cancel).unwrap();
        assert_ne!(chain.difficulty, before);
    }
}
