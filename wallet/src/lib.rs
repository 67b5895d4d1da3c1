//! Wallet key management (spec §6, §9): seeded genesis keypairs and
//! signed-transaction construction for the CLI's `send` subcommand and for
//! tests.
//!
//! Key generation proper — a fresh, non-seeded keypair for a new
//! externally-owned account — is carried too, since it's this crate's
//! ambient responsibility; the wallet/key-generation *UI* around it is
//! what spec §1 scopes out, not the derivation itself.

use chain_core::account;
use chain_core::address::Address;
use chain_core::crypto::{self, CryptoError, PrivateKey};
use chain_core::transaction::{Transaction, TxData};
use rand::RngCore;

/// The three seeded genesis private keys (spec §6: `0x0…01`, `0x0…02`,
/// `0x0…03`) and their derived addresses, in the same order
/// `chain_core::account::generate_genesis_accounts` seeds the chain.
pub struct Wallet {
    keys: Vec<PrivateKey>,
    addresses: Vec<Address>,
}

impl Wallet {
    /// Rebuilds the wallet over the deterministic genesis keys. Does not
    /// touch the zero address: it has no owning key (spec §3).
    pub fn from_seed() -> Result<Self, CryptoError> {
        let mut keys = Vec::with_capacity(3);
        let mut addresses = Vec::with_capacity(3);
        for i in 1..=3u8 {
            let mut key: PrivateKey = [0u8; 32];
            key[31] = i;
            let address = crypto::derive_address(&key)?;
            keys.push(key);
            addresses.push(address);
        }
        Ok(Wallet { keys, addresses })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn address(&self, index: usize) -> Option<Address> {
        self.addresses.get(index).copied()
    }

    pub fn private_key(&self, index: usize) -> Option<&PrivateKey> {
        self.keys.get(index)
    }

    /// Builds and signs a transaction from the seeded account at `index`,
    /// mirroring `Account.send_transaction` in
    /// `original_source/client.py`. `nonce` and `to` are supplied by the
    /// caller from synced chain state, not tracked here — the wallet holds
    /// keys, not account state.
    pub fn build_transaction(
        &self,
        index: usize,
        to: Address,
        amount: u64,
        nonce: u64,
        gas_price: u64,
        data: TxData,
    ) -> Result<Transaction, CryptoError> {
        let key = self.private_key(index).ok_or(CryptoError::InvalidPrivateKey)?;
        let from = self.addresses[index];
        Transaction::new_signed(key, from, to, amount, nonce, gas_price, data)
    }
}

/// Generates a fresh, non-seeded private key. Exists so the crate covers
/// the "key generation" half of its responsibility even though no CLI
/// subcommand currently exposes it (spec §1 scopes out a key-generation
/// UI, not key generation itself).
pub fn generate_private_key() -> PrivateKey {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_core::address::ZERO_ADDRESS;

    #[test]
    fn seeded_wallet_addresses_match_genesis_accounts() {
        let wallet = Wallet::from_seed().unwrap();
        let genesis = account::generate_genesis_accounts().unwrap();
        for i in 0..3 {
            assert_eq!(wallet.address(i), Some(genesis[i].address));
        }
    }

    #[test]
    fn build_transaction_verifies() {
        let wallet = Wallet::from_seed().unwrap();
        let to = wallet.address(1).unwrap();
        let tx = wallet.build_transaction(0, to, 10, 0, 1, TxData::Transfer {}).unwrap();
        assert!(tx.verify_signature());
    }

    #[test]
    fn generated_private_keys_differ() {
        let a = generate_private_key();
        let b = generate_private_key();
        assert_ne!(a, b);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let wallet = Wallet::from_seed().unwrap();
        assert!(wallet.build_transaction(9, ZERO_ADDRESS, 1, 0, 1, TxData::Transfer {}).is_err());
    }
}
