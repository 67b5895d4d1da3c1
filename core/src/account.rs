//! Accounts (spec §3): externally-owned or contract, unified in one record.

use crate::address::Address;
use crate::contract::Value;
use crate::crypto::{self, PrivateKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    /// Present only for locally held externally-owned accounts.
    #[serde(with = "crypto::private_key_hex")]
    pub private_key: Option<PrivateKey>,
    pub nonce: u64,
    pub balance: u64,
    /// Empty for externally-owned accounts, non-empty source text for
    /// contracts.
    pub code: String,
    pub storage: BTreeMap<String, Value>,
}

impl Account {
    /// Builds an externally-owned account, deriving its address from
    /// `private_key`.
    pub fn new_eoa(private_key: PrivateKey, balance: u64) -> Result<Self, crypto::CryptoError> {
        let address = crypto::derive_address(&private_key)?;
        Ok(Account {
            address,
            private_key: Some(private_key),
            nonce: 0,
            balance,
            code: String::new(),
            storage: BTreeMap::new(),
        })
    }

    /// Builds the reserved zero-address account (no owning key).
    pub fn new_zero() -> Self {
        Account {
            address: crate::address::ZERO_ADDRESS,
            private_key: None,
            nonce: 0,
            balance: 0,
            code: String::new(),
            storage: BTreeMap::new(),
        }
    }

    /// Builds a freshly deployed contract account.
    pub fn new_contract(address: Address, code: String, storage: BTreeMap<String, Value>) -> Self {
        Account {
            address,
            private_key: None,
            nonce: 0,
            balance: 0,
            code,
            storage,
        }
    }

    pub fn is_contract(&self) -> bool {
        !self.code.is_empty()
    }

    /// Display-only identity (spec §3, used by `read-balance`).
    pub fn short_address(&self) -> String {
        self.address.short()
    }
}

/// Three seeded externally-owned accounts plus the zero address, in the
/// order spec §6 fixes: private keys `0x0…01`, `0x0…02`, `0x0…03`.
pub fn generate_genesis_accounts() -> Result<Vec<Account>, crypto::CryptoError> {
    let mut accounts = Vec::with_capacity(4);
    for i in 1..=3u8 {
        let mut key: PrivateKey = [0u8; 32];
        key[31] = i;
        accounts.push(Account::new_eoa(key, 0)?);
    }
    accounts.push(Account::new_zero());
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_accounts_are_three_eoas_plus_zero_address() {
        let accounts = generate_genesis_accounts().unwrap();
        assert_eq!(accounts.len(), 4);
        assert!(accounts[..3].iter().all(|a| a.private_key.is_some()));
        assert!(accounts[3].address.is_zero());
        assert!(accounts[3].private_key.is_none());
    }

    #[test]
    fn contract_account_has_no_private_key() {
        let contract = Account::new_contract(crate::address::ZERO_ADDRESS, "fn f() {}".into(), BTreeMap::new());
        assert!(contract.private_key.is_none());
        assert!(contract.is_contract());
    }
}
