//! Transactions (spec §3, §4.2): signed value/data transfer records.

use crate::address::Address;
use crate::contract::Value;
use crate::crypto::{self, PrivateKey, Sig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The structured `data` payload. `#[serde(untagged)]` lets each shape
/// round-trip as the bare JSON object spec §3 describes (`{}`,
/// `{code,variables}`, `{call}`) instead of a tagged enum wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TxData {
    Create { code: String, variables: BTreeMap<String, Value> },
    Call { call: String },
    Transfer {},
}

impl TxData {
    pub fn is_empty(&self) -> bool {
        matches!(self, TxData::Transfer {})
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub nonce: u64,
    pub gas_price: u64,
    pub data: TxData,
    pub signature: Sig,
}

impl Transaction {
    /// The canonical signed/hashed message (spec §3):
    /// `from‖to‖"("amount")("nonce")("gas_price")("data_json")"`.
    pub fn canonical_message(from: &Address, to: &Address, amount: u64, nonce: u64, gas_price: u64, data: &TxData) -> Vec<u8> {
        let data_json = serde_json::to_string(data).expect("TxData always serializes");
        format!("{from}{to}({amount})({nonce})({gas_price})({data_json})").into_bytes()
    }

    /// Builds and signs a transaction from `private_key`, mirroring
    /// `Account::send_transaction` in `original_source/account/account.py`.
    pub fn new_signed(
        private_key: &PrivateKey,
        from: Address,
        to: Address,
        amount: u64,
        nonce: u64,
        gas_price: u64,
        data: TxData,
    ) -> Result<Self, crypto::CryptoError> {
        let message = Self::canonical_message(&from, &to, amount, nonce, gas_price, &data);
        let signature = crypto::sign(private_key, &message)?;
        Ok(Transaction { from, to, amount, nonce, gas_price, data, signature })
    }

    /// Recomputes the canonical message, recovers the signer, and returns
    /// `true` iff it equals `from`. Any failure — malformed signature,
    /// recovery error, mismatch — returns `false` (spec §4.2: never throws
    /// past the transaction boundary).
    pub fn verify_signature(&self) -> bool {
        let message = Self::canonical_message(&self.from, &self.to, self.amount, self.nonce, self.gas_price, &self.data);
        match crypto::recover(&self.signature, &message) {
            Ok(recovered) => recovered == self.from,
            Err(_) => false,
        }
    }

    /// `sha256` of the canonical message, used by block hashing — not by
    /// signature verification (spec §4.2).
    pub fn tx_hash(&self) -> String {
        let message = Self::canonical_message(&self.from, &self.to, self.amount, self.nonce, self.gas_price, &self.data);
        hex::encode(crypto::sha256(&message))
    }

    /// Address the contract deployed by this transaction would live at,
    /// computed per spec §4.4 step 6. Only meaningful when `to` is the zero
    /// address and `data` is a `Create` payload.
    pub fn deploy_address(&self) -> Address {
        let seed = format!("{}{}", self.from, self.nonce);
        let digest = crypto::sha256(seed.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ZERO_ADDRESS;

    fn key(byte: u8) -> PrivateKey {
        let mut k = [0u8; 32];
        k[31] = byte;
        k
    }

    #[test]
    fn signed_transaction_verifies() {
        let pk = key(1);
        let from = crypto::derive_address(&pk).unwrap();
        let to = crypto::derive_address(&key(2)).unwrap();
        let tx = Transaction::new_signed(&pk, from, to, 100, 0, 1, TxData::Transfer {}).unwrap();
        assert!(tx.verify_signature());
    }

    #[test]
    fn flipping_any_field_breaks_verification() {
        let pk = key(3);
        let from = crypto::derive_address(&pk).unwrap();
        let to = crypto::derive_address(&key(4)).unwrap();
        let tx = Transaction::new_signed(&pk, from, to, 100, 0, 1, TxData::Transfer {}).unwrap();

        let mut bad_amount = tx.clone();
        bad_amount.amount += 1;
        assert!(!bad_amount.verify_signature());

        let mut bad_nonce = tx.clone();
        bad_nonce.nonce += 1;
        assert!(!bad_nonce.verify_signature());

        let mut bad_to = tx.clone();
        bad_to.to = ZERO_ADDRESS;
        assert!(!bad_to.verify_signature());

        let mut bad_gas = tx.clone();
        bad_gas.gas_price += 1;
        assert!(!bad_gas.verify_signature());

        let mut bad_sig = tx.clone();
        bad_sig.signature.0[0] ^= 0xFF;
        assert!(!bad_sig.verify_signature());
    }

    #[test]
    fn tx_hash_is_stable_and_differs_by_content() {
        let pk = key(5);
        let from = crypto::derive_address(&pk).unwrap();
        let to = crypto::derive_address(&key(6)).unwrap();
        let a = Transaction::new_signed(&pk, from, to, 10, 0, 1, TxData::Transfer {}).unwrap();
        let b = Transaction::new_signed(&pk, from, to, 20, 0, 1, TxData::Transfer {}).unwrap();
        assert_eq!(a.tx_hash(), a.tx_hash());
        assert_ne!(a.tx_hash(), b.tx_hash());
    }
}
