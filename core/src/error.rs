//! Error types for the chain core crate.
//!
//! Three regimes, matching the three failure classes the consensus design
//! distinguishes: a failing transaction is logged and skipped without
//! aborting the block ([`TxError`]); a structurally invalid block is a typed,
//! non-panicking failure returned to the caller ([`ChainError`]); unexpected
//! peer messages are handled by `chain-network`'s own error type.

use thiserror::Error;

/// Fault in a single transaction during block execution. Always non-fatal:
/// the transaction is skipped and the block still commits.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TxError {
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("signature verification failed")]
    BadSignature,

    #[error("nonce mismatch: account nonce {account_nonce}, tx nonce {tx_nonce}")]
    NonceMismatch { account_nonce: u64, tx_nonce: u64 },
}

/// Fault in a block or chain operation. Fatal to the operation: the caller
/// must not append the block, but the node keeps running.
#[derive(Debug, Error, Clone)]
pub enum ChainError {
    #[error("block hash does not meet difficulty target")]
    DifficultyNotMet,

    #[error("block number {got} is not one greater than tip {tip}")]
    NonSequentialNumber { got: u64, tip: u64 },

    #[error("block prev_hash does not match tip hash")]
    PrevHashMismatch,

    #[error("block timestamp {got} precedes tip timestamp {tip}")]
    TimestampRegression { got: u64, tip: u64 },

    #[error("contract execution failed: {0}")]
    Contract(#[from] crate::contract::ContractError),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("crypto operation failed: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
}

pub type ChainResult<T> = core::result::Result<T, ChainError>;
