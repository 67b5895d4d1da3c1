//! Chain Core Library
//!
//! Account-model chain state machine: crypto primitives, addresses,
//! accounts, transactions, blocks, the chain itself, the contract sandbox,
//! and the ambient config/error/snapshot types every node is built from.

pub mod account;
pub mod address;
pub mod block;
pub mod chain;
pub mod config;
pub mod contract;
pub mod crypto;
pub mod error;
pub mod pow;
pub mod snapshot;
pub mod transaction;

pub use account::Account;
pub use address::Address;
pub use block::Block;
pub use chain::{Chain, ChainParams};
pub use config::Config;
pub use error::{ChainError, ChainResult, TxError};
pub use transaction::{Transaction, TxData};
