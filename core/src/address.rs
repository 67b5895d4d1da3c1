//! 20-byte account identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 20-byte account identifier, displayed as `"0x"` followed by 40 lowercase
/// hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

/// Reserved sentinel address, the "to" field of contract-creation
/// transactions. No private key can derive it.
pub const ZERO_ADDRESS: Address = Address([0u8; 20]);

#[derive(Debug, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must be \"0x\" followed by 40 hex characters, got {0:?}")]
    BadFormat(String),
}

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == ZERO_ADDRESS
    }

    /// First 5 and last 3 characters of the hex address, joined with `"..."`.
    /// Display-only; not consensus-relevant (see `read-balance`'s use in
    /// `original_source/read_balance.py`).
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..5], &full[full.len() - 3..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .ok_or_else(|| AddressParseError::BadFormat(s.to_string()))?;
        if hex_part.len() != 40 {
            return Err(AddressParseError::BadFormat(s.to_string()));
        }
        let decoded = hex::decode(hex_part).map_err(|_| AddressParseError::BadFormat(s.to_string()))?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&decoded);
        Ok(Address(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_address_renders_as_forty_zeros() {
        assert_eq!(ZERO_ADDRESS.to_string(), format!("0x{}", "0".repeat(40)));
    }

    #[test]
    fn round_trips_through_string() {
        let a: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        assert_eq!(a.to_string(), "0x0000000000000000000000000000000000000001");
    }

    #[test]
    fn rejects_bad_format() {
        assert!("not-an-address".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
    }
}
