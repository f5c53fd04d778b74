//! Account, balance and block primitives.
//!
//! Values travel to and from upstream nodes as JSON-RPC quantities
//! (`0x`-prefixed hex without leading zeros) and account addresses
//! (`0x` + 40 hex digits).

use std::fmt;
use std::str::FromStr;

use primitive_types::U256;
use thiserror::Error;

/// Errors from parsing an account address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address has {0} hex digits, at most 40 allowed")]
    TooLong(usize),

    #[error("address contains non-hex characters: {0}")]
    InvalidHex(String),
}

/// Errors from parsing a JSON-RPC quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is missing the 0x prefix: {0}")]
    MissingPrefix(String),

    #[error("invalid hex quantity: {0}")]
    InvalidHex(String),
}

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Accepts an optional `0x` prefix and up to 40 hex digits. Shorter
    /// inputs are left-padded with zeros.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.is_empty() {
            return Err(AddressError::Empty);
        }
        if digits.len() > 40 {
            return Err(AddressError::TooLong(digits.len()));
        }

        let padded = format!("{digits:0>40}");
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Block at which a state query is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockRef {
    #[default]
    Latest,
    Number(u64),
}

impl BlockRef {
    /// JSON-RPC block parameter (`"latest"` or a hex quantity).
    pub fn to_rpc_param(&self) -> String {
        match self {
            BlockRef::Latest => "latest".to_string(),
            BlockRef::Number(n) => format!("{n:#x}"),
        }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Latest => f.write_str("latest"),
            BlockRef::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Accepts `latest`, a decimal block number, or a `0x` hex quantity.
impl FromStr for BlockRef {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(BlockRef::Latest);
        }
        if s.starts_with("0x") {
            return parse_quantity(s).map(BlockRef::Number);
        }
        s.parse::<u64>()
            .map(BlockRef::Number)
            .map_err(|_| QuantityError::InvalidHex(s.to_string()))
    }
}

/// An account balance in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Wei(U256);

impl Wei {
    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    /// Parse a JSON-RPC hex quantity such as `"0x1bc16d674ec80000"`.
    pub fn from_quantity(s: &str) -> Result<Self, QuantityError> {
        let digits = quantity_digits(s)?;
        U256::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| QuantityError::InvalidHex(s.to_string()))
    }
}

impl From<u64> for Wei {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a JSON-RPC hex quantity into a `u64` (block numbers).
pub fn parse_quantity(s: &str) -> Result<u64, QuantityError> {
    let digits = quantity_digits(s)?;
    u64::from_str_radix(digits, 16).map_err(|_| QuantityError::InvalidHex(s.to_string()))
}

fn quantity_digits(s: &str) -> Result<&str, QuantityError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| QuantityError::MissingPrefix(s.to_string()))?;
    if digits.is_empty() {
        return Err(QuantityError::InvalidHex(s.to_string()));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_full_length() {
        let addr: Address = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".parse().unwrap();
        assert_eq!(addr.to_string(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn address_short_is_left_padded() {
        let addr: Address = "0x1".parse().unwrap();
        assert_eq!(addr.as_bytes()[19], 1);
        assert!(addr.as_bytes()[..19].iter().all(|b| *b == 0));
    }

    #[test]
    fn address_without_prefix() {
        let addr: Address = "ff".parse().unwrap();
        assert_eq!(addr.as_bytes()[19], 0xff);
    }

    #[test]
    fn address_rejects_bad_input() {
        assert_eq!("".parse::<Address>(), Err(AddressError::Empty));
        assert_eq!("0x".parse::<Address>(), Err(AddressError::Empty));
        assert!(matches!("0xzz".parse::<Address>(), Err(AddressError::InvalidHex(_))));
        let long = format!("0x{}", "1".repeat(41));
        assert_eq!(long.parse::<Address>(), Err(AddressError::TooLong(41)));
    }

    #[test]
    fn block_ref_params() {
        assert_eq!(BlockRef::Latest.to_rpc_param(), "latest");
        assert_eq!(BlockRef::Number(255).to_rpc_param(), "0xff");
        assert_eq!(BlockRef::default(), BlockRef::Latest);
    }

    #[test]
    fn block_ref_from_str() {
        assert_eq!("latest".parse::<BlockRef>().unwrap(), BlockRef::Latest);
        assert_eq!("LATEST".parse::<BlockRef>().unwrap(), BlockRef::Latest);
        assert_eq!("1024".parse::<BlockRef>().unwrap(), BlockRef::Number(1024));
        assert_eq!("0x400".parse::<BlockRef>().unwrap(), BlockRef::Number(1024));
        assert!("pending".parse::<BlockRef>().is_err());
        assert!("-1".parse::<BlockRef>().is_err());
    }

    #[test]
    fn wei_parses_large_quantities() {
        // 1 ETH
        let wei = Wei::from_quantity("0xde0b6b3a7640000").unwrap();
        assert_eq!(wei.to_string(), "1000000000000000000");

        // Larger than u128.
        let big = Wei::from_quantity(&format!("0x1{}", "0".repeat(40))).unwrap();
        assert!(big.value() > U256::from(u128::MAX));
    }

    #[test]
    fn wei_rejects_missing_prefix() {
        assert!(matches!(Wei::from_quantity("10"), Err(QuantityError::MissingPrefix(_))));
        assert!(matches!(Wei::from_quantity("0x"), Err(QuantityError::InvalidHex(_))));
    }

    #[test]
    fn quantity_to_u64() {
        assert_eq!(parse_quantity("0x0"), Ok(0));
        assert_eq!(parse_quantity("0x12a05f200"), Ok(5_000_000_000));
        assert!(parse_quantity("0xnope").is_err());
    }
}
