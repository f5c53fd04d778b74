//! ethproxy-types — primitive types shared across eth-proxy crates.
//!
//! Holds the account/balance/block primitives exchanged with upstream
//! JSON-RPC nodes and the on-disk configuration file format.

pub mod config;
pub mod primitives;

pub use config::{ConfigError, ProxyFileConfig, parse_duration};
pub use primitives::{Address, AddressError, BlockRef, QuantityError, Wei, parse_quantity};
