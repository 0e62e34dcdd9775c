//! Identifiers: relayer nodes, managed chains, cross-chain domains and
//! contract identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Maximum length of a cross-chain domain name in bytes.
pub const MAX_DOMAIN_LEN: usize = 128;

/// Identifier of one relayer process.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A managed blockchain, addressed by `(product, blockchain_id)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainKey {
    /// Chain type handled by a bridging plugin, e.g. `"ethereum"`.
    pub product: String,
    /// Instance of that chain type, e.g. `"eth-mainnet"`.
    pub blockchain_id: String,
}

impl ChainKey {
    pub fn new(product: impl Into<String>, blockchain_id: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            blockchain_id: blockchain_id.into(),
        }
    }

    /// Parse the `product:blockchain_id` form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        match s.split_once(':') {
            Some((product, id)) if !product.is_empty() && !id.is_empty() => {
                Ok(Self::new(product, id))
            }
            _ => Err(TypesError::InvalidChainKey(s.to_string())),
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.product, self.blockchain_id)
    }
}

/// Globally unique cross-chain name of a blockchain.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrossChainDomain(String);

impl CrossChainDomain {
    pub fn new(domain: impl Into<String>) -> Result<Self, TypesError> {
        let domain = domain.into();
        if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
            return Err(TypesError::InvalidDomain(domain));
        }
        Ok(Self(domain))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CrossChainDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 32-byte identity of a contract or account on some chain.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity([u8; 32]);

impl Identity {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TypesError::InvalidIdentity(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| TypesError::InvalidIdentity(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
