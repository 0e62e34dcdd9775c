//! Top-level error type shared across crates.

use thiserror::Error;

/// Errors raised while decoding or validating fundamental types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("unknown {kind} code: {code:?}")]
    UnknownCode { kind: &'static str, code: String },

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid chain key: {0}")]
    InvalidChainKey(String),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),
}
