use thiserror::Error;
use xrelay_types::{ChainKey, TypesError};

#[derive(Debug, Error)]
pub enum ChainError {
    /// Transport-level failure talking to a plugin server.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The plugin server answered with an error.
    #[error("plugin error on {method}: {message}")]
    Plugin { method: String, message: String },

    #[error("plugin server not found: {0}")]
    PluginServerNotFound(String),

    #[error("no chain client for {0}")]
    ClientNotFound(ChainKey),

    #[error("malformed plugin response: {0}")]
    BadResponse(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Types(#[from] TypesError),
}

/// Binary decode failures of AuthMessage / SDP message / proof bundles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{what}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        need: usize,
        have: usize,
    },

    #[error("unsupported {kind} version {version}")]
    UnsupportedVersion { kind: &'static str, version: u32 },

    #[error("unknown trust level {0}")]
    UnknownTrustLevel(u8),

    #[error("unknown upper protocol {0}")]
    UnknownProtocol(u32),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// Structural failures of the fixed-layout relay envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope too short: {len} bytes, header needs {min}")]
    TooShort { len: usize, min: usize },

    #[error("sender domain length {0} out of range")]
    DomainLength(usize),

    #[error("sender domain is not utf-8")]
    DomainEncoding,
}
