use thiserror::Error;
use xrelay_chain::ChainError;
use xrelay_store::StoreError;
use xrelay_types::TypesError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Types(#[from] TypesError),

    #[error("config error: {0}")]
    Config(String),

    /// No usable identity could be derived for this node.
    #[error("node identity error: {0}")]
    Identity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A message was decoded but failed provenance or trust checks.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// A message could not be decoded.
    #[error("illegal message: {0}")]
    IllegalMessage(String),

    /// A back-reference or counter that should hold did not.
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("blockchain not managed: {0}")]
    UnknownBlockchain(String),

    #[error("shutdown timeout")]
    ShutdownTimeout,

    #[error("{0}")]
    Other(String),
}

impl NodeError {
    /// Stable operator-facing code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Store(StoreError::InvalidTransition { .. }) => "XR-2002",
            Self::Store(StoreError::NotFound(_)) => "XR-2003",
            Self::Store(_) => "XR-2001",
            Self::Chain(ChainError::Envelope(_)) => "XR-3002",
            Self::Chain(ChainError::Codec(_)) => "XR-3003",
            Self::Chain(_) => "XR-3001",
            Self::Types(_) => "XR-1001",
            Self::Config(_) => "XR-0001",
            Self::Identity(_) => "XR-0002",
            Self::Io(_) => "XR-0003",
            Self::Rejected(_) => "XR-4001",
            Self::IllegalMessage(_) => "XR-4002",
            Self::DataIntegrity(_) => "XR-4003",
            Self::UnknownBlockchain(_) => "XR-4004",
            Self::ShutdownTimeout => "XR-0004",
            Self::Other(_) => "XR-9999",
        }
    }
}
