//! Fundamental types for the xrelay cross-chain relayer.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! timestamps, chain and node identifiers, scheduling leases, blockchain metadata,
//! and the message-pool records (AM, SDP, UCP) together with their state machines.

#[macro_use]
mod codes;

pub mod blockchain;
pub mod error;
pub mod ids;
pub mod message;
pub mod state;
pub mod task;
pub mod time;

pub use blockchain::{BlockchainMeta, BlockchainProperties, BlockchainState, DeployStatus};
pub use error::TypesError;
pub use ids::{ChainKey, CrossChainDomain, Identity, NodeId, MAX_DOMAIN_LEN};
pub use message::{
    AuthMsgWrapper, LedgerInfo, SdpMsgCommitResult, SdpMsgWrapper, UniformCrosschainPacketContext,
    UNORDERED_SEQUENCE,
};
pub use state::{
    AuthMsgProcessState, AuthMsgTrustLevel, PluginServerState, SdpMsgProcessState,
    UcpProcessState, UpperProtocolType,
};
pub use task::{ActiveNode, DistributedTask, TaskCategory, TaskKey, TaskType};
pub use time::Timestamp;
