//! Repository contracts for the relayer.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The scheduler and pipeline depend only on the traits, never on a
//! concrete backend.

pub mod blockchain;
pub mod error;
pub mod message;
pub mod schedule;
pub mod session;

pub use blockchain::{BlockchainStore, DeployUpdate};
pub use error::StoreError;
pub use message::{CrossChainMessageStore, ProvedUcp, SdpCommitUpdate};
pub use schedule::{ScheduleStore, DISPATCH_LOCK};
pub use session::SessionLocks;

/// Everything the relayer needs from shared durable state.
pub trait RelayerStore:
    BlockchainStore + ScheduleStore + CrossChainMessageStore + Send + Sync
{
}

impl<T> RelayerStore for T where
    T: BlockchainStore + ScheduleStore + CrossChainMessageStore + Send + Sync
{
}
