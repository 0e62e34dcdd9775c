//! xrelay relayer node: the distributed task scheduler and the cross-chain
//! message pipeline it drives.
//!
//! Every node in a cluster shares one store and runs the same five timer
//! loops:
//! - Activator heartbeats this node
//! - Dispatcher hands out time-sliced leases under a cluster-wide lock
//! - Duty and BizDuty feed this node's leases to per-kind executors
//! - Cleaner releases resources of stopped chains
//!
//! The executors run the pipeline services: anchor (block sync), process
//! (validation and SDP extraction), commit, confirm, archive and deploy.

pub mod activator;
pub mod anchor;
pub mod archive;
pub mod cleaner;
pub mod committer;
pub mod config;
pub mod confirm;
pub mod context;
pub mod deploy;
pub mod dispatcher;
pub mod duty;
pub mod engine;
pub mod error;
pub mod executor;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod process;
pub mod receiver;
pub mod relayer;
pub mod shutdown;
pub mod supervisor;
pub mod tracing_spans;
pub mod validator;

pub use activator::Activator;
pub use anchor::AnchorService;
pub use archive::{ArchiveService, ArchiveSummary};
pub use cleaner::Cleaner;
pub use committer::{CommitSummary, Committer};
pub use config::{ExecutorConfig, NodeConfig, PipelineConfig, PluginServerConfig, ScheduleConfig};
pub use confirm::{ConfirmService, ConfirmSummary};
pub use context::PipelineContext;
pub use deploy::DeployService;
pub use dispatcher::{plan_assignments, DispatchOutcome, Dispatcher};
pub use duty::Duty;
pub use engine::DistributedTaskEngine;
pub use error::NodeError;
pub use executor::{BlockchainTask, ExecuteOutcome, TaskExecutor, TaskExecutors};
pub use identity::{resolve_identity, NodeIdentity};
pub use logging::{init_logging, LogFormat};
pub use metrics::RelayerMetrics;
pub use process::{ProcessService, ProcessSummary, SdpExtractor};
pub use receiver::{LastSeen, OffChainAccepted, Receiver};
pub use relayer::{Relayer, RelayerDeps};
pub use shutdown::{StopListener, StopReason, StopSignal};
pub use supervisor::{supervise, Supervised};
pub use validator::{
    decode_message, DecodedMessage, DomainRegistryVerifier, MessageValidator, Provenance,
    ProvenanceVerifier, Verdict,
};
