//! Scheduling records: task kinds, leases and node liveness.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChainKey, NodeId, Timestamp};

code_enum! {
    /// The six independently scheduled kinds of per-blockchain work.
    pub enum TaskType {
        /// Block sync: read incoming cross-chain messages.
        Anchor => "ANCHOR_TASK",
        /// Submit pending SDP messages to the destination chain.
        Commit => "COMMIT_TASK",
        /// Validate pending UCP/AM rows and extract SDP messages.
        Process => "PROCESS_TASK",
        /// Query receipts of submitted SDP messages.
        Confirm => "AM_CONFIRM_TASK",
        /// Move terminal rows to the archive.
        Archive => "ARCHIVE_TASK",
        /// Advance bridging-contract deployment.
        Deploy => "DEPLOY_SERVICE_TASK",
    }
}

/// Which duty loop feeds a task kind to its executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    /// Message-pipeline work, fed by the Duty loop.
    Blockchain,
    /// Chain lifecycle work, fed by the BizDuty loop.
    Biz,
}

impl TaskType {
    pub fn category(&self) -> TaskCategory {
        match self {
            Self::Deploy => TaskCategory::Biz,
            _ => TaskCategory::Blockchain,
        }
    }
}

/// Unique key of a lease: one task kind on one blockchain.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub task_type: TaskType,
    pub chain: ChainKey,
}

impl TaskKey {
    pub fn new(task_type: TaskType, chain: ChainKey) -> Self {
        Self { task_type, chain }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.task_type, self.chain)
    }
}

/// A time-sliced lease of one task kind on one blockchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedTask {
    pub task_type: TaskType,
    pub chain: ChainKey,
    /// Current owner; `None` until first assigned.
    pub node_id: Option<NodeId>,
    pub start_time: Timestamp,
    pub time_slice_ms: u64,
}

impl DistributedTask {
    /// A lease that has never been assigned. It is expired from the start.
    pub fn unassigned(task_type: TaskType, chain: ChainKey, time_slice_ms: u64) -> Self {
        Self {
            task_type,
            chain,
            node_id: None,
            start_time: Timestamp::EPOCH,
            time_slice_ms,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.task_type, self.chain.clone())
    }

    /// A lease is eligible for reassignment once `now - start_time >= time_slice`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.start_time.has_expired(self.time_slice_ms, now)
    }

    pub fn is_owned_by(&self, node: &NodeId) -> bool {
        self.node_id.as_ref() == Some(node)
    }

    pub fn assign(&mut self, node: NodeId, now: Timestamp) {
        self.node_id = Some(node);
        self.start_time = now;
    }
}

/// Liveness record of a relayer node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveNode {
    pub node_id: NodeId,
    pub node_ip: Option<String>,
    pub last_active: Timestamp,
}

impl ActiveNode {
    /// Online while the heartbeat age is strictly below the TTL.
    pub fn is_online(&self, now: Timestamp, ttl_ms: u64) -> bool {
        self.last_active.elapsed_since(now) < ttl_ms
    }
}
