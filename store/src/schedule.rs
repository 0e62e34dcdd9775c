//! Lease table, liveness records and the dispatch lock.

use crate::StoreError;
use xrelay_types::{ActiveNode, ChainKey, DistributedTask, NodeId, Timestamp};

/// Name of the shared lock guarding one dispatch cycle.
pub const DISPATCH_LOCK: &str = "dispatch";

/// Scheduling state shared by every relayer node.
///
/// Leases are keyed by `(task_type, chain)`; saving a lease whose key already
/// exists replaces it, so the table never holds two leases for one key.
pub trait ScheduleStore {
    /// Non-blocking lock acquisition. Succeeds when the lock is free, already
    /// held by `holder`, or was last taken at least `ttl_ms` ago.
    fn try_acquire_dispatch_lock(
        &self,
        holder: &NodeId,
        now: Timestamp,
        ttl_ms: u64,
    ) -> Result<bool, StoreError>;

    /// Release the lock if `holder` owns it; otherwise a no-op.
    fn release_dispatch_lock(&self, holder: &NodeId) -> Result<(), StoreError>;

    fn get_all_distributed_tasks(&self) -> Result<Vec<DistributedTask>, StoreError>;

    fn get_distributed_tasks_by_node(
        &self,
        node: &NodeId,
    ) -> Result<Vec<DistributedTask>, StoreError> {
        Ok(self
            .get_all_distributed_tasks()?
            .into_iter()
            .filter(|task| task.is_owned_by(node))
            .collect())
    }

    /// Upsert a batch of leases atomically.
    fn save_distributed_tasks(&self, tasks: &[DistributedTask]) -> Result<(), StoreError>;

    /// Remove every lease of `chain`. Returns the number removed.
    fn remove_distributed_tasks(&self, chain: &ChainKey) -> Result<usize, StoreError>;

    /// Insert or refresh a liveness record.
    fn activate_node(&self, node: &ActiveNode) -> Result<(), StoreError>;

    fn get_all_active_nodes(&self) -> Result<Vec<ActiveNode>, StoreError>;
}
