//! Lease assignment across the live nodes of the cluster.
//!
//! Whichever node wins the dispatch lock on a tick expands every eligible
//! blockchain into one lease per task kind, keeps the leases whose time slice
//! is still running, and deals the rest round-robin over the online nodes.
//! Losing the lock is not an error: another node dispatches this tick.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use xrelay_chain::PluginRegistry;
use xrelay_store::{BlockchainStore, RelayerStore, ScheduleStore};
use xrelay_types::{BlockchainState, ChainKey, DistributedTask, NodeId, TaskKey, TaskType, Timestamp};
use xrelay_utils::{shuffle_with, Clock, Shuffler};

use crate::config::ScheduleConfig;
use crate::tracing_spans::dispatch_span;
use crate::{NodeError, RelayerMetrics};

/// Result of one dispatch tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Another node holds the dispatch lock.
    LockBusy,
    /// No node is online; leases were left untouched.
    NoOnlineNodes,
    /// Leases (re)assigned this cycle.
    Dispatched { assigned: usize },
}

/// Compute the leases to persist this cycle.
///
/// Every `(kind, chain)` key of `eligible` that has no lease yet, or whose
/// lease expired at `now`, is assigned: tasks and nodes are both shuffled and
/// task `i` goes to node `i mod N` with `start_time = now`. Live leases are
/// left alone. With no online nodes nothing is returned.
pub fn plan_assignments(
    eligible: &[ChainKey],
    existing: Vec<DistributedTask>,
    online: Vec<NodeId>,
    now: Timestamp,
    time_slice_ms: u64,
    shuffler: &dyn Shuffler,
) -> Vec<DistributedTask> {
    if online.is_empty() {
        return Vec::new();
    }
    let mut existing: HashMap<TaskKey, DistributedTask> =
        existing.into_iter().map(|task| (task.key(), task)).collect();

    let mut pending = Vec::new();
    for chain in eligible {
        for task_type in TaskType::ALL {
            let key = TaskKey::new(*task_type, chain.clone());
            match existing.remove(&key) {
                Some(task) if !task.is_expired(now) => {}
                Some(mut task) => {
                    task.time_slice_ms = time_slice_ms;
                    pending.push(task);
                }
                None => pending.push(DistributedTask::unassigned(*task_type, chain.clone(), time_slice_ms)),
            }
        }
    }

    let nodes = shuffle_with(shuffler, online);
    let mut tasks = shuffle_with(shuffler, pending);
    for (i, task) in tasks.iter_mut().enumerate() {
        task.assign(nodes[i % nodes.len()].clone(), now);
    }
    tasks
}

pub struct Dispatcher {
    store: Arc<dyn RelayerStore>,
    plugins: Arc<dyn PluginRegistry>,
    clock: Arc<dyn Clock>,
    shuffler: Arc<dyn Shuffler>,
    node_id: NodeId,
    schedule: ScheduleConfig,
    metrics: Arc<RelayerMetrics>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn RelayerStore>,
        plugins: Arc<dyn PluginRegistry>,
        clock: Arc<dyn Clock>,
        shuffler: Arc<dyn Shuffler>,
        node_id: NodeId,
        schedule: ScheduleConfig,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self {
            store,
            plugins,
            clock,
            shuffler,
            node_id,
            schedule,
            metrics,
        }
    }

    /// One dispatch tick. Never waits for the lock.
    pub fn dispatch(&self) -> Result<DispatchOutcome, NodeError> {
        let now = self.clock.now();
        if !self
            .store
            .try_acquire_dispatch_lock(&self.node_id, now, self.schedule.dispatch_lock_ttl_ms)?
        {
            self.metrics.dispatch_lock_misses.inc();
            return Ok(DispatchOutcome::LockBusy);
        }

        let result = dispatch_span(&self.node_id).in_scope(|| self.dispatch_locked(now));
        self.store.release_dispatch_lock(&self.node_id)?;
        result
    }

    fn dispatch_locked(&self, now: Timestamp) -> Result<DispatchOutcome, NodeError> {
        self.metrics.dispatch_cycles.inc();

        let eligible = self.eligible_chains()?;
        let online: Vec<NodeId> = self
            .store
            .get_all_active_nodes()?
            .into_iter()
            .filter(|node| node.is_online(now, self.schedule.node_ttl_ms))
            .map(|node| node.node_id)
            .collect();
        self.metrics.online_nodes.set(online.len() as i64);
        if online.is_empty() {
            info!("no online nodes, leases left as they are");
            return Ok(DispatchOutcome::NoOnlineNodes);
        }

        let tasks = plan_assignments(
            &eligible,
            self.store.get_all_distributed_tasks()?,
            online,
            now,
            self.schedule.time_slice_ms,
            self.shuffler.as_ref(),
        );
        if !tasks.is_empty() {
            self.store.save_distributed_tasks(&tasks)?;
        }
        self.metrics.leases_assigned.inc_by(tasks.len() as u64);
        debug!(chains = eligible.len(), assigned = tasks.len(), "dispatch cycle finished");
        Ok(DispatchOutcome::Dispatched {
            assigned: tasks.len(),
        })
    }

    /// Running blockchains whose plugin server is ready.
    fn eligible_chains(&self) -> Result<Vec<ChainKey>, NodeError> {
        let mut chains = Vec::new();
        for meta in self.store.get_blockchains_by_state(BlockchainState::Running)? {
            let state = self.plugins.plugin_state(&meta.properties.plugin_server_id);
            if state.is_ready() {
                chains.push(meta.chain);
            } else {
                debug!(chain = %meta.chain, plugin = %state, "plugin server not ready, skipping chain");
            }
        }
        Ok(chains)
    }
}
