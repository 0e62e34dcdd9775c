//! Duty loops: feed this node's leases to the executors.
//!
//! The Duty loop handles message-pipeline kinds and the BizDuty loop handles
//! chain-lifecycle kinds; both read the same lease table.

use std::sync::Arc;

use tracing::{debug, warn};
use xrelay_store::{RelayerStore, ScheduleStore};
use xrelay_types::{NodeId, TaskCategory};

use crate::executor::{ExecuteOutcome, TaskExecutors};
use crate::NodeError;

pub struct Duty {
    category: TaskCategory,
    store: Arc<dyn RelayerStore>,
    node_id: NodeId,
    executors: Arc<TaskExecutors>,
}

impl Duty {
    pub fn new(
        category: TaskCategory,
        store: Arc<dyn RelayerStore>,
        node_id: NodeId,
        executors: Arc<TaskExecutors>,
    ) -> Self {
        Self {
            category,
            store,
            node_id,
            executors,
        }
    }

    /// Hand every lease of this node in this loop's category to its
    /// executor. Returns the number of runs submitted.
    pub fn run_once(&self) -> Result<usize, NodeError> {
        let mut submitted = 0;
        for task in self.store.get_distributed_tasks_by_node(&self.node_id)? {
            if task.task_type.category() != self.category {
                continue;
            }
            let Some(executor) = self.executors.get(task.task_type) else {
                warn!(task = %task.key(), "no executor for task kind");
                continue;
            };
            if executor.execute(&task) == ExecuteOutcome::Submitted {
                submitted += 1;
            }
        }
        if submitted > 0 {
            debug!(category = ?self.category, submitted, "duty tick");
        }
        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{BlockchainTask, TaskExecutor};
    use crate::RelayerMetrics;
    use async_trait::async_trait;
    use xrelay_nullables::{NullClock, NullStore};
    use xrelay_types::{ChainKey, DistributedTask, TaskType};
    use xrelay_utils::Clock;

    struct Noop;

    #[async_trait]
    impl BlockchainTask for Noop {
        async fn process(&self, _chain: &ChainKey) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn only_own_leases_of_the_category_run() {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(1_000));
        let metrics = Arc::new(RelayerMetrics::new());
        let executors = Arc::new(TaskExecutors::new(TaskType::ALL.iter().map(|t| {
            TaskExecutor::new(*t, Arc::new(Noop), 1, clock.clone(), metrics.clone())
        })));

        let me = NodeId::new("me");
        let mut leases = Vec::new();
        for (task_type, owner) in [
            (TaskType::Commit, "me"),
            (TaskType::Confirm, "me"),
            (TaskType::Deploy, "me"),
            (TaskType::Archive, "other"),
        ] {
            let mut task = DistributedTask::unassigned(task_type, ChainKey::new("p", "a"), 60_000);
            task.assign(NodeId::new(owner), clock.now());
            leases.push(task);
        }
        store.save_distributed_tasks(&leases).unwrap();

        let duty = Duty::new(TaskCategory::Blockchain, store.clone(), me.clone(), executors.clone());
        let biz = Duty::new(TaskCategory::Biz, store.clone(), me, executors.clone());
        assert_eq!(duty.run_once().unwrap(), 2);
        assert_eq!(biz.run_once().unwrap(), 1);
        executors.abort_all();
    }
}
