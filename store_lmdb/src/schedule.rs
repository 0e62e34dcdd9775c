//! LMDB implementation of ScheduleStore.
//!
//! Lease key: `TASK_TYPE@product:blockchain_id`, so all leases of one task
//! kind are adjacent. Node key: the node id. Lock key: the lock name.

use serde::{Deserialize, Serialize};
use tracing::debug;
use xrelay_store::{ScheduleStore, StoreError, DISPATCH_LOCK};
use xrelay_types::{ActiveNode, ChainKey, DistributedTask, NodeId, Timestamp};

use crate::environment::{decode, encode, scan, LmdbStore};
use crate::LmdbError;

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    holder: NodeId,
    acquired_at: Timestamp,
}

fn task_key(task: &DistributedTask) -> Vec<u8> {
    task.key().to_string().into_bytes()
}

impl ScheduleStore for LmdbStore {
    fn try_acquire_dispatch_lock(
        &self,
        holder: &NodeId,
        now: Timestamp,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut wtxn = self.write_txn()?;
        let current: Option<LockRecord> = self
            .locks_db
            .get(&wtxn, DISPATCH_LOCK.as_bytes())
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?;
        let free = match &current {
            None => true,
            Some(lock) => &lock.holder == holder || lock.acquired_at.has_expired(ttl_ms, now),
        };
        if !free {
            return Ok(false);
        }
        let record = LockRecord {
            holder: holder.clone(),
            acquired_at: now,
        };
        self.locks_db
            .put(&mut wtxn, DISPATCH_LOCK.as_bytes(), &encode(&record)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(true)
    }

    fn release_dispatch_lock(&self, holder: &NodeId) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        let current: Option<LockRecord> = self
            .locks_db
            .get(&wtxn, DISPATCH_LOCK.as_bytes())
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?;
        if matches!(current, Some(lock) if &lock.holder == holder) {
            self.locks_db
                .delete(&mut wtxn, DISPATCH_LOCK.as_bytes())
                .map_err(LmdbError::from)?;
            wtxn.commit().map_err(LmdbError::from)?;
        }
        Ok(())
    }

    fn get_all_distributed_tasks(&self) -> Result<Vec<DistributedTask>, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(scan(&rtxn, &self.tasks_db)?)
    }

    fn save_distributed_tasks(&self, tasks: &[DistributedTask]) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        for task in tasks {
            self.tasks_db
                .put(&mut wtxn, &task_key(task), &encode(task)?)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn remove_distributed_tasks(&self, chain: &ChainKey) -> Result<usize, StoreError> {
        let mut wtxn = self.write_txn()?;
        let mut doomed = Vec::new();
        for item in self.tasks_db.iter(&wtxn).map_err(LmdbError::from)? {
            let (key, val) = item.map_err(LmdbError::from)?;
            let task: DistributedTask = decode(val)?;
            if &task.chain == chain {
                doomed.push(key.to_vec());
            }
        }
        for key in &doomed {
            self.tasks_db
                .delete(&mut wtxn, key)
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        debug!(chain = %chain, removed = doomed.len(), "leases removed");
        Ok(doomed.len())
    }

    fn activate_node(&self, node: &ActiveNode) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        self.nodes_db
            .put(&mut wtxn, node.node_id.as_str().as_bytes(), &encode(node)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_all_active_nodes(&self) -> Result<Vec<ActiveNode>, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(scan(&rtxn, &self.nodes_db)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::open_temp;
    use xrelay_types::TaskType;

    #[test]
    fn dispatch_lock_is_exclusive_until_ttl() {
        let (_dir, store) = open_temp();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        assert!(store.try_acquire_dispatch_lock(&a, Timestamp::new(1_000), 500).unwrap());
        assert!(!store.try_acquire_dispatch_lock(&b, Timestamp::new(1_200), 500).unwrap());
        assert!(store.try_acquire_dispatch_lock(&a, Timestamp::new(1_200), 500).unwrap());
        assert!(store.try_acquire_dispatch_lock(&b, Timestamp::new(1_700), 500).unwrap());
    }

    #[test]
    fn release_only_by_holder() {
        let (_dir, store) = open_temp();
        let a = NodeId::new("a");
        let b = NodeId::new("b");
        assert!(store.try_acquire_dispatch_lock(&a, Timestamp::new(0), 10_000).unwrap());
        store.release_dispatch_lock(&b).unwrap();
        assert!(!store.try_acquire_dispatch_lock(&b, Timestamp::new(1), 10_000).unwrap());
        store.release_dispatch_lock(&a).unwrap();
        assert!(store.try_acquire_dispatch_lock(&b, Timestamp::new(2), 10_000).unwrap());
    }

    #[test]
    fn leases_upsert_by_key_and_remove_by_chain() {
        let (_dir, store) = open_temp();
        let c1 = ChainKey::new("p", "c1");
        let c2 = ChainKey::new("p", "c2");
        let mut tasks: Vec<_> = [TaskType::Anchor, TaskType::Commit]
            .into_iter()
            .flat_map(|t| {
                [
                    DistributedTask::unassigned(t, c1.clone(), 1_000),
                    DistributedTask::unassigned(t, c2.clone(), 1_000),
                ]
            })
            .collect();
        store.save_distributed_tasks(&tasks).unwrap();

        tasks[0].assign(NodeId::new("n1"), Timestamp::new(5));
        store.save_distributed_tasks(&tasks[..1]).unwrap();
        let all = store.get_all_distributed_tasks().unwrap();
        assert_eq!(all.len(), 4);
        let mine = store.get_distributed_tasks_by_node(&NodeId::new("n1")).unwrap();
        assert_eq!(mine, vec![tasks[0].clone()]);

        assert_eq!(store.remove_distributed_tasks(&c1).unwrap(), 2);
        let left = store.get_all_distributed_tasks().unwrap();
        assert!(left.iter().all(|t| t.chain == c2));
    }

    #[test]
    fn nodes_refresh_in_place() {
        let (_dir, store) = open_temp();
        let mut node = ActiveNode {
            node_id: NodeId::new("n1"),
            node_ip: Some("10.0.0.1".into()),
            last_active: Timestamp::new(1),
        };
        store.activate_node(&node).unwrap();
        node.last_active = Timestamp::new(2);
        store.activate_node(&node).unwrap();
        assert_eq!(store.get_all_active_nodes().unwrap(), vec![node]);
    }
}
