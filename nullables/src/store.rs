//! Nullable store: thread-safe in-memory storage for testing.
//!
//! One mutex guards all tables, so every trait method is atomic just like a
//! single LMDB write transaction.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use xrelay_store::{
    BlockchainStore, CrossChainMessageStore, DeployUpdate, ProvedUcp, ScheduleStore, SdpCommitUpdate,
    SessionLocks, StoreError,
};
use xrelay_types::{
    ActiveNode, AuthMsgProcessState, AuthMsgWrapper, BlockchainMeta, ChainKey, DistributedTask,
    NodeId, SdpMsgCommitResult, SdpMsgProcessState, SdpMsgWrapper, TaskKey, Timestamp,
    UcpProcessState, UniformCrosschainPacketContext,
};

#[derive(Default)]
struct Tables {
    blockchains: BTreeMap<ChainKey, BlockchainMeta>,
    anchor_heights: HashMap<ChainKey, u64>,
    tasks: BTreeMap<TaskKey, DistributedTask>,
    nodes: BTreeMap<NodeId, ActiveNode>,
    dispatch_lock: Option<(NodeId, Timestamp)>,
    ucps: BTreeMap<u64, UniformCrosschainPacketContext>,
    ucp_archive: BTreeMap<u64, UniformCrosschainPacketContext>,
    ams: BTreeMap<u64, AuthMsgWrapper>,
    am_archive: BTreeMap<u64, AuthMsgWrapper>,
    sdps: BTreeMap<u64, SdpMsgWrapper>,
    sdp_archive: BTreeMap<u64, SdpMsgWrapper>,
    next_ucp: u64,
    next_am: u64,
    next_sdp: u64,
}

fn next_id(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

/// An in-memory implementation of every repository contract.
#[derive(Default)]
pub struct NullStore {
    tables: Mutex<Tables>,
    sessions: SessionLocks,
    /// When set, every call fails with this backend error.
    failure: Mutex<Option<String>>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (`None` to recover).
    pub fn fail_with(&self, error: Option<&str>) {
        *self.failure.lock().unwrap() = error.map(str::to_string);
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if let Some(msg) = self.failure.lock().unwrap().clone() {
            return Err(StoreError::Backend(msg));
        }
        Ok(self.tables.lock().unwrap())
    }

    /// Snapshot of every SDP in the active pool.
    pub fn all_sdps(&self) -> Vec<SdpMsgWrapper> {
        self.tables.lock().unwrap().sdps.values().cloned().collect()
    }

    pub fn all_ams(&self) -> Vec<AuthMsgWrapper> {
        self.tables.lock().unwrap().ams.values().cloned().collect()
    }

    pub fn all_ucps(&self) -> Vec<UniformCrosschainPacketContext> {
        self.tables.lock().unwrap().ucps.values().cloned().collect()
    }

    pub fn archived_counts(&self) -> (usize, usize, usize) {
        let t = self.tables.lock().unwrap();
        (t.ucp_archive.len(), t.am_archive.len(), t.sdp_archive.len())
    }

    pub fn dispatch_lock_holder(&self) -> Option<NodeId> {
        self.tables
            .lock()
            .unwrap()
            .dispatch_lock
            .as_ref()
            .map(|(holder, _)| holder.clone())
    }
}

impl BlockchainStore for NullStore {
    fn save_blockchain_meta(&self, meta: &BlockchainMeta) -> Result<(), StoreError> {
        self.tables()?
            .blockchains
            .insert(meta.chain.clone(), meta.clone());
        Ok(())
    }

    fn get_blockchain_meta(&self, chain: &ChainKey) -> Result<Option<BlockchainMeta>, StoreError> {
        Ok(self.tables()?.blockchains.get(chain).cloned())
    }

    fn update_deploy_progress(&self, chain: &ChainKey, update: &DeployUpdate) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let meta = t
            .blockchains
            .get_mut(chain)
            .ok_or_else(|| StoreError::NotFound(format!("blockchain {chain}")))?;
        update.apply(&mut meta.properties);
        Ok(())
    }

    fn get_all_blockchain_meta(&self) -> Result<Vec<BlockchainMeta>, StoreError> {
        Ok(self.tables()?.blockchains.values().cloned().collect())
    }

    fn get_anchor_height(&self, chain: &ChainKey) -> Result<Option<u64>, StoreError> {
        Ok(self.tables()?.anchor_heights.get(chain).copied())
    }

    fn set_anchor_height(&self, chain: &ChainKey, height: u64) -> Result<(), StoreError> {
        self.tables()?.anchor_heights.insert(chain.clone(), height);
        Ok(())
    }
}

impl ScheduleStore for NullStore {
    fn try_acquire_dispatch_lock(
        &self,
        holder: &NodeId,
        now: Timestamp,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables()?;
        let free = match &t.dispatch_lock {
            None => true,
            Some((owner, at)) => owner == holder || at.has_expired(ttl_ms, now),
        };
        if free {
            t.dispatch_lock = Some((holder.clone(), now));
        }
        Ok(free)
    }

    fn release_dispatch_lock(&self, holder: &NodeId) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        if matches!(&t.dispatch_lock, Some((owner, _)) if owner == holder) {
            t.dispatch_lock = None;
        }
        Ok(())
    }

    fn get_all_distributed_tasks(&self) -> Result<Vec<DistributedTask>, StoreError> {
        Ok(self.tables()?.tasks.values().cloned().collect())
    }

    fn save_distributed_tasks(&self, tasks: &[DistributedTask]) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        for task in tasks {
            t.tasks.insert(task.key(), task.clone());
        }
        Ok(())
    }

    fn remove_distributed_tasks(&self, chain: &ChainKey) -> Result<usize, StoreError> {
        let mut t = self.tables()?;
        let before = t.tasks.len();
        t.tasks.retain(|key, _| &key.chain != chain);
        Ok(before - t.tasks.len())
    }

    fn activate_node(&self, node: &ActiveNode) -> Result<(), StoreError> {
        self.tables()?
            .nodes
            .insert(node.node_id.clone(), node.clone());
        Ok(())
    }

    fn get_all_active_nodes(&self) -> Result<Vec<ActiveNode>, StoreError> {
        Ok(self.tables()?.nodes.values().cloned().collect())
    }
}

fn take_matching<T: Clone>(
    rows: &BTreeMap<u64, T>,
    limit: usize,
    keep: impl Fn(&T) -> bool,
) -> Vec<T> {
    rows.values().filter(|r| keep(r)).take(limit).cloned().collect()
}

fn move_rows<T>(pool: &mut BTreeMap<u64, T>, archive: &mut BTreeMap<u64, T>, ids: &[u64]) -> Vec<T>
where
    T: Clone,
{
    let mut moved = Vec::new();
    for id in ids {
        if let Some(row) = pool.remove(id) {
            archive.insert(*id, row.clone());
            moved.push(row);
        }
    }
    moved
}

impl CrossChainMessageStore for NullStore {
    fn put_ucps(&self, ucps: &[UniformCrosschainPacketContext]) -> Result<Vec<u64>, StoreError> {
        let mut t = self.tables()?;
        let mut ids = Vec::with_capacity(ucps.len());
        for ucp in ucps {
            let id = next_id(&mut t.next_ucp);
            let mut row = ucp.clone();
            row.id = id;
            t.ucps.insert(id, row);
            ids.push(id);
        }
        Ok(ids)
    }

    fn get_ucp(&self, id: u64) -> Result<Option<UniformCrosschainPacketContext>, StoreError> {
        Ok(self.tables()?.ucps.get(&id).cloned())
    }

    fn get_pending_ucps(
        &self,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<UniformCrosschainPacketContext>, StoreError> {
        Ok(take_matching(&self.tables()?.ucps, limit, |u| {
            u.state == UcpProcessState::Pending && u.source.as_ref() == Some(source)
        }))
    }

    fn update_ucp_state(&self, id: u64, state: UcpProcessState) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let ucp = t
            .ucps
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("ucp {id}")))?;
        if !ucp.state.can_transition_to(state) {
            return Err(StoreError::invalid_transition("ucp", id, ucp.state, state));
        }
        ucp.state = state;
        Ok(())
    }

    fn prove_ucp(
        &self,
        ucp_id: u64,
        am: &AuthMsgWrapper,
        sdp: Option<&SdpMsgWrapper>,
    ) -> Result<ProvedUcp, StoreError> {
        let mut t = self.tables()?;
        let current = t
            .ucps
            .get(&ucp_id)
            .map(|ucp| ucp.state)
            .ok_or_else(|| StoreError::NotFound(format!("ucp {ucp_id}")))?;
        if !current.can_transition_to(UcpProcessState::Proved) {
            return Err(StoreError::invalid_transition(
                "ucp",
                ucp_id,
                current,
                UcpProcessState::Proved,
            ));
        }

        let am_id = next_id(&mut t.next_am);
        let mut am_row = am.clone();
        am_row.id = am_id;
        t.ams.insert(am_id, am_row);
        let sdp_id = sdp.map(|sdp| {
            let id = next_id(&mut t.next_sdp);
            let mut row = sdp.clone();
            row.id = id;
            row.auth_msg_id = am_id;
            t.sdps.insert(id, row);
            id
        });
        if let Some(ucp) = t.ucps.get_mut(&ucp_id) {
            ucp.state = UcpProcessState::Proved;
        }
        Ok(ProvedUcp { am_id, sdp_id })
    }

    fn put_ams(&self, ams: &[AuthMsgWrapper]) -> Result<Vec<u64>, StoreError> {
        let mut t = self.tables()?;
        let mut ids = Vec::with_capacity(ams.len());
        for am in ams {
            let id = next_id(&mut t.next_am);
            let mut row = am.clone();
            row.id = id;
            t.ams.insert(id, row);
            ids.push(id);
        }
        Ok(ids)
    }

    fn get_am(&self, id: u64) -> Result<Option<AuthMsgWrapper>, StoreError> {
        Ok(self.tables()?.ams.get(&id).cloned())
    }

    fn get_pending_ams(
        &self,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<AuthMsgWrapper>, StoreError> {
        Ok(take_matching(&self.tables()?.ams, limit, |a| {
            a.state == AuthMsgProcessState::Pending && a.source.as_ref() == Some(source)
        }))
    }

    fn update_am_state(&self, id: u64, state: AuthMsgProcessState) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let am = t
            .ams
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("am {id}")))?;
        if !am.state.can_transition_to(state) {
            return Err(StoreError::invalid_transition("am", id, am.state, state));
        }
        am.state = state;
        Ok(())
    }

    fn put_sdp(&self, sdp: &SdpMsgWrapper) -> Result<u64, StoreError> {
        let mut t = self.tables()?;
        if !t.ams.contains_key(&sdp.auth_msg_id) {
            return Err(StoreError::NotFound(format!("parent am {}", sdp.auth_msg_id)));
        }
        let id = next_id(&mut t.next_sdp);
        let mut row = sdp.clone();
        row.id = id;
        t.sdps.insert(id, row);
        Ok(id)
    }

    fn get_sdp(&self, id: u64) -> Result<Option<SdpMsgWrapper>, StoreError> {
        Ok(self.tables()?.sdps.get(&id).cloned())
    }

    fn get_sdps_by_state(
        &self,
        receiver: &ChainKey,
        state: SdpMsgProcessState,
        limit: usize,
    ) -> Result<Vec<SdpMsgWrapper>, StoreError> {
        Ok(take_matching(&self.tables()?.sdps, limit, |s| {
            s.state == state && s.receiver.as_ref() == Some(receiver)
        }))
    }

    fn update_sdp_state(&self, id: u64, state: SdpMsgProcessState) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let sdp = t
            .sdps
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("sdp {id}")))?;
        if !sdp.state.can_transition_to(state) {
            return Err(StoreError::invalid_transition("sdp", id, sdp.state, state));
        }
        sdp.state = state;
        Ok(())
    }

    fn update_sdp_commit(&self, id: u64, update: &SdpCommitUpdate) -> Result<(), StoreError> {
        let mut t = self.tables()?;
        let sdp = t
            .sdps
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("sdp {id}")))?;
        if !sdp.state.can_transition_to(update.state) {
            return Err(StoreError::invalid_transition("sdp", id, sdp.state, update.state));
        }
        sdp.state = update.state;
        sdp.tx_hash = update.tx_hash.clone();
        sdp.tx_fail_reason = update.fail_reason.clone();
        sdp.committed_at = Some(update.committed_at);
        Ok(())
    }

    fn apply_commit_results(&self, results: &[SdpMsgCommitResult]) -> Result<usize, StoreError> {
        let mut t = self.tables()?;
        let mut affected = 0;
        for result in results {
            let row = t.sdps.values_mut().find(|s| {
                s.state == SdpMsgProcessState::TxPending
                    && s.receiver.as_ref() == Some(&result.receiver)
                    && s.tx_hash.as_deref() == Some(result.tx_hash.as_str())
            });
            if let Some(sdp) = row {
                sdp.state = result.final_state();
                sdp.tx_success = result.success;
                sdp.tx_fail_reason = result.fail_reason.clone();
                sdp.confirmed_at = Some(result.tx_timestamp);
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn get_archivable_sdp_ids(
        &self,
        receiver: &ChainKey,
        limit: usize,
    ) -> Result<Vec<u64>, StoreError> {
        Ok(take_matching(&self.tables()?.sdps, limit, |s| {
            s.state.is_terminal() && s.receiver.as_ref() == Some(receiver)
        })
        .into_iter()
        .map(|s| s.id)
        .collect())
    }

    fn get_archivable_am_ids(&self, limit: usize) -> Result<Vec<u64>, StoreError> {
        let t = self.tables()?;
        let referenced: HashSet<u64> = t.sdps.values().map(|s| s.auth_msg_id).collect();
        Ok(take_matching(&t.ams, limit, |a| {
            a.state.is_terminal() && !referenced.contains(&a.id)
        })
        .into_iter()
        .map(|a| a.id)
        .collect())
    }

    fn get_archivable_ucp_ids(&self, limit: usize) -> Result<Vec<u64>, StoreError> {
        Ok(take_matching(&self.tables()?.ucps, limit, |u| u.state.is_terminal())
            .into_iter()
            .map(|u| u.id)
            .collect())
    }

    fn archive_sdps(&self, ids: &[u64]) -> Result<usize, StoreError> {
        let mut t = self.tables()?;
        let t = &mut *t;
        Ok(move_rows(&mut t.sdps, &mut t.sdp_archive, ids).len())
    }

    fn archive_ams(&self, ids: &[u64]) -> Result<usize, StoreError> {
        let mut t = self.tables()?;
        let t = &mut *t;
        Ok(move_rows(&mut t.ams, &mut t.am_archive, ids).len())
    }

    fn archive_ucps(&self, ids: &[u64]) -> Result<usize, StoreError> {
        let mut t = self.tables()?;
        let t = &mut *t;
        Ok(move_rows(&mut t.ucps, &mut t.ucp_archive, ids).len())
    }

    fn get_archived_sdp(&self, id: u64) -> Result<Option<SdpMsgWrapper>, StoreError> {
        Ok(self.tables()?.sdp_archive.get(&id).cloned())
    }

    fn session_lock(&self, session: &str) -> Arc<Mutex<()>> {
        self.sessions.get(session)
    }
}
