//! LMDB implementation of CrossChainMessageStore.
//!
//! Pools and archives are keyed by big-endian row id, so iteration is in
//! insertion order. Archiving moves the encoded row unchanged.
//!
//! Three secondary indexes keep the polling queries off full pool scans:
//! pending UCPs and AMs by source chain, SDPs by receiver and state, and
//! the number of active SDPs referencing each AM. Index keys end in the
//! big-endian row id, so a prefix range also yields rows oldest first.

use std::ops::Bound;
use std::sync::{Arc, Mutex};

use heed::{RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};
use xrelay_store::{CrossChainMessageStore, ProvedUcp, SdpCommitUpdate, StoreError};
use xrelay_types::{
    AuthMsgProcessState, AuthMsgWrapper, ChainKey, SdpMsgCommitResult, SdpMsgProcessState,
    SdpMsgWrapper, UcpProcessState, UniformCrosschainPacketContext,
};

use crate::environment::{decode, decode_u64, encode, id_key, scan, LmdbStore, RawDb};
use crate::LmdbError;

/// Marker in the meta table once the secondary indexes are populated.
const INDEXES_BUILT: &[u8] = b"indexes:v1";

fn tx_index_key(receiver: &ChainKey, tx_hash: &str) -> Vec<u8> {
    format!("{receiver}|{tx_hash}").into_bytes()
}

fn sdp_state_prefix(receiver: &ChainKey, state: SdpMsgProcessState) -> Vec<u8> {
    format!("{receiver}|{}|", state.code()).into_bytes()
}

fn pending_prefix(kind: &str, source: &ChainKey) -> Vec<u8> {
    format!("{kind}|{source}|").into_bytes()
}

fn with_id(mut prefix: Vec<u8>, id: u64) -> Vec<u8> {
    prefix.extend_from_slice(&id_key(id));
    prefix
}

/// Smallest key sorting after every key that starts with `prefix`.
fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            break;
        }
    }
    end
}

impl LmdbStore {
    fn insert_rows<T, F, G>(
        &self,
        db: &RawDb,
        counter: &str,
        rows: &[T],
        set_id: F,
        mut on_insert: G,
    ) -> Result<Vec<u64>, StoreError>
    where
        T: Serialize + Clone,
        F: Fn(&mut T, u64),
        G: FnMut(&mut RwTxn, &T) -> Result<(), StoreError>,
    {
        let mut wtxn = self.write_txn()?;
        let first = self.reserve_ids(&mut wtxn, counter, rows.len())?;
        let mut ids = Vec::with_capacity(rows.len());
        for (offset, row) in rows.iter().enumerate() {
            let id = first + offset as u64;
            let mut row = row.clone();
            set_id(&mut row, id);
            db.put(&mut wtxn, &id_key(id), &encode(&row)?)
                .map_err(LmdbError::from)?;
            on_insert(&mut wtxn, &row)?;
            ids.push(id);
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(ids)
    }

    fn get_row<T: DeserializeOwned>(&self, db: &RawDb, id: u64) -> Result<Option<T>, StoreError> {
        let rtxn = self.read_txn()?;
        let val = db.get(&rtxn, &id_key(id)).map_err(LmdbError::from)?;
        Ok(val.map(decode).transpose()?)
    }

    /// Oldest rows matching `keep`, up to `limit`.
    fn select_rows<T, F>(&self, db: &RawDb, limit: usize, keep: F) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let rtxn = self.read_txn()?;
        let mut out = Vec::new();
        for item in db.iter(&rtxn).map_err(LmdbError::from)? {
            if out.len() >= limit {
                break;
            }
            let (_key, val) = item.map_err(LmdbError::from)?;
            let row: T = decode(val)?;
            if keep(&row) {
                out.push(row);
            }
        }
        Ok(out)
    }

    /// Row ids of the first `limit` index entries under `prefix`.
    fn index_ids(
        &self,
        txn: &RoTxn,
        index: &RawDb,
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<u64>, LmdbError> {
        let end = prefix_end(prefix);
        let bounds = (Bound::Included(prefix), Bound::Excluded(end.as_slice()));
        let mut ids = Vec::new();
        for item in index.range(txn, &bounds)? {
            if ids.len() >= limit {
                break;
            }
            let (key, _) = item?;
            let Some(at) = key.len().checked_sub(8) else {
                return Err(LmdbError::Serialization(format!(
                    "index key of {} bytes has no row id",
                    key.len()
                )));
            };
            ids.push(decode_u64(&key[at..])?);
        }
        Ok(ids)
    }

    /// Rows of `db` for `ids`, in the given order. Missing ids are skipped.
    fn rows_by_id<T: DeserializeOwned>(
        &self,
        txn: &RoTxn,
        db: &RawDb,
        ids: &[u64],
    ) -> Result<Vec<T>, LmdbError> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(val) = db.get(txn, &id_key(*id))? {
                rows.push(decode(val)?);
            }
        }
        Ok(rows)
    }

    /// Pending rows of one pool observed on `source`, oldest first.
    fn pending_rows<T: DeserializeOwned>(
        &self,
        kind: &str,
        pool: &RawDb,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<T>, StoreError> {
        let rtxn = self.read_txn()?;
        let ids = self.index_ids(&rtxn, &self.pending_index_db, &pending_prefix(kind, source), limit)?;
        Ok(self.rows_by_id(&rtxn, pool, &ids)?)
    }

    /// Add or drop the pending-index entry of one UCP or AM. Rows without a
    /// source chain are never indexed.
    fn index_pending(
        &self,
        wtxn: &mut RwTxn,
        kind: &str,
        source: Option<&ChainKey>,
        id: u64,
        pending: bool,
    ) -> Result<(), LmdbError> {
        let Some(source) = source else {
            return Ok(());
        };
        let key = with_id(pending_prefix(kind, source), id);
        if pending {
            self.pending_index_db.put(wtxn, &key, &[])?;
        } else {
            self.pending_index_db.delete(wtxn, &key)?;
        }
        Ok(())
    }

    /// Point the state index at `sdp.state`, dropping the entry for
    /// `previous` if there was one.
    fn index_sdp(
        &self,
        wtxn: &mut RwTxn,
        sdp: &SdpMsgWrapper,
        previous: Option<SdpMsgProcessState>,
    ) -> Result<(), LmdbError> {
        let Some(receiver) = &sdp.receiver else {
            return Ok(());
        };
        if let Some(previous) = previous {
            self.sdp_state_index_db
                .delete(wtxn, &with_id(sdp_state_prefix(receiver, previous), sdp.id))?;
        }
        self.sdp_state_index_db
            .put(wtxn, &with_id(sdp_state_prefix(receiver, sdp.state), sdp.id), &[])?;
        Ok(())
    }

    fn unindex_sdp(&self, wtxn: &mut RwTxn, sdp: &SdpMsgWrapper) -> Result<(), LmdbError> {
        if let Some(receiver) = &sdp.receiver {
            self.sdp_state_index_db
                .delete(wtxn, &with_id(sdp_state_prefix(receiver, sdp.state), sdp.id))?;
        }
        if let (Some(receiver), Some(tx_hash)) = (&sdp.receiver, &sdp.tx_hash) {
            self.sdp_tx_index_db
                .delete(wtxn, &tx_index_key(receiver, tx_hash))?;
        }
        Ok(())
    }

    fn count_am_ref(&self, wtxn: &mut RwTxn, am_id: u64, referenced: bool) -> Result<(), LmdbError> {
        let key = id_key(am_id);
        let count = match self.am_refs_db.get(&*wtxn, &key)? {
            Some(bytes) => decode_u64(bytes)?,
            None => 0,
        };
        let count = if referenced {
            count + 1
        } else {
            count.saturating_sub(1)
        };
        if count == 0 {
            self.am_refs_db.delete(wtxn, &key)?;
        } else {
            self.am_refs_db.put(wtxn, &key, &count.to_be_bytes())?;
        }
        Ok(())
    }

    /// Insert one SDP under `auth_msg_id` and index it.
    fn insert_sdp(
        &self,
        wtxn: &mut RwTxn,
        sdp: &SdpMsgWrapper,
        auth_msg_id: u64,
    ) -> Result<u64, LmdbError> {
        let id = self.reserve_ids(wtxn, "sdp", 1)?;
        let mut row = sdp.clone();
        row.id = id;
        row.auth_msg_id = auth_msg_id;
        self.sdp_pool_db.put(wtxn, &id_key(id), &encode(&row)?)?;
        self.index_sdp(wtxn, &row, None)?;
        self.count_am_ref(wtxn, auth_msg_id, true)?;
        Ok(id)
    }

    /// Populate the secondary indexes of an environment written before
    /// they existed. Runs once per environment.
    pub(crate) fn build_indexes(&self) -> Result<(), LmdbError> {
        let mut wtxn = self.write_txn()?;
        if self.meta_db.get(&wtxn, INDEXES_BUILT)?.is_some() {
            return Ok(());
        }
        let ucps: Vec<UniformCrosschainPacketContext> = scan(&wtxn, &self.ucp_pool_db)?;
        for ucp in &ucps {
            let pending = ucp.state == UcpProcessState::Pending;
            self.index_pending(&mut wtxn, "ucp", ucp.source.as_ref(), ucp.id, pending)?;
        }
        let ams: Vec<AuthMsgWrapper> = scan(&wtxn, &self.am_pool_db)?;
        for am in &ams {
            let pending = am.state == AuthMsgProcessState::Pending;
            self.index_pending(&mut wtxn, "am", am.source.as_ref(), am.id, pending)?;
        }
        let sdps: Vec<SdpMsgWrapper> = scan(&wtxn, &self.sdp_pool_db)?;
        for sdp in &sdps {
            self.index_sdp(&mut wtxn, sdp, None)?;
            self.count_am_ref(&mut wtxn, sdp.auth_msg_id, true)?;
        }
        self.meta_db.put(&mut wtxn, INDEXES_BUILT, &[])?;
        wtxn.commit()?;
        if !(ucps.is_empty() && ams.is_empty() && sdps.is_empty()) {
            info!(
                ucps = ucps.len(),
                ams = ams.len(),
                sdps = sdps.len(),
                "message indexes rebuilt"
            );
        }
        Ok(())
    }

    /// Read-modify-write one row inside `wtxn`.
    fn modify_row<T, F>(
        &self,
        wtxn: &mut RwTxn,
        db: &RawDb,
        entity: &str,
        id: u64,
        f: F,
    ) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> Result<(), StoreError>,
    {
        let key = id_key(id);
        let mut row: T = match db.get(&*wtxn, &key).map_err(LmdbError::from)? {
            Some(val) => decode(val)?,
            None => return Err(StoreError::NotFound(format!("{entity} {id}"))),
        };
        f(&mut row)?;
        db.put(wtxn, &key, &encode(&row)?).map_err(LmdbError::from)?;
        Ok(row)
    }

    /// Move rows from `pool` to `archive`; ids missing from the pool are skipped.
    fn archive_rows<T, F>(
        &self,
        pool: &RawDb,
        archive: &RawDb,
        ids: &[u64],
        mut on_move: F,
    ) -> Result<usize, StoreError>
    where
        T: DeserializeOwned,
        F: FnMut(&mut RwTxn, &T) -> Result<(), StoreError>,
    {
        let mut wtxn = self.write_txn()?;
        let mut moved = 0;
        for &id in ids {
            let key = id_key(id);
            let Some(bytes) = pool
                .get(&wtxn, &key)
                .map_err(LmdbError::from)?
                .map(<[u8]>::to_vec)
            else {
                continue;
            };
            let row: T = decode(&bytes)?;
            archive
                .put(&mut wtxn, &key, &bytes)
                .map_err(LmdbError::from)?;
            pool.delete(&mut wtxn, &key).map_err(LmdbError::from)?;
            on_move(&mut wtxn, &row)?;
            moved += 1;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(moved)
    }
}

impl CrossChainMessageStore for LmdbStore {
    fn put_ucps(&self, ucps: &[UniformCrosschainPacketContext]) -> Result<Vec<u64>, StoreError> {
        self.insert_rows(
            &self.ucp_pool_db,
            "ucp",
            ucps,
            |row, id| row.id = id,
            |wtxn, ucp| {
                let pending = ucp.state == UcpProcessState::Pending;
                Ok(self.index_pending(wtxn, "ucp", ucp.source.as_ref(), ucp.id, pending)?)
            },
        )
    }

    fn get_ucp(&self, id: u64) -> Result<Option<UniformCrosschainPacketContext>, StoreError> {
        self.get_row(&self.ucp_pool_db, id)
    }

    fn get_pending_ucps(
        &self,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<UniformCrosschainPacketContext>, StoreError> {
        self.pending_rows("ucp", &self.ucp_pool_db, source, limit)
    }

    fn update_ucp_state(&self, id: u64, state: UcpProcessState) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        let ucp = self.modify_row(
            &mut wtxn,
            &self.ucp_pool_db,
            "ucp",
            id,
            |ucp: &mut UniformCrosschainPacketContext| {
                if !ucp.state.can_transition_to(state) {
                    return Err(StoreError::invalid_transition("ucp", id, ucp.state, state));
                }
                ucp.state = state;
                Ok(())
            },
        )?;
        let pending = ucp.state == UcpProcessState::Pending;
        self.index_pending(&mut wtxn, "ucp", ucp.source.as_ref(), id, pending)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn prove_ucp(
        &self,
        ucp_id: u64,
        am: &AuthMsgWrapper,
        sdp: Option<&SdpMsgWrapper>,
    ) -> Result<ProvedUcp, StoreError> {
        let mut wtxn = self.write_txn()?;
        let ucp = self.modify_row(
            &mut wtxn,
            &self.ucp_pool_db,
            "ucp",
            ucp_id,
            |ucp: &mut UniformCrosschainPacketContext| {
                let next = UcpProcessState::Proved;
                if !ucp.state.can_transition_to(next) {
                    return Err(StoreError::invalid_transition("ucp", ucp_id, ucp.state, next));
                }
                ucp.state = next;
                Ok(())
            },
        )?;
        self.index_pending(&mut wtxn, "ucp", ucp.source.as_ref(), ucp_id, false)?;

        let am_id = self.reserve_ids(&mut wtxn, "am", 1)?;
        let mut row = am.clone();
        row.id = am_id;
        self.am_pool_db
            .put(&mut wtxn, &id_key(am_id), &encode(&row)?)
            .map_err(LmdbError::from)?;
        let pending = row.state == AuthMsgProcessState::Pending;
        self.index_pending(&mut wtxn, "am", row.source.as_ref(), am_id, pending)?;

        let sdp_id = match sdp {
            Some(sdp) => Some(self.insert_sdp(&mut wtxn, sdp, am_id)?),
            None => None,
        };
        wtxn.commit().map_err(LmdbError::from)?;
        debug!(ucp = ucp_id, am = am_id, sdp = ?sdp_id, "ucp proved");
        Ok(ProvedUcp { am_id, sdp_id })
    }

    fn put_ams(&self, ams: &[AuthMsgWrapper]) -> Result<Vec<u64>, StoreError> {
        self.insert_rows(
            &self.am_pool_db,
            "am",
            ams,
            |row, id| row.id = id,
            |wtxn, am| {
                let pending = am.state == AuthMsgProcessState::Pending;
                Ok(self.index_pending(wtxn, "am", am.source.as_ref(), am.id, pending)?)
            },
        )
    }

    fn get_am(&self, id: u64) -> Result<Option<AuthMsgWrapper>, StoreError> {
        self.get_row(&self.am_pool_db, id)
    }

    fn get_pending_ams(
        &self,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<AuthMsgWrapper>, StoreError> {
        self.pending_rows("am", &self.am_pool_db, source, limit)
    }

    fn update_am_state(&self, id: u64, state: AuthMsgProcessState) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        let am = self.modify_row(&mut wtxn, &self.am_pool_db, "am", id, |am: &mut AuthMsgWrapper| {
            if !am.state.can_transition_to(state) {
                return Err(StoreError::invalid_transition("am", id, am.state, state));
            }
            am.state = state;
            Ok(())
        })?;
        let pending = am.state == AuthMsgProcessState::Pending;
        self.index_pending(&mut wtxn, "am", am.source.as_ref(), id, pending)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn put_sdp(&self, sdp: &SdpMsgWrapper) -> Result<u64, StoreError> {
        let mut wtxn = self.write_txn()?;
        let parent = self
            .am_pool_db
            .get(&wtxn, &id_key(sdp.auth_msg_id))
            .map_err(LmdbError::from)?;
        if parent.is_none() {
            return Err(StoreError::NotFound(format!("parent am {}", sdp.auth_msg_id)));
        }
        let id = self.insert_sdp(&mut wtxn, sdp, sdp.auth_msg_id)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(id)
    }

    fn get_sdp(&self, id: u64) -> Result<Option<SdpMsgWrapper>, StoreError> {
        self.get_row(&self.sdp_pool_db, id)
    }

    fn get_sdps_by_state(
        &self,
        receiver: &ChainKey,
        state: SdpMsgProcessState,
        limit: usize,
    ) -> Result<Vec<SdpMsgWrapper>, StoreError> {
        let rtxn = self.read_txn()?;
        let prefix = sdp_state_prefix(receiver, state);
        let ids = self.index_ids(&rtxn, &self.sdp_state_index_db, &prefix, limit)?;
        Ok(self.rows_by_id(&rtxn, &self.sdp_pool_db, &ids)?)
    }

    fn update_sdp_state(&self, id: u64, state: SdpMsgProcessState) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        let mut previous = state;
        let sdp = self.modify_row(&mut wtxn, &self.sdp_pool_db, "sdp", id, |sdp: &mut SdpMsgWrapper| {
            if !sdp.state.can_transition_to(state) {
                return Err(StoreError::invalid_transition("sdp", id, sdp.state, state));
            }
            previous = sdp.state;
            sdp.state = state;
            Ok(())
        })?;
        self.index_sdp(&mut wtxn, &sdp, Some(previous))?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn update_sdp_commit(&self, id: u64, update: &SdpCommitUpdate) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        let mut previous = update.state;
        let sdp = self.modify_row(&mut wtxn, &self.sdp_pool_db, "sdp", id, |sdp: &mut SdpMsgWrapper| {
            if !sdp.state.can_transition_to(update.state) {
                return Err(StoreError::invalid_transition("sdp", id, sdp.state, update.state));
            }
            previous = sdp.state;
            sdp.state = update.state;
            sdp.tx_hash = update.tx_hash.clone();
            sdp.tx_fail_reason = update.fail_reason.clone();
            sdp.committed_at = Some(update.committed_at);
            Ok(())
        })?;
        self.index_sdp(&mut wtxn, &sdp, Some(previous))?;
        if let (Some(receiver), Some(tx_hash)) = (&sdp.receiver, &sdp.tx_hash) {
            self.sdp_tx_index_db
                .put(&mut wtxn, &tx_index_key(receiver, tx_hash), &id_key(id))
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn apply_commit_results(&self, results: &[SdpMsgCommitResult]) -> Result<usize, StoreError> {
        let mut wtxn = self.write_txn()?;
        let mut affected = 0;
        for result in results {
            let index_key = tx_index_key(&result.receiver, &result.tx_hash);
            let Some(id) = self
                .sdp_tx_index_db
                .get(&wtxn, &index_key)
                .map_err(LmdbError::from)?
                .map(decode_u64)
                .transpose()?
            else {
                continue;
            };
            let key = id_key(id);
            let Some(bytes) = self.sdp_pool_db.get(&wtxn, &key).map_err(LmdbError::from)? else {
                continue;
            };
            let mut sdp: SdpMsgWrapper = decode(bytes)?;
            if sdp.state != SdpMsgProcessState::TxPending {
                continue;
            }
            sdp.state = result.final_state();
            sdp.tx_success = result.success;
            sdp.tx_fail_reason = result.fail_reason.clone();
            sdp.confirmed_at = Some(result.tx_timestamp);
            self.sdp_pool_db
                .put(&mut wtxn, &key, &encode(&sdp)?)
                .map_err(LmdbError::from)?;
            self.index_sdp(&mut wtxn, &sdp, Some(SdpMsgProcessState::TxPending))?;
            affected += 1;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        debug!(results = results.len(), affected, "commit results applied");
        Ok(affected)
    }

    fn get_archivable_sdp_ids(
        &self,
        receiver: &ChainKey,
        limit: usize,
    ) -> Result<Vec<u64>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut ids = Vec::new();
        for state in SdpMsgProcessState::ALL.iter().filter(|s| s.is_terminal()) {
            let prefix = sdp_state_prefix(receiver, *state);
            ids.extend(self.index_ids(&rtxn, &self.sdp_state_index_db, &prefix, limit)?);
        }
        ids.sort_unstable();
        ids.truncate(limit);
        Ok(ids)
    }

    fn get_archivable_am_ids(&self, limit: usize) -> Result<Vec<u64>, StoreError> {
        let rtxn = self.read_txn()?;
        let mut ids = Vec::new();
        for item in self.am_pool_db.iter(&rtxn).map_err(LmdbError::from)? {
            if ids.len() >= limit {
                break;
            }
            let (key, val) = item.map_err(LmdbError::from)?;
            if self.am_refs_db.get(&rtxn, key).map_err(LmdbError::from)?.is_some() {
                continue;
            }
            let am: AuthMsgWrapper = decode(val)?;
            if am.state.is_terminal() {
                ids.push(am.id);
            }
        }
        Ok(ids)
    }

    fn get_archivable_ucp_ids(&self, limit: usize) -> Result<Vec<u64>, StoreError> {
        let rows = self.select_rows(
            &self.ucp_pool_db,
            limit,
            |ucp: &UniformCrosschainPacketContext| ucp.state.is_terminal(),
        )?;
        Ok(rows.into_iter().map(|ucp| ucp.id).collect())
    }

    fn archive_sdps(&self, ids: &[u64]) -> Result<usize, StoreError> {
        self.archive_rows(
            &self.sdp_pool_db,
            &self.sdp_archive_db,
            ids,
            |wtxn, sdp: &SdpMsgWrapper| {
                self.unindex_sdp(wtxn, sdp)?;
                Ok(self.count_am_ref(wtxn, sdp.auth_msg_id, false)?)
            },
        )
    }

    fn archive_ams(&self, ids: &[u64]) -> Result<usize, StoreError> {
        self.archive_rows(
            &self.am_pool_db,
            &self.am_archive_db,
            ids,
            |wtxn, am: &AuthMsgWrapper| {
                Ok(self.index_pending(wtxn, "am", am.source.as_ref(), am.id, false)?)
            },
        )
    }

    fn archive_ucps(&self, ids: &[u64]) -> Result<usize, StoreError> {
        self.archive_rows(
            &self.ucp_pool_db,
            &self.ucp_archive_db,
            ids,
            |wtxn, ucp: &UniformCrosschainPacketContext| {
                Ok(self.index_pending(wtxn, "ucp", ucp.source.as_ref(), ucp.id, false)?)
            },
        )
    }

    fn get_archived_sdp(&self, id: u64) -> Result<Option<SdpMsgWrapper>, StoreError> {
        self.get_row(&self.sdp_archive_db, id)
    }

    fn session_lock(&self, session: &str) -> Arc<Mutex<()>> {
        self.sessions.get(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::open_temp;
    use xrelay_types::{
        AuthMsgTrustLevel, CrossChainDomain, Identity, Timestamp, UpperProtocolType,
    };

    fn chain() -> ChainKey {
        ChainKey::new("ethereum", "eth-1")
    }

    fn am() -> AuthMsgWrapper {
        AuthMsgWrapper {
            id: 0,
            ucp_id: None,
            source: Some(chain()),
            domain: CrossChainDomain::new("a.eth").unwrap(),
            identity: Identity::new([1; 32]),
            protocol_type: UpperProtocolType::Sdp,
            trust_level: AuthMsgTrustLevel::PositiveTrust,
            raw_message: vec![1, 2, 3],
            ledger_proof: vec![],
            state: AuthMsgProcessState::Pending,
            created_at: Timestamp::new(1),
        }
    }

    fn sdp(auth_msg_id: u64) -> SdpMsgWrapper {
        SdpMsgWrapper {
            id: 0,
            auth_msg_id,
            sender_domain: CrossChainDomain::new("a.eth").unwrap(),
            sender_identity: Identity::new([1; 32]),
            receiver_domain: CrossChainDomain::new("b.eth").unwrap(),
            receiver_identity: Identity::new([2; 32]),
            receiver: Some(chain()),
            msg_sequence: xrelay_types::UNORDERED_SEQUENCE,
            payload: vec![9],
            state: SdpMsgProcessState::Pending,
            tx_hash: None,
            tx_success: false,
            tx_fail_reason: None,
            committed_at: None,
            confirmed_at: None,
        }
    }

    fn commit(store: &LmdbStore, id: u64, tx_hash: &str) {
        store
            .update_sdp_commit(
                id,
                &SdpCommitUpdate {
                    state: SdpMsgProcessState::TxPending,
                    tx_hash: Some(tx_hash.to_string()),
                    fail_reason: None,
                    committed_at: Timestamp::new(10),
                },
            )
            .unwrap();
    }

    #[test]
    fn am_ids_strictly_increase_and_duplicates_are_kept() {
        let (_dir, store) = open_temp();
        let first = store.put_ams(&[am(), am()]).unwrap();
        let second = store.put_ams(&[am()]).unwrap();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
        assert_eq!(store.get_pending_ams(&chain(), 10).unwrap().len(), 3);
        assert_eq!(store.get_am(2).unwrap().unwrap().id, 2);
    }

    #[test]
    fn sdp_requires_existing_parent() {
        let (_dir, store) = open_temp();
        assert!(matches!(store.put_sdp(&sdp(99)), Err(StoreError::NotFound(_))));
        let ids = store.put_ams(&[am()]).unwrap();
        assert_eq!(store.put_sdp(&sdp(ids[0])).unwrap(), 1);
    }

    #[test]
    fn state_updates_refuse_regression() {
        let (_dir, store) = open_temp();
        let ids = store.put_ams(&[am()]).unwrap();
        store.update_am_state(ids[0], AuthMsgProcessState::Proved).unwrap();
        let err = store
            .update_am_state(ids[0], AuthMsgProcessState::Pending)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "am", .. }));
    }

    #[test]
    fn commit_results_apply_once() {
        let (_dir, store) = open_temp();
        let am_id = store.put_ams(&[am()]).unwrap()[0];
        let id = store.put_sdp(&sdp(am_id)).unwrap();
        commit(&store, id, "0xaa");

        let result = SdpMsgCommitResult {
            receiver: chain(),
            tx_hash: "0xaa".to_string(),
            success: true,
            fail_reason: None,
            tx_timestamp: Timestamp::new(20),
        };
        assert_eq!(store.apply_commit_results(&[result.clone()]).unwrap(), 1);
        assert_eq!(store.apply_commit_results(&[result]).unwrap(), 0);
        let row = store.get_sdp(id).unwrap().unwrap();
        assert_eq!(row.state, SdpMsgProcessState::TxSuccess);
        assert_eq!(row.confirmed_at, Some(Timestamp::new(20)));
    }

    #[test]
    fn archive_skips_missing_ids() {
        let (_dir, store) = open_temp();
        let am_id = store.put_ams(&[am()]).unwrap()[0];
        let ids: Vec<u64> = (0..3).map(|_| store.put_sdp(&sdp(am_id)).unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(store.archive_sdps(&[1, 3, 5]).unwrap(), 2);
        assert!(store.get_sdp(1).unwrap().is_none());
        assert!(store.get_archived_sdp(3).unwrap().is_some());
        assert!(store.get_sdp(2).unwrap().is_some());
        assert_eq!(store.archive_sdps(&[1, 3]).unwrap(), 0);
    }

    #[test]
    fn archivable_ams_wait_for_their_sdps() {
        let (_dir, store) = open_temp();
        let am_id = store.put_ams(&[am()]).unwrap()[0];
        store.update_am_state(am_id, AuthMsgProcessState::Proved).unwrap();
        let sdp_id = store.put_sdp(&sdp(am_id)).unwrap();
        assert!(store.get_archivable_am_ids(10).unwrap().is_empty());

        store.update_sdp_state(sdp_id, SdpMsgProcessState::MsgRejected).unwrap();
        assert_eq!(store.get_archivable_sdp_ids(&chain(), 10).unwrap(), vec![sdp_id]);
        store.archive_sdps(&[sdp_id]).unwrap();
        assert_eq!(store.get_archivable_am_ids(10).unwrap(), vec![am_id]);
    }

    fn ucp(source: Option<ChainKey>) -> UniformCrosschainPacketContext {
        UniformCrosschainPacketContext::new(
            source,
            CrossChainDomain::new("a.eth").unwrap(),
            vec![1],
            vec![],
            Default::default(),
            Timestamp::new(1),
        )
    }

    #[test]
    fn pending_queries_follow_state_changes() {
        let (_dir, store) = open_temp();
        let other = ChainKey::new("ethereum", "eth-2");
        let ids = store
            .put_ucps(&[ucp(Some(chain())), ucp(Some(other.clone())), ucp(None), ucp(Some(chain()))])
            .unwrap();
        let pending: Vec<u64> = store
            .get_pending_ucps(&chain(), 10)
            .unwrap()
            .iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(pending, vec![ids[0], ids[3]]);

        store.update_ucp_state(ids[0], UcpProcessState::Rejected).unwrap();
        let pending = store.get_pending_ucps(&chain(), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ids[3]);
        assert_eq!(store.get_pending_ucps(&other, 10).unwrap().len(), 1);

        let am_id = store.put_ams(&[am()]).unwrap()[0];
        store.update_am_state(am_id, AuthMsgProcessState::MsgRejected).unwrap();
        assert!(store.get_pending_ams(&chain(), 10).unwrap().is_empty());
    }

    #[test]
    fn sdps_by_state_are_indexed_per_receiver() {
        let (_dir, store) = open_temp();
        let am_id = store.put_ams(&[am()]).unwrap()[0];
        let first = store.put_sdp(&sdp(am_id)).unwrap();
        let second = store.put_sdp(&sdp(am_id)).unwrap();
        let mut remote = sdp(am_id);
        remote.receiver = None;
        remote.state = SdpMsgProcessState::RemotePending;
        store.put_sdp(&remote).unwrap();

        let ids = |state| -> Vec<u64> {
            store
                .get_sdps_by_state(&chain(), state, 10)
                .unwrap()
                .iter()
                .map(|s| s.id)
                .collect()
        };
        assert_eq!(ids(SdpMsgProcessState::Pending), vec![first, second]);
        assert_eq!(store.get_sdps_by_state(&chain(), SdpMsgProcessState::Pending, 1).unwrap().len(), 1);

        commit(&store, first, "0xbb");
        assert_eq!(ids(SdpMsgProcessState::Pending), vec![second]);
        assert_eq!(ids(SdpMsgProcessState::TxPending), vec![first]);

        store
            .apply_commit_results(&[SdpMsgCommitResult {
                receiver: chain(),
                tx_hash: "0xbb".to_string(),
                success: false,
                fail_reason: Some("reverted".to_string()),
                tx_timestamp: Timestamp::new(30),
            }])
            .unwrap();
        store.update_sdp_state(second, SdpMsgProcessState::MsgRejected).unwrap();
        assert!(ids(SdpMsgProcessState::TxPending).is_empty());
        assert_eq!(ids(SdpMsgProcessState::TxFailed), vec![first]);
        assert_eq!(store.get_archivable_sdp_ids(&chain(), 10).unwrap(), vec![first, second]);
        assert_eq!(store.get_archivable_sdp_ids(&chain(), 1).unwrap(), vec![first]);

        store.archive_sdps(&[first]).unwrap();
        assert!(ids(SdpMsgProcessState::TxFailed).is_empty());
    }

    #[test]
    fn am_stays_referenced_until_its_last_sdp_is_archived() {
        let (_dir, store) = open_temp();
        let am_id = store.put_ams(&[am()]).unwrap()[0];
        store.update_am_state(am_id, AuthMsgProcessState::Proved).unwrap();
        let first = store.put_sdp(&sdp(am_id)).unwrap();
        let second = store.put_sdp(&sdp(am_id)).unwrap();
        for id in [first, second] {
            store.update_sdp_state(id, SdpMsgProcessState::MsgRejected).unwrap();
        }

        store.archive_sdps(&[first]).unwrap();
        assert!(store.get_archivable_am_ids(10).unwrap().is_empty());
        store.archive_sdps(&[second]).unwrap();
        assert_eq!(store.get_archivable_am_ids(10).unwrap(), vec![am_id]);
    }

    #[test]
    fn prove_ucp_writes_am_and_sdp_together() {
        let (_dir, store) = open_temp();
        let ucp_id = store.put_ucps(&[ucp(Some(chain()))]).unwrap()[0];
        let mut proved = am();
        proved.ucp_id = Some(ucp_id);
        proved.state = AuthMsgProcessState::Proved;

        let ids = store.prove_ucp(ucp_id, &proved, Some(&sdp(0))).unwrap();
        let sdp_id = ids.sdp_id.unwrap();
        assert_eq!(store.get_ucp(ucp_id).unwrap().unwrap().state, UcpProcessState::Proved);
        assert!(store.get_pending_ucps(&chain(), 10).unwrap().is_empty());
        assert_eq!(store.get_am(ids.am_id).unwrap().unwrap().state, AuthMsgProcessState::Proved);
        assert_eq!(store.get_sdp(sdp_id).unwrap().unwrap().auth_msg_id, ids.am_id);
        assert_eq!(
            store.get_sdps_by_state(&chain(), SdpMsgProcessState::Pending, 10).unwrap().len(),
            1
        );

        let err = store.prove_ucp(ucp_id, &proved, Some(&sdp(0))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "ucp", .. }));
        assert!(store.get_am(ids.am_id + 1).unwrap().is_none());
        assert!(store.get_sdp(sdp_id + 1).unwrap().is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
            store.put_ams(&[am()]).unwrap();
        }
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        assert_eq!(store.put_ams(&[am()]).unwrap(), vec![2]);
        assert_eq!(store.get_pending_ams(&chain(), 10).unwrap().len(), 2);
    }
}
