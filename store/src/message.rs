//! Message pools: UCP, AM and SDP rows and their archives.
//!
//! Row ids are assigned on insertion and strictly increase per pool.
//! Every state update is checked against the entity's transition table and
//! refused with `StoreError::InvalidTransition` when it would regress.

use std::sync::{Arc, Mutex};

use crate::StoreError;
use xrelay_types::{
    AuthMsgProcessState, AuthMsgWrapper, ChainKey, SdpMsgCommitResult, SdpMsgProcessState,
    SdpMsgWrapper, Timestamp, UcpProcessState, UniformCrosschainPacketContext,
};

/// Outcome of one commit attempt, written by the Committer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SdpCommitUpdate {
    /// `TxPending` after a successful submission, `TxFailed` otherwise.
    pub state: SdpMsgProcessState,
    pub tx_hash: Option<String>,
    pub fail_reason: Option<String>,
    pub committed_at: Timestamp,
}

/// Ids of the rows written by `CrossChainMessageStore::prove_ucp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProvedUcp {
    pub am_id: u64,
    /// `None` when the AM settled without an SDP message.
    pub sdp_id: Option<u64>,
}

pub trait CrossChainMessageStore {
    // --- UCP pool ---

    /// Insert packets and return their new ids in input order.
    fn put_ucps(&self, ucps: &[UniformCrosschainPacketContext]) -> Result<Vec<u64>, StoreError>;

    fn get_ucp(&self, id: u64) -> Result<Option<UniformCrosschainPacketContext>, StoreError>;

    /// Oldest `PENDING` packets observed on `source`.
    fn get_pending_ucps(
        &self,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<UniformCrosschainPacketContext>, StoreError>;

    fn update_ucp_state(&self, id: u64, state: UcpProcessState) -> Result<(), StoreError>;

    /// Move a `PENDING` UCP to `PROVED` and insert the AM it carries plus,
    /// when given, the AM's SDP message, all in one write. The SDP's
    /// `auth_msg_id` is replaced by the new AM id. On error nothing is
    /// written and the UCP stays `PENDING`.
    fn prove_ucp(
        &self,
        ucp_id: u64,
        am: &AuthMsgWrapper,
        sdp: Option<&SdpMsgWrapper>,
    ) -> Result<ProvedUcp, StoreError>;

    // --- AM pool ---

    /// Insert messages and return their new ids in input order.
    fn put_ams(&self, ams: &[AuthMsgWrapper]) -> Result<Vec<u64>, StoreError>;

    fn get_am(&self, id: u64) -> Result<Option<AuthMsgWrapper>, StoreError>;

    /// Oldest `PENDING` messages observed on `source`.
    fn get_pending_ams(
        &self,
        source: &ChainKey,
        limit: usize,
    ) -> Result<Vec<AuthMsgWrapper>, StoreError>;

    fn update_am_state(&self, id: u64, state: AuthMsgProcessState) -> Result<(), StoreError>;

    // --- SDP pool ---

    /// Insert one SDP message. Fails with `NotFound` if its parent AM does
    /// not exist in the active pool.
    fn put_sdp(&self, sdp: &SdpMsgWrapper) -> Result<u64, StoreError>;

    fn get_sdp(&self, id: u64) -> Result<Option<SdpMsgWrapper>, StoreError>;

    /// Oldest messages addressed to `receiver` in `state`.
    fn get_sdps_by_state(
        &self,
        receiver: &ChainKey,
        state: SdpMsgProcessState,
        limit: usize,
    ) -> Result<Vec<SdpMsgWrapper>, StoreError>;

    fn update_sdp_state(&self, id: u64, state: SdpMsgProcessState) -> Result<(), StoreError>;

    fn update_sdp_commit(&self, id: u64, update: &SdpCommitUpdate) -> Result<(), StoreError>;

    /// Apply confirmed receipts in one batch. Only `TX_PENDING` rows whose
    /// receiver and tx hash match are changed, so re-applying a result
    /// affects zero rows and is not an error. Returns the rows changed.
    fn apply_commit_results(&self, results: &[SdpMsgCommitResult]) -> Result<usize, StoreError>;

    // --- archive ---

    /// Terminal SDP messages addressed to `receiver`.
    fn get_archivable_sdp_ids(&self, receiver: &ChainKey, limit: usize)
        -> Result<Vec<u64>, StoreError>;

    /// Terminal AMs no longer referenced by any SDP in the active pool.
    fn get_archivable_am_ids(&self, limit: usize) -> Result<Vec<u64>, StoreError>;

    fn get_archivable_ucp_ids(&self, limit: usize) -> Result<Vec<u64>, StoreError>;

    /// Move rows to the archive. Ids missing from the active pool are
    /// skipped; the return value counts the rows actually moved.
    fn archive_sdps(&self, ids: &[u64]) -> Result<usize, StoreError>;

    fn archive_ams(&self, ids: &[u64]) -> Result<usize, StoreError>;

    fn archive_ucps(&self, ids: &[u64]) -> Result<usize, StoreError>;

    fn get_archived_sdp(&self, id: u64) -> Result<Option<SdpMsgWrapper>, StoreError>;

    /// Keyed mutex serializing work on one session (e.g. one sender domain).
    fn session_lock(&self, session: &str) -> Arc<Mutex<()>>;
}
