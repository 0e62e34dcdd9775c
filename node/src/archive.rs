//! The Archive task: moves terminal rows out of the active pools.

use async_trait::async_trait;
use tracing::debug;
use xrelay_store::CrossChainMessageStore;
use xrelay_types::ChainKey;

use crate::executor::BlockchainTask;
use crate::{NodeError, PipelineContext};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub sdps: usize,
    pub ams: usize,
    pub ucps: usize,
}

pub struct ArchiveService {
    ctx: PipelineContext,
}

impl ArchiveService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Sweep terminal SDPs addressed to `chain`, then terminal AMs no SDP
    /// still references, then terminal UCPs. Ids archived concurrently by
    /// another node are skipped.
    pub fn archive_chain(&self, chain: &ChainKey) -> Result<ArchiveSummary, NodeError> {
        let store = &self.ctx.store;
        let limit = self.ctx.config.archive_batch_size;

        let ids = store.get_archivable_sdp_ids(chain, limit)?;
        let sdps = self.sweep("sdp", &ids, store.archive_sdps(&ids)?);
        let ids = store.get_archivable_am_ids(limit)?;
        let ams = self.sweep("am", &ids, store.archive_ams(&ids)?);
        let ids = store.get_archivable_ucp_ids(limit)?;
        let ucps = self.sweep("ucp", &ids, store.archive_ucps(&ids)?);

        Ok(ArchiveSummary { sdps, ams, ucps })
    }

    fn sweep(&self, pool: &'static str, requested: &[u64], moved: usize) -> usize {
        if moved < requested.len() {
            debug!(pool, requested = requested.len(), moved, "some rows were already archived");
        }
        self.ctx
            .metrics
            .rows_archived
            .with_label_values(&[pool])
            .inc_by(moved as u64);
        moved
    }
}

#[async_trait]
impl BlockchainTask for ArchiveService {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError> {
        let summary = self.archive_chain(chain)?;
        if summary != ArchiveSummary::default() {
            debug!(chain = %chain, sdps = summary.sdps, ams = summary.ams, ucps = summary.ucps, "archive run finished");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use xrelay_store::SdpCommitUpdate;
    use xrelay_types::{
        AuthMsgProcessState, AuthMsgTrustLevel, AuthMsgWrapper, LedgerInfo, SdpMsgCommitResult,
        SdpMsgProcessState, SdpMsgWrapper, Timestamp, UcpProcessState, UniformCrosschainPacketContext,
        UpperProtocolType,
    };
    use xrelay_utils::Clock;

    #[test]
    fn delivered_message_chain_is_retired_in_order() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        let now = fx.ctx.clock.now();

        let ucp = UniformCrosschainPacketContext::new(None, domain("a.domain"), vec![1], vec![], LedgerInfo::default(), now);
        let ucp_id = fx.store.put_ucps(&[ucp]).unwrap()[0];
        fx.store.update_ucp_state(ucp_id, UcpProcessState::Proved).unwrap();
        let am = AuthMsgWrapper {
            id: 0,
            ucp_id: Some(ucp_id),
            source: None,
            domain: domain("a.domain"),
            identity: sender(),
            protocol_type: UpperProtocolType::Sdp,
            trust_level: AuthMsgTrustLevel::PositiveTrust,
            raw_message: vec![1],
            ledger_proof: vec![],
            state: AuthMsgProcessState::Proved,
            created_at: now,
        };
        let am_id = fx.store.put_ams(&[am]).unwrap()[0];
        let sdp_id = fx
            .store
            .put_sdp(&SdpMsgWrapper {
                id: 0,
                auth_msg_id: am_id,
                sender_domain: domain("a.domain"),
                sender_identity: sender(),
                receiver_domain: domain("b.domain"),
                receiver_identity: receiver(),
                receiver: Some(dest.clone()),
                msg_sequence: 0,
                payload: vec![],
                state: SdpMsgProcessState::Pending,
                tx_hash: None,
                tx_success: false,
                tx_fail_reason: None,
                committed_at: None,
                confirmed_at: None,
            })
            .unwrap();

        let service = ArchiveService::new(fx.ctx.clone());
        // The AM is still referenced by an undelivered SDP.
        assert_eq!(
            service.archive_chain(&dest).unwrap(),
            ArchiveSummary { sdps: 0, ams: 0, ucps: 1 }
        );

        fx.store
            .update_sdp_commit(
                sdp_id,
                &SdpCommitUpdate {
                    state: SdpMsgProcessState::TxPending,
                    tx_hash: Some("0x9".into()),
                    fail_reason: None,
                    committed_at: now,
                },
            )
            .unwrap();
        fx.store
            .apply_commit_results(&[SdpMsgCommitResult {
                receiver: dest.clone(),
                tx_hash: "0x9".into(),
                success: true,
                fail_reason: None,
                tx_timestamp: Timestamp::new(5),
            }])
            .unwrap();

        assert_eq!(
            service.archive_chain(&dest).unwrap(),
            ArchiveSummary { sdps: 1, ams: 1, ucps: 0 }
        );
        assert!(fx.store.get_sdp(sdp_id).unwrap().is_none());
        assert_eq!(
            fx.store.get_archived_sdp(sdp_id).unwrap().unwrap().state,
            SdpMsgProcessState::TxSuccess
        );
        assert_eq!(fx.store.archived_counts(), (1, 1, 1));
    }
}
