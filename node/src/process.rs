//! The Process task: validates pending UCP and AM rows of one source chain
//! and derives SDP messages from the proved ones.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use xrelay_chain::SdpMessage;
use xrelay_store::{BlockchainStore, CrossChainMessageStore, RelayerStore};
use xrelay_types::{AuthMsgWrapper, ChainKey, SdpMsgProcessState, SdpMsgWrapper};

use crate::executor::BlockchainTask;
use crate::validator::{MessageValidator, Verdict};
use crate::{NodeError, PipelineContext, RelayerMetrics};

/// Derives the SDP row of a proved AM.
pub struct SdpExtractor {
    store: Arc<dyn RelayerStore>,
    metrics: Arc<RelayerMetrics>,
}

impl SdpExtractor {
    pub fn new(store: Arc<dyn RelayerStore>, metrics: Arc<RelayerMetrics>) -> Self {
        Self { store, metrics }
    }

    /// The SDP row carried by `am`. It is `PENDING` when the receiver
    /// domain is managed here and `REMOTE_PENDING` otherwise.
    pub fn build(&self, am: &AuthMsgWrapper, sdp: &SdpMessage) -> Result<SdpMsgWrapper, NodeError> {
        let receiver = self
            .store
            .get_blockchain_meta_by_domain(&sdp.receiver_domain)?
            .map(|meta| meta.chain);
        let state = if receiver.is_some() {
            SdpMsgProcessState::Pending
        } else {
            SdpMsgProcessState::RemotePending
        };
        Ok(SdpMsgWrapper {
            id: 0,
            auth_msg_id: am.id,
            sender_domain: am.domain.clone(),
            sender_identity: am.identity,
            receiver_domain: sdp.receiver_domain.clone(),
            receiver_identity: sdp.receiver_identity,
            receiver,
            msg_sequence: sdp.sequence,
            payload: sdp.payload.clone(),
            state,
            tx_hash: None,
            tx_success: false,
            tx_fail_reason: None,
            committed_at: None,
            confirmed_at: None,
        })
    }

    /// Insert the SDP message carried by `am`.
    pub fn extract(&self, am: &AuthMsgWrapper, sdp: &SdpMessage) -> Result<u64, NodeError> {
        let row = self.build(am, sdp)?;
        let id = self.store.put_sdp(&row)?;
        self.extracted(am.id, id, &row);
        Ok(id)
    }

    /// Account for an SDP row written by the caller.
    pub fn extracted(&self, am_id: u64, sdp_id: u64, row: &SdpMsgWrapper) {
        self.metrics.sdp_created.inc();
        debug!(am = am_id, sdp = sdp_id, state = %row.state, to = %row.receiver_domain, "sdp extracted");
    }
}

/// Counts of one Process run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub proved: usize,
    pub rejected: usize,
    pub illegal: usize,
    pub failed: usize,
}

impl ProcessSummary {
    fn record(&mut self, result: Result<Verdict, NodeError>, what: &str, id: u64) {
        match result {
            Ok(Verdict::Proved { .. }) => self.proved += 1,
            Ok(Verdict::Rejected { .. }) => self.rejected += 1,
            Ok(Verdict::Illegal { .. }) => self.illegal += 1,
            Err(e) => {
                warn!(%what, id, error = %e, code = e.code(), "validation failed, retrying next cycle");
                self.failed += 1;
            }
        }
    }
}

pub struct ProcessService {
    ctx: PipelineContext,
    validator: Arc<MessageValidator>,
}

impl ProcessService {
    pub fn new(ctx: PipelineContext, validator: Arc<MessageValidator>) -> Self {
        Self { ctx, validator }
    }

    /// Validate one batch of pending UCPs, then one batch of pending AMs,
    /// observed on `chain`. A failing row is left pending for the next run.
    pub fn process_chain(&self, chain: &ChainKey) -> Result<ProcessSummary, NodeError> {
        let mut summary = ProcessSummary::default();
        let store = &self.ctx.store;

        for ucp in store.get_pending_ucps(chain, self.ctx.config.ucp_batch_size)? {
            summary.record(self.validator.validate_ucp(&ucp), "ucp", ucp.id);
        }
        for am in store.get_pending_ams(chain, self.ctx.config.process_batch_size)? {
            summary.record(self.validator.validate_am(&am), "am", am.id);
        }

        if summary != ProcessSummary::default() {
            debug!(
                chain = %chain,
                proved = summary.proved,
                rejected = summary.rejected,
                illegal = summary.illegal,
                failed = summary.failed,
                "process run finished"
            );
        }
        Ok(summary)
    }
}

#[async_trait]
impl BlockchainTask for ProcessService {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError> {
        self.process_chain(chain).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use crate::validator::DomainRegistryVerifier;
    use xrelay_types::{
        AuthMsgProcessState, AuthMsgTrustLevel, LedgerInfo, UcpProcessState,
        UniformCrosschainPacketContext, UpperProtocolType,
    };
    use xrelay_utils::Clock;

    fn service(fx: &Fixture) -> ProcessService {
        let store = fx.ctx.store.clone();
        let validator = MessageValidator::new(
            store.clone(),
            Arc::new(DomainRegistryVerifier::new(store.clone(), &[]).unwrap()),
            SdpExtractor::new(store, fx.ctx.metrics.clone()),
            fx.ctx.clock.clone(),
        );
        ProcessService::new(fx.ctx.clone(), Arc::new(validator))
    }

    #[test]
    fn remote_receiver_is_remote_pending() {
        let fx = Fixture::new();
        let source = fx.add_chain("a");
        let am = AuthMsgWrapper {
            id: 0,
            ucp_id: None,
            source: Some(source.clone()),
            domain: domain("a.domain"),
            identity: sender(),
            protocol_type: UpperProtocolType::Sdp,
            trust_level: AuthMsgTrustLevel::PositiveTrust,
            raw_message: raw_am(AuthMsgTrustLevel::PositiveTrust, "far.away", 3),
            ledger_proof: vec![1],
            state: AuthMsgProcessState::Pending,
            created_at: fx.ctx.clock.now(),
        };
        fx.store.put_ams(&[am]).unwrap();

        let summary = service(&fx).process_chain(&source).unwrap();
        assert_eq!(summary.proved, 1);
        let sdps = fx.store.all_sdps();
        assert_eq!(sdps.len(), 1);
        assert_eq!(sdps[0].state, SdpMsgProcessState::RemotePending);
        assert_eq!(sdps[0].receiver, None);
        assert_eq!(sdps[0].msg_sequence, 3);
        assert_eq!(sdps[0].sender_identity, sender());
    }

    #[test]
    fn only_the_chains_own_rows_are_processed() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        let b = fx.add_chain("b");
        let raw = raw_am(AuthMsgTrustLevel::ZeroTrust, "b.domain", 0);
        let ucps: Vec<_> = [&a, &b]
            .into_iter()
            .map(|chain| {
                UniformCrosschainPacketContext::new(
                    Some(chain.clone()),
                    fx.ctx.blockchain(chain).unwrap().domain,
                    raw.clone(),
                    vec![],
                    LedgerInfo::default(),
                    fx.ctx.clock.now(),
                )
            })
            .collect();
        let ids = fx.store.put_ucps(&ucps).unwrap();

        let summary = service(&fx).process_chain(&a).unwrap();
        assert_eq!(summary.proved, 1);
        assert_eq!(fx.store.get_ucp(ids[0]).unwrap().unwrap().state, UcpProcessState::Proved);
        assert_eq!(fx.store.get_ucp(ids[1]).unwrap().unwrap().state, UcpProcessState::Pending);
    }

    #[test]
    fn store_failure_surfaces() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        fx.store.fail_with(Some("disk gone"));
        assert!(service(&fx).process_chain(&a).is_err());
    }
}
