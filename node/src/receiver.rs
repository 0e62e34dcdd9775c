//! Ingestion entry points of the message pools.
//!
//! On-chain batches are inserted `PENDING` and left to the Process task.
//! Off-chain submissions are validated synchronously so the caller gets a
//! definitive answer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use xrelay_store::CrossChainMessageStore;
use xrelay_types::{
    AuthMsgProcessState, AuthMsgWrapper, ChainKey, CrossChainDomain, LedgerInfo,
    SdpMsgCommitResult, Timestamp, UcpProcessState, UniformCrosschainPacketContext,
};

use crate::tracing_spans::offchain_span;
use crate::validator::{MessageValidator, Verdict};
use crate::{NodeError, PipelineContext};

/// Last time each chain delivered messages. Read by idle detection outside
/// the pipeline.
#[derive(Debug, Default)]
pub struct LastSeen {
    chains: Mutex<HashMap<ChainKey, Timestamp>>,
}

impl LastSeen {
    pub fn touch(&self, chain: &ChainKey, at: Timestamp) {
        let mut chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        let entry = chains.entry(chain.clone()).or_insert(at);
        if *entry < at {
            *entry = at;
        }
    }

    pub fn get(&self, chain: &ChainKey) -> Option<Timestamp> {
        self.chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(chain)
            .copied()
    }
}

/// Accepted off-chain submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffChainAccepted {
    pub ucp_id: u64,
    pub am_id: u64,
    pub sdp_id: u64,
}

pub struct Receiver {
    ctx: PipelineContext,
    validator: Arc<MessageValidator>,
    last_seen: LastSeen,
}

impl Receiver {
    pub fn new(ctx: PipelineContext, validator: Arc<MessageValidator>) -> Self {
        Self {
            ctx,
            validator,
            last_seen: LastSeen::default(),
        }
    }

    pub fn last_seen(&self) -> &LastSeen {
        &self.last_seen
    }

    /// Insert observed AMs as `PENDING`. Returns their ids in input order.
    pub fn receive_am(&self, messages: &[AuthMsgWrapper]) -> Result<Vec<u64>, NodeError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<AuthMsgWrapper> = messages
            .iter()
            .map(|am| AuthMsgWrapper {
                id: 0,
                state: AuthMsgProcessState::Pending,
                ..am.clone()
            })
            .collect();
        let ids = self.ctx.store.put_ams(&rows)?;
        let now = self.ctx.clock.now();
        for chain in rows.iter().filter_map(|am| am.source.as_ref()) {
            self.last_seen.touch(chain, now);
        }
        self.ctx.metrics.am_received.inc_by(ids.len() as u64);
        debug!(count = ids.len(), "authenticated messages received");
        Ok(ids)
    }

    /// Insert observed UCPs as given. Returns their ids in input order.
    pub fn receive_ucp(&self, contexts: &[UniformCrosschainPacketContext]) -> Result<Vec<u64>, NodeError> {
        if contexts.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.ctx.store.put_ucps(contexts)?;
        let now = self.ctx.clock.now();
        for chain in contexts.iter().filter_map(|ucp| ucp.source.as_ref()) {
            self.last_seen.touch(chain, now);
        }
        self.ctx.metrics.ucp_received.inc_by(ids.len() as u64);
        debug!(count = ids.len(), "uniform cross-chain packets received");
        Ok(ids)
    }

    /// Apply receipts pushed by an AM client. Re-applied receipts change
    /// nothing. Returns the rows changed.
    pub fn receive_am_client_receipts(&self, results: &[SdpMsgCommitResult]) -> Result<usize, NodeError> {
        let applied = self.ctx.store.apply_commit_results(results)?;
        debug!(received = results.len(), applied, "am client receipts applied");
        Ok(applied)
    }

    /// Ingest one message submitted off-chain and validate it immediately.
    ///
    /// Submissions from one domain are serialized. A rejected or undecodable
    /// message is an error; the rows written so far stay for auditing. An
    /// off-chain UCP is never picked up by the Process task, so one whose
    /// validation fails is closed as `REJECTED` and the caller resubmits.
    pub fn receive_off_chain_am_request(
        &self,
        domain: &str,
        message: Vec<u8>,
        proof: Vec<u8>,
        ledger_info: LedgerInfo,
    ) -> Result<OffChainAccepted, NodeError> {
        let domain = CrossChainDomain::new(domain)?;
        let _span = offchain_span(domain.as_str()).entered();
        let session = self.ctx.store.session_lock(domain.as_str());
        let _guard = session.lock().unwrap_or_else(|e| e.into_inner());

        let mut ucp =
            UniformCrosschainPacketContext::new(None, domain, message, proof, ledger_info, self.ctx.clock.now());
        ucp.id = self
            .ctx
            .store
            .put_ucps(std::slice::from_ref(&ucp))?
            .first()
            .copied()
            .ok_or_else(|| NodeError::DataIntegrity("no id returned for off-chain ucp".to_string()))?;
        self.ctx.metrics.ucp_received.inc();

        let verdict = match self.validator.validate_ucp(&ucp) {
            Ok(verdict) => verdict,
            Err(e) => {
                if let Err(close) = self.ctx.store.update_ucp_state(ucp.id, UcpProcessState::Rejected) {
                    warn!(ucp = ucp.id, error = %close, "could not close failed off-chain ucp");
                }
                return Err(e);
            }
        };
        match verdict {
            Verdict::Proved { am_id, sdp_id } => {
                info!(ucp = ucp.id, am = am_id, sdp = sdp_id, "off-chain message accepted");
                Ok(OffChainAccepted {
                    ucp_id: ucp.id,
                    am_id,
                    sdp_id,
                })
            }
            Verdict::Rejected { reason } => Err(NodeError::Rejected(reason)),
            Verdict::Illegal { reason } => Err(NodeError::IllegalMessage(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use crate::process::SdpExtractor;
    use crate::validator::{DomainRegistryVerifier, Provenance, ProvenanceVerifier};
    use xrelay_chain::AuthMessage;
    use xrelay_types::{AuthMsgTrustLevel, Identity, SdpMsgProcessState, UpperProtocolType};
    use xrelay_utils::Clock;

    fn receiver(fx: &Fixture) -> Receiver {
        let store = fx.ctx.store.clone();
        let validator = MessageValidator::new(
            store.clone(),
            Arc::new(DomainRegistryVerifier::new(store.clone(), &["remote.domain".to_string()]).unwrap()),
            SdpExtractor::new(store, fx.ctx.metrics.clone()),
            fx.ctx.clock.clone(),
        );
        Receiver::new(fx.ctx.clone(), Arc::new(validator))
    }

    fn observed(source: &ChainKey, n: u8) -> AuthMsgWrapper {
        AuthMsgWrapper {
            id: 99,
            ucp_id: None,
            source: Some(source.clone()),
            domain: domain("a.domain"),
            identity: Identity::new([n; 32]),
            protocol_type: UpperProtocolType::Sdp,
            trust_level: AuthMsgTrustLevel::ZeroTrust,
            raw_message: vec![n],
            ledger_proof: vec![],
            state: AuthMsgProcessState::Proved,
            created_at: Timestamp::EPOCH,
        }
    }

    #[test]
    fn on_chain_ams_get_increasing_ids_and_pending_state() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        let r = receiver(&fx);
        let first = r.receive_am(&[observed(&a, 1), observed(&a, 1)]).unwrap();
        let second = r.receive_am(&[observed(&a, 2)]).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0] < first[1] && first[1] < second[0]);
        assert!(fx.store.all_ams().iter().all(|am| am.state == AuthMsgProcessState::Pending));
        assert_eq!(r.last_seen().get(&a), Some(fx.ctx.clock.now()));
    }

    #[test]
    fn off_chain_submission_is_validated_synchronously() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        let r = receiver(&fx);
        let accepted = r
            .receive_off_chain_am_request(
                "remote.domain",
                raw_am(AuthMsgTrustLevel::PositiveTrust, "b.domain", 0),
                vec![1, 2],
                LedgerInfo::default(),
            )
            .unwrap();
        let sdp = fx.store.get_sdp(accepted.sdp_id).unwrap().unwrap();
        assert_eq!(sdp.state, SdpMsgProcessState::Pending);
        assert_eq!(sdp.receiver, Some(dest));
        assert_eq!(
            fx.store.get_ucp(accepted.ucp_id).unwrap().unwrap().state,
            UcpProcessState::Proved
        );
    }

    #[test]
    fn off_chain_failures_are_typed() {
        let fx = Fixture::new();
        let r = receiver(&fx);
        let err = r
            .receive_off_chain_am_request(
                "stranger.domain",
                raw_am(AuthMsgTrustLevel::PositiveTrust, "b.domain", 0),
                vec![],
                LedgerInfo::default(),
            )
            .unwrap_err();
        assert!(matches!(err, NodeError::Rejected(_)));

        let err = r
            .receive_off_chain_am_request("remote.domain", vec![1, 2, 3], vec![], LedgerInfo::default())
            .unwrap_err();
        assert!(matches!(err, NodeError::IllegalMessage(_)));

        let err = r
            .receive_off_chain_am_request("", vec![], vec![], LedgerInfo::default())
            .unwrap_err();
        assert!(matches!(err, NodeError::Types(_)));
    }

    struct RegistryDown;

    impl ProvenanceVerifier for RegistryDown {
        fn verify(
            &self,
            _ucp: &UniformCrosschainPacketContext,
            _message: &AuthMessage,
        ) -> Result<Provenance, NodeError> {
            Err(NodeError::Other("domain registry unavailable".to_string()))
        }
    }

    #[test]
    fn failed_off_chain_validation_leaves_no_pending_rows() {
        let fx = Fixture::new();
        fx.add_chain("b");
        let store = fx.ctx.store.clone();
        let validator = MessageValidator::new(
            store.clone(),
            Arc::new(RegistryDown),
            SdpExtractor::new(store, fx.ctx.metrics.clone()),
            fx.ctx.clock.clone(),
        );
        let r = Receiver::new(fx.ctx.clone(), Arc::new(validator));

        let err = r
            .receive_off_chain_am_request(
                "remote.domain",
                raw_am(AuthMsgTrustLevel::PositiveTrust, "b.domain", 0),
                vec![],
                LedgerInfo::default(),
            )
            .unwrap_err();
        assert!(matches!(err, NodeError::Other(_)));

        let ucps = fx.store.all_ucps();
        assert_eq!(ucps.len(), 1);
        assert_eq!(ucps[0].state, UcpProcessState::Rejected);
        assert!(fx.store.all_ams().is_empty());
        assert_eq!(fx.store.get_archivable_ucp_ids(10).unwrap(), vec![ucps[0].id]);
    }

    #[test]
    fn last_seen_never_moves_backwards() {
        let seen = LastSeen::default();
        let chain = ChainKey::new("p", "a");
        seen.touch(&chain, Timestamp::new(10));
        seen.touch(&chain, Timestamp::new(5));
        assert_eq!(seen.get(&chain), Some(Timestamp::new(10)));
    }
}
