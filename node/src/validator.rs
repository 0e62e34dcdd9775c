//! Provenance and trust checks of the UCP and AM layers.
//!
//! A UCP is proved when its raw message decodes and its source domain is
//! vouched for. A proved UCP yields an AM which, like an AM ingested
//! directly, is settled as `MSG_ILLEGAL`, `MSG_REJECTED` or `PROVED`; only a
//! proved AM has its SDP message extracted.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use xrelay_chain::{AuthMessage, CodecError, SdpMessage};
use xrelay_store::{BlockchainStore, CrossChainMessageStore, RelayerStore};
use xrelay_types::{
    AuthMsgProcessState, AuthMsgTrustLevel, AuthMsgWrapper, CrossChainDomain, UcpProcessState,
    UniformCrosschainPacketContext, UpperProtocolType,
};
use xrelay_utils::Clock;

use crate::process::SdpExtractor;
use crate::NodeError;

/// Outcome of the provenance check of one UCP.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provenance {
    Proved,
    Rejected(String),
}

/// Decides whether a UCP's origin can be trusted.
pub trait ProvenanceVerifier: Send + Sync {
    fn verify(
        &self,
        ucp: &UniformCrosschainPacketContext,
        message: &AuthMessage,
    ) -> Result<Provenance, NodeError>;
}

/// Trusts domains managed by this relayer plus a configured allow-list.
pub struct DomainRegistryVerifier {
    store: Arc<dyn RelayerStore>,
    trusted: HashSet<CrossChainDomain>,
}

impl DomainRegistryVerifier {
    pub fn new(store: Arc<dyn RelayerStore>, trusted_remote_domains: &[String]) -> Result<Self, NodeError> {
        let trusted = trusted_remote_domains
            .iter()
            .map(|d| CrossChainDomain::new(d.as_str()))
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { store, trusted })
    }
}

impl ProvenanceVerifier for DomainRegistryVerifier {
    fn verify(
        &self,
        ucp: &UniformCrosschainPacketContext,
        _message: &AuthMessage,
    ) -> Result<Provenance, NodeError> {
        if self.trusted.contains(&ucp.src_domain) {
            return Ok(Provenance::Proved);
        }
        match self.store.get_blockchain_meta_by_domain(&ucp.src_domain)? {
            Some(_) => Ok(Provenance::Proved),
            None => Ok(Provenance::Rejected(format!(
                "source domain {} is neither managed nor trusted",
                ucp.src_domain
            ))),
        }
    }
}

/// Result of validating one UCP or AM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Proved { am_id: u64, sdp_id: u64 },
    Rejected { reason: String },
    Illegal { reason: String },
}

/// An AuthMessage with its SDP payload decoded.
#[derive(Clone, Debug)]
pub struct DecodedMessage {
    pub auth: AuthMessage,
    pub sdp: SdpMessage,
}

pub fn decode_message(raw: &[u8]) -> Result<DecodedMessage, CodecError> {
    let auth = AuthMessage::decode(raw)?;
    let sdp = match auth.upper_protocol {
        UpperProtocolType::Sdp => SdpMessage::decode(&auth.payload)?,
    };
    Ok(DecodedMessage { auth, sdp })
}

const NEGATIVE_TRUST: &str = "negative trust level";

pub struct MessageValidator {
    store: Arc<dyn RelayerStore>,
    verifier: Arc<dyn ProvenanceVerifier>,
    extractor: SdpExtractor,
    clock: Arc<dyn Clock>,
}

impl MessageValidator {
    pub fn new(
        store: Arc<dyn RelayerStore>,
        verifier: Arc<dyn ProvenanceVerifier>,
        extractor: SdpExtractor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            extractor,
            clock,
        }
    }

    /// Settle a `PENDING` UCP and, when proved, the AM it carries.
    pub fn validate_ucp(&self, ucp: &UniformCrosschainPacketContext) -> Result<Verdict, NodeError> {
        let decoded = match decode_message(&ucp.raw_message) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.store.update_ucp_state(ucp.id, UcpProcessState::Rejected)?;
                debug!(ucp = ucp.id, error = %e, "ucp rejected: undecodable message");
                return Ok(Verdict::Illegal {
                    reason: e.to_string(),
                });
            }
        };
        if let Provenance::Rejected(reason) = self.verifier.verify(ucp, &decoded.auth)? {
            self.store.update_ucp_state(ucp.id, UcpProcessState::Rejected)?;
            debug!(ucp = ucp.id, %reason, "ucp rejected");
            return Ok(Verdict::Rejected { reason });
        }

        let mut am = AuthMsgWrapper {
            id: 0,
            ucp_id: Some(ucp.id),
            source: ucp.source.clone(),
            domain: ucp.src_domain.clone(),
            identity: decoded.auth.identity,
            protocol_type: decoded.auth.upper_protocol,
            trust_level: decoded.auth.trust_level,
            raw_message: ucp.raw_message.clone(),
            ledger_proof: ucp.proof.clone(),
            state: AuthMsgProcessState::Pending,
            created_at: self.clock.now(),
        };
        let sdp = if decoded.auth.trust_level == AuthMsgTrustLevel::NegativeTrust {
            am.state = AuthMsgProcessState::MsgRejected;
            None
        } else {
            am.state = AuthMsgProcessState::Proved;
            Some(self.extractor.build(&am, &decoded.sdp)?)
        };

        // One store write: on failure the UCP stays pending and no AM exists.
        let proved = self.store.prove_ucp(ucp.id, &am, sdp.as_ref())?;
        match (sdp, proved.sdp_id) {
            (Some(row), Some(sdp_id)) => {
                self.extractor.extracted(proved.am_id, sdp_id, &row);
                Ok(Verdict::Proved {
                    am_id: proved.am_id,
                    sdp_id,
                })
            }
            _ => {
                debug!(ucp = ucp.id, am = proved.am_id, "am rejected: negative trust");
                Ok(Verdict::Rejected {
                    reason: NEGATIVE_TRUST.to_string(),
                })
            }
        }
    }

    /// Settle a `PENDING` AM.
    pub fn validate_am(&self, am: &AuthMsgWrapper) -> Result<Verdict, NodeError> {
        let decoded = match decode_message(&am.raw_message) {
            Ok(decoded) => decoded,
            Err(e) => return self.mark_illegal(am, e.to_string()),
        };
        if decoded.auth.identity != am.identity || decoded.auth.upper_protocol != am.protocol_type {
            return self.mark_illegal(am, "envelope fields disagree with the raw message".to_string());
        }
        self.settle(am, &decoded)
    }

    fn mark_illegal(&self, am: &AuthMsgWrapper, reason: String) -> Result<Verdict, NodeError> {
        self.store.update_am_state(am.id, AuthMsgProcessState::MsgIllegal)?;
        warn!(am = am.id, domain = %am.domain, %reason, "illegal authenticated message");
        Ok(Verdict::Illegal { reason })
    }

    fn settle(&self, am: &AuthMsgWrapper, decoded: &DecodedMessage) -> Result<Verdict, NodeError> {
        if decoded.auth.trust_level == AuthMsgTrustLevel::NegativeTrust {
            self.store.update_am_state(am.id, AuthMsgProcessState::MsgRejected)?;
            debug!(am = am.id, "am rejected: negative trust");
            return Ok(Verdict::Rejected {
                reason: NEGATIVE_TRUST.to_string(),
            });
        }
        // The SDP row goes in first so a failure leaves the AM pending and retried.
        let sdp_id = self.extractor.extract(am, &decoded.sdp)?;
        self.store.update_am_state(am.id, AuthMsgProcessState::Proved)?;
        Ok(Verdict::Proved {
            am_id: am.id,
            sdp_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use xrelay_nullables::NullStore;
    use xrelay_types::{LedgerInfo, SdpMsgProcessState, UNORDERED_SEQUENCE};

    /// Vouches for every source, breaking the store on the first call.
    struct BreaksStoreOnce {
        store: Arc<NullStore>,
        armed: AtomicBool,
    }

    impl ProvenanceVerifier for BreaksStoreOnce {
        fn verify(
            &self,
            _ucp: &UniformCrosschainPacketContext,
            _message: &AuthMessage,
        ) -> Result<Provenance, NodeError> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.store.fail_with(Some("io error"));
            }
            Ok(Provenance::Proved)
        }
    }

    fn validator(fx: &Fixture, trusted: &[String]) -> MessageValidator {
        let verifier = Arc::new(DomainRegistryVerifier::new(fx.ctx.store.clone(), trusted).unwrap());
        MessageValidator::new(
            fx.ctx.store.clone(),
            verifier,
            SdpExtractor::new(fx.ctx.store.clone(), fx.ctx.metrics.clone()),
            fx.ctx.clock.clone(),
        )
    }

    fn ucp(fx: &Fixture, from: &str, raw: Vec<u8>) -> UniformCrosschainPacketContext {
        let mut ucp = UniformCrosschainPacketContext::new(
            None,
            domain(from),
            raw,
            vec![7, 7],
            LedgerInfo::default(),
            fx.ctx.clock.now(),
        );
        ucp.id = fx.store.put_ucps(std::slice::from_ref(&ucp)).unwrap()[0];
        ucp
    }

    #[test]
    fn managed_source_is_proved_and_extracted() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        fx.add_chain("a");
        let v = validator(&fx, &[]);
        let ucp = ucp(&fx, "a.domain", raw_am(AuthMsgTrustLevel::PositiveTrust, "b.domain", 0));

        let verdict = v.validate_ucp(&ucp).unwrap();
        let Verdict::Proved { am_id, sdp_id } = verdict else {
            panic!("expected proved, got {verdict:?}");
        };
        assert_eq!(fx.store.get_ucp(ucp.id).unwrap().unwrap().state, UcpProcessState::Proved);
        let am = fx.store.get_am(am_id).unwrap().unwrap();
        assert_eq!(am.state, AuthMsgProcessState::Proved);
        assert_eq!(am.ucp_id, Some(ucp.id));
        let sdp = fx.store.get_sdp(sdp_id).unwrap().unwrap();
        assert_eq!(sdp.state, SdpMsgProcessState::Pending);
        assert_eq!(sdp.receiver, Some(dest));
        assert_eq!(sdp.auth_msg_id, am_id);
    }

    #[test]
    fn unknown_source_is_rejected_unless_trusted() {
        let fx = Fixture::new();
        fx.add_chain("b");
        let raw = raw_am(AuthMsgTrustLevel::ZeroTrust, "b.domain", UNORDERED_SEQUENCE);

        let untrusted = validator(&fx, &[]);
        let first = ucp(&fx, "remote.domain", raw.clone());
        assert!(matches!(untrusted.validate_ucp(&first).unwrap(), Verdict::Rejected { .. }));
        assert_eq!(fx.store.get_ucp(first.id).unwrap().unwrap().state, UcpProcessState::Rejected);
        assert!(fx.store.all_ams().is_empty());

        let trusted = validator(&fx, &["remote.domain".to_string()]);
        let second = ucp(&fx, "remote.domain", raw);
        assert!(matches!(trusted.validate_ucp(&second).unwrap(), Verdict::Proved { .. }));
    }

    #[test]
    fn negative_trust_rejects_the_am() {
        let fx = Fixture::new();
        fx.add_chain("a");
        let v = validator(&fx, &[]);
        let ucp = ucp(&fx, "a.domain", raw_am(AuthMsgTrustLevel::NegativeTrust, "b.domain", 0));

        assert!(matches!(v.validate_ucp(&ucp).unwrap(), Verdict::Rejected { .. }));
        assert_eq!(fx.store.get_ucp(ucp.id).unwrap().unwrap().state, UcpProcessState::Proved);
        let ams = fx.store.all_ams();
        assert_eq!(ams.len(), 1);
        assert_eq!(ams[0].state, AuthMsgProcessState::MsgRejected);
        assert!(fx.store.all_sdps().is_empty());
    }

    #[test]
    fn store_failure_after_verification_leaves_ucp_pending() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        let verifier = Arc::new(BreaksStoreOnce {
            store: fx.store.clone(),
            armed: AtomicBool::new(true),
        });
        let v = MessageValidator::new(
            fx.ctx.store.clone(),
            verifier,
            SdpExtractor::new(fx.ctx.store.clone(), fx.ctx.metrics.clone()),
            fx.ctx.clock.clone(),
        );
        let ucp = ucp(&fx, "a.domain", raw_am(AuthMsgTrustLevel::PositiveTrust, "b.domain", 0));

        assert!(matches!(v.validate_ucp(&ucp), Err(NodeError::Store(_))));
        fx.store.fail_with(None);
        assert_eq!(fx.store.get_ucp(ucp.id).unwrap().unwrap().state, UcpProcessState::Pending);
        assert!(fx.store.all_ams().is_empty());
        assert!(fx.store.all_sdps().is_empty());

        let Verdict::Proved { am_id, sdp_id } = v.validate_ucp(&ucp).unwrap() else {
            panic!("retry should prove the ucp");
        };
        assert_eq!(fx.store.get_ucp(ucp.id).unwrap().unwrap().state, UcpProcessState::Proved);
        assert_eq!(fx.store.all_ams().len(), 1);
        let sdp = fx.store.get_sdp(sdp_id).unwrap().unwrap();
        assert_eq!(sdp.auth_msg_id, am_id);
        assert_eq!(sdp.receiver, Some(dest));
    }

    #[test]
    fn retry_of_a_proved_ucp_adds_no_rows() {
        let fx = Fixture::new();
        fx.add_chain("a");
        fx.add_chain("b");
        let v = validator(&fx, &[]);
        let ucp = ucp(&fx, "a.domain", raw_am(AuthMsgTrustLevel::ZeroTrust, "b.domain", 0));

        assert!(matches!(v.validate_ucp(&ucp).unwrap(), Verdict::Proved { .. }));
        assert!(matches!(
            v.validate_ucp(&ucp),
            Err(NodeError::Store(xrelay_store::StoreError::InvalidTransition { .. }))
        ));
        assert_eq!(fx.store.all_ams().len(), 1);
        assert_eq!(fx.store.all_sdps().len(), 1);
    }

    #[test]
    fn garbage_is_illegal() {
        let fx = Fixture::new();
        fx.add_chain("a");
        let v = validator(&fx, &[]);
        let ucp = ucp(&fx, "a.domain", vec![0xde, 0xad]);
        assert!(matches!(v.validate_ucp(&ucp).unwrap(), Verdict::Illegal { .. }));
        assert_eq!(fx.store.get_ucp(ucp.id).unwrap().unwrap().state, UcpProcessState::Rejected);
    }

    #[test]
    fn pending_am_with_mismatched_identity_is_illegal() {
        let fx = Fixture::new();
        let v = validator(&fx, &[]);
        let mut am = AuthMsgWrapper {
            id: 0,
            ucp_id: None,
            source: None,
            domain: domain("a.domain"),
            identity: receiver(),
            protocol_type: UpperProtocolType::Sdp,
            trust_level: AuthMsgTrustLevel::ZeroTrust,
            raw_message: raw_am(AuthMsgTrustLevel::ZeroTrust, "b.domain", 0),
            ledger_proof: vec![],
            state: AuthMsgProcessState::Pending,
            created_at: fx.ctx.clock.now(),
        };
        am.id = fx.store.put_ams(std::slice::from_ref(&am)).unwrap()[0];
        assert!(matches!(v.validate_am(&am).unwrap(), Verdict::Illegal { .. }));
        assert_eq!(fx.store.get_am(am.id).unwrap().unwrap().state, AuthMsgProcessState::MsgIllegal);
    }
}
