//! Message-pool records: UCP, AM and SDP rows plus commit results.
//!
//! Row ids are assigned by the repository on insertion; records built in
//! memory carry `id == 0` until persisted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    AuthMsgProcessState, AuthMsgTrustLevel, ChainKey, CrossChainDomain, Identity,
    SdpMsgProcessState, Timestamp, UcpProcessState, UpperProtocolType,
};

/// Sequence value marking an SDP message as unordered.
pub const UNORDERED_SEQUENCE: u32 = u32::MAX;

/// Where on the source ledger a message was observed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub height: u64,
    pub block_hash: String,
    pub tx_hash: String,
    pub timestamp: Timestamp,
}

/// Provenance-wrapped raw message awaiting proof before AM extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformCrosschainPacketContext {
    pub id: u64,
    /// Content identifier: hex SHA-256 over domain, message and proof.
    pub ucp_id: String,
    /// Local chain the packet was observed on; `None` for off-chain submissions.
    pub source: Option<ChainKey>,
    pub src_domain: CrossChainDomain,
    /// Encoded AuthMessage.
    pub raw_message: Vec<u8>,
    pub proof: Vec<u8>,
    pub ledger_info: LedgerInfo,
    pub from_off_chain: bool,
    pub state: UcpProcessState,
    pub created_at: Timestamp,
}

impl UniformCrosschainPacketContext {
    pub fn new(
        source: Option<ChainKey>,
        src_domain: CrossChainDomain,
        raw_message: Vec<u8>,
        proof: Vec<u8>,
        ledger_info: LedgerInfo,
        created_at: Timestamp,
    ) -> Self {
        let ucp_id = Self::compute_id(&src_domain, &raw_message, &proof);
        Self {
            id: 0,
            ucp_id,
            from_off_chain: source.is_none(),
            source,
            src_domain,
            raw_message,
            proof,
            ledger_info,
            state: UcpProcessState::Pending,
            created_at,
        }
    }

    fn compute_id(domain: &CrossChainDomain, raw_message: &[u8], proof: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update((domain.as_bytes().len() as u32).to_be_bytes());
        hasher.update(domain.as_bytes());
        hasher.update((raw_message.len() as u32).to_be_bytes());
        hasher.update(raw_message);
        hasher.update(proof);
        hex::encode(hasher.finalize())
    }
}

/// One cross-chain authenticated message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMsgWrapper {
    pub id: u64,
    /// Back-reference to the UCP this AM was extracted from, if any.
    pub ucp_id: Option<u64>,
    /// Local chain the AM was observed on; `None` for off-chain submissions.
    pub source: Option<ChainKey>,
    pub domain: CrossChainDomain,
    /// Sender contract on the source chain.
    pub identity: Identity,
    pub protocol_type: UpperProtocolType,
    pub trust_level: AuthMsgTrustLevel,
    /// Encoded AuthMessage.
    pub raw_message: Vec<u8>,
    pub ledger_proof: Vec<u8>,
    pub state: AuthMsgProcessState,
    pub created_at: Timestamp,
}

/// Upper-layer message derived from an AM, addressed to one receiver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpMsgWrapper {
    pub id: u64,
    /// Back-reference to the parent AM (always created first).
    pub auth_msg_id: u64,
    pub sender_domain: CrossChainDomain,
    pub sender_identity: Identity,
    pub receiver_domain: CrossChainDomain,
    pub receiver_identity: Identity,
    /// Locally managed receiver chain; `None` while remote-pending.
    pub receiver: Option<ChainKey>,
    pub msg_sequence: u32,
    pub payload: Vec<u8>,
    pub state: SdpMsgProcessState,
    pub tx_hash: Option<String>,
    pub tx_success: bool,
    pub tx_fail_reason: Option<String>,
    pub committed_at: Option<Timestamp>,
    pub confirmed_at: Option<Timestamp>,
}

impl SdpMsgWrapper {
    pub fn is_unordered(&self) -> bool {
        self.msg_sequence == UNORDERED_SEQUENCE
    }
}

/// Confirmed outcome of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpMsgCommitResult {
    pub receiver: ChainKey,
    pub tx_hash: String,
    pub success: bool,
    pub fail_reason: Option<String>,
    pub tx_timestamp: Timestamp,
}

impl SdpMsgCommitResult {
    pub fn final_state(&self) -> SdpMsgProcessState {
        if self.success {
            SdpMsgProcessState::TxSuccess
        } else {
            SdpMsgProcessState::TxFailed
        }
    }
}
