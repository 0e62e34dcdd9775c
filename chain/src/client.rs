//! Method contracts the pipeline needs from a blockchain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use xrelay_types::{ChainKey, CrossChainDomain, Identity, LedgerInfo, Timestamp, UpperProtocolType};

use crate::ChainError;

/// Receipt of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainReceipt {
    pub tx_hash: String,
    /// The transaction reached finality; `successful` is meaningful only then.
    pub confirmed: bool,
    pub successful: bool,
    pub error_msg: Option<String>,
    pub tx_timestamp: Timestamp,
}

impl CrossChainReceipt {
    /// Receipt of a transaction that was accepted but is not final yet.
    pub fn pending(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            confirmed: false,
            successful: false,
            error_msg: None,
            tx_timestamp: Timestamp::EPOCH,
        }
    }
}

/// One cross-chain message found in a block, with its ledger proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainMessage {
    /// Encoded AuthMessage.
    pub message: Vec<u8>,
    pub proof: Vec<u8>,
    pub ledger: LedgerInfo,
}

/// The authenticated-message contract deployed on a chain.
#[async_trait]
pub trait AmClient: Send + Sync {
    /// Submit relay proofs; returns the receipt of the submitted transaction.
    async fn relay(&self, proofs: &[u8], service_id: &str) -> Result<CrossChainReceipt, ChainError>;

    /// Register an upper-protocol contract on the AM contract.
    async fn set_protocol(
        &self,
        protocol_contract: &str,
        protocol: UpperProtocolType,
    ) -> Result<(), ChainError>;

    /// Deploy the AM contract; returns its address.
    async fn deploy_am_contract(&self) -> Result<String, ChainError>;

    async fn parse_incoming_messages(&self, height: u64) -> Result<Vec<CrossChainMessage>, ChainError>;
}

/// The SDP contract deployed on a chain.
#[async_trait]
pub trait SdpClient: Send + Sync {
    async fn set_am_contract(&self, am_contract: &str) -> Result<(), ChainError>;

    /// Next expected sequence of the ordered channel between the two endpoints.
    async fn query_sequence_on_chain(
        &self,
        sender_domain: &CrossChainDomain,
        sender: &Identity,
        receiver_domain: &CrossChainDomain,
        receiver: &Identity,
    ) -> Result<u32, ChainError>;

    /// Deploy the SDP contract; returns its address.
    async fn deploy_sdp_contract(&self) -> Result<String, ChainError>;
}

/// Full client of one managed chain.
#[async_trait]
pub trait ChainClient: AmClient + SdpClient {
    fn chain(&self) -> &ChainKey;

    async fn query_latest_height(&self) -> Result<u64, ChainError>;

    async fn query_receipt(&self, tx_hash: &str) -> Result<CrossChainReceipt, ChainError>;

    /// Release connections. Called when the client is dropped from the pool.
    async fn shutdown(&self) {}
}
