//! Metadata of a managed blockchain.

use serde::{Deserialize, Serialize};

use crate::{ChainKey, CrossChainDomain};

code_enum! {
    /// Administrative lifecycle state of a managed blockchain.
    pub enum BlockchainState {
        /// Registered, not serving yet.
        Init => "INIT",
        /// Serving: eligible for scheduling.
        Running => "RUNNING",
        /// Administratively stopped; resources are reclaimed by the cleaner.
        Stop => "STOP",
    }
}

code_enum! {
    /// Progress of the bridging-contract deployment on a blockchain.
    pub enum DeployStatus {
        Init => "INIT",
        Finished => "DEPLOY_FINISHED",
    }
}

/// Runtime properties of a managed blockchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainProperties {
    pub state: BlockchainState,
    /// Plugin server that knows how to talk to this chain.
    pub plugin_server_id: String,
    pub am_client_contract_address: Option<String>,
    pub sdp_msg_contract_address: Option<String>,
    pub deploy_status: DeployStatus,
    /// Height the anchor starts syncing from when no height is stored; 0 means "latest".
    pub init_block_height: u64,
}

impl BlockchainProperties {
    pub fn new(plugin_server_id: impl Into<String>) -> Self {
        Self {
            state: BlockchainState::Init,
            plugin_server_id: plugin_server_id.into(),
            am_client_contract_address: None,
            sdp_msg_contract_address: None,
            deploy_status: DeployStatus::Init,
            init_block_height: 0,
        }
    }
}

/// One managed chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainMeta {
    pub chain: ChainKey,
    pub alias: String,
    pub domain: CrossChainDomain,
    pub desc: String,
    pub properties: BlockchainProperties,
}

impl BlockchainMeta {
    pub fn new(chain: ChainKey, domain: CrossChainDomain, plugin_server_id: &str) -> Self {
        Self {
            alias: chain.blockchain_id.clone(),
            chain,
            domain,
            desc: String::new(),
            properties: BlockchainProperties::new(plugin_server_id),
        }
    }

    pub fn is_serving(&self) -> bool {
        self.properties.state == BlockchainState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.properties.state == BlockchainState::Stop
    }

    pub fn is_deployed(&self) -> bool {
        self.properties.deploy_status == DeployStatus::Finished
    }
}
