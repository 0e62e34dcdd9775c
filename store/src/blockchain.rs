//! Blockchain metadata storage trait.

use crate::StoreError;
use xrelay_types::{
    BlockchainMeta, BlockchainProperties, BlockchainState, ChainKey, CrossChainDomain,
    DeployStatus,
};

/// Deployment progress to record on one chain. `None` fields keep their
/// stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployUpdate {
    pub am_contract: Option<String>,
    pub sdp_contract: Option<String>,
    pub status: Option<DeployStatus>,
}

impl DeployUpdate {
    pub fn apply(&self, properties: &mut BlockchainProperties) {
        if let Some(address) = &self.am_contract {
            properties.am_client_contract_address = Some(address.clone());
        }
        if let Some(address) = &self.sdp_contract {
            properties.sdp_msg_contract_address = Some(address.clone());
        }
        if let Some(status) = self.status {
            properties.deploy_status = status;
        }
    }
}

/// Managed blockchains and their anchor progress.
pub trait BlockchainStore {
    /// Insert or replace the metadata of one chain.
    fn save_blockchain_meta(&self, meta: &BlockchainMeta) -> Result<(), StoreError>;

    fn get_blockchain_meta(&self, chain: &ChainKey) -> Result<Option<BlockchainMeta>, StoreError>;

    /// Apply `update` to the stored metadata of `chain` in one write,
    /// keeping every other field (notably the lifecycle state) as stored.
    fn update_deploy_progress(&self, chain: &ChainKey, update: &DeployUpdate) -> Result<(), StoreError>;

    fn get_all_blockchain_meta(&self) -> Result<Vec<BlockchainMeta>, StoreError>;

    fn get_blockchain_meta_by_domain(
        &self,
        domain: &CrossChainDomain,
    ) -> Result<Option<BlockchainMeta>, StoreError> {
        Ok(self
            .get_all_blockchain_meta()?
            .into_iter()
            .find(|meta| &meta.domain == domain))
    }

    fn get_blockchains_by_state(
        &self,
        state: BlockchainState,
    ) -> Result<Vec<BlockchainMeta>, StoreError> {
        Ok(self
            .get_all_blockchain_meta()?
            .into_iter()
            .filter(|meta| meta.properties.state == state)
            .collect())
    }

    /// Last block height whose cross-chain messages were fully persisted.
    fn get_anchor_height(&self, chain: &ChainKey) -> Result<Option<u64>, StoreError>;

    fn set_anchor_height(&self, chain: &ChainKey, height: u64) -> Result<(), StoreError>;
}
