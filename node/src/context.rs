//! Shared handles of the pipeline services.

use std::sync::Arc;

use xrelay_chain::{ChainClient, ChainClientPool};
use xrelay_store::{BlockchainStore, RelayerStore};
use xrelay_types::{BlockchainMeta, ChainKey};
use xrelay_utils::Clock;

use crate::config::PipelineConfig;
use crate::{NodeError, RelayerMetrics};

/// Everything a pipeline service reads or writes, built once by the
/// [`Relayer`](crate::Relayer) and cloned into each service.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn RelayerStore>,
    pub clients: Arc<ChainClientPool>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<RelayerMetrics>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Metadata of a managed chain, or `UnknownBlockchain`.
    pub fn blockchain(&self, chain: &ChainKey) -> Result<BlockchainMeta, NodeError> {
        self.store
            .get_blockchain_meta(chain)?
            .ok_or_else(|| NodeError::UnknownBlockchain(chain.to_string()))
    }

    /// The pooled client of a managed chain, created on first use.
    pub async fn client(&self, chain: &ChainKey) -> Result<Arc<dyn ChainClient>, NodeError> {
        if let Some(client) = self.clients.get(chain).await {
            return Ok(client);
        }
        let meta = self.blockchain(chain)?;
        Ok(self.clients.get_or_create(&meta).await?)
    }
}
