//! Per-chain client cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use xrelay_types::{BlockchainMeta, ChainKey};

use crate::{ChainClient, ChainError};

/// Builds a client for one managed chain.
#[async_trait]
pub trait ChainClientFactory: Send + Sync {
    async fn create(&self, meta: &BlockchainMeta) -> Result<Arc<dyn ChainClient>, ChainError>;
}

/// Lazily created, shared chain clients keyed by chain.
pub struct ChainClientPool {
    factory: Arc<dyn ChainClientFactory>,
    clients: RwLock<HashMap<ChainKey, Arc<dyn ChainClient>>>,
}

impl ChainClientPool {
    pub fn new(factory: Arc<dyn ChainClientFactory>) -> Self {
        Self {
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, chain: &ChainKey) -> Option<Arc<dyn ChainClient>> {
        self.clients.read().await.get(chain).cloned()
    }

    /// Return the cached client or create one. When two callers race, the
    /// first inserted client wins and the other is discarded.
    pub async fn get_or_create(&self, meta: &BlockchainMeta) -> Result<Arc<dyn ChainClient>, ChainError> {
        if let Some(client) = self.get(&meta.chain).await {
            return Ok(client);
        }
        let created = self.factory.create(meta).await?;
        let mut clients = self.clients.write().await;
        let client = clients
            .entry(meta.chain.clone())
            .or_insert_with(|| {
                debug!(chain = %meta.chain, "chain client created");
                created
            })
            .clone();
        Ok(client)
    }

    /// Drop and shut down the client of `chain`. Returns whether one existed.
    pub async fn remove(&self, chain: &ChainKey) -> bool {
        let removed = self.clients.write().await.remove(chain);
        match removed {
            Some(client) => {
                client.shutdown().await;
                info!(chain = %chain, "chain client released");
                true
            }
            None => false,
        }
    }

    pub async fn chains(&self) -> Vec<ChainKey> {
        let mut chains: Vec<_> = self.clients.read().await.keys().cloned().collect();
        chains.sort();
        chains
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}
