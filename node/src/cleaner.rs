//! Resource reclamation for stopped blockchains.

use std::sync::Arc;

use tracing::info;
use xrelay_chain::{ChainClientPool, PluginRegistry};
use xrelay_store::{BlockchainStore, RelayerStore, ScheduleStore};
use xrelay_types::{BlockchainState, PluginServerState};

use crate::NodeError;

pub struct Cleaner {
    store: Arc<dyn RelayerStore>,
    clients: Arc<ChainClientPool>,
    plugins: Arc<dyn PluginRegistry>,
}

impl Cleaner {
    pub fn new(
        store: Arc<dyn RelayerStore>,
        clients: Arc<ChainClientPool>,
        plugins: Arc<dyn PluginRegistry>,
    ) -> Self {
        Self {
            store,
            clients,
            plugins,
        }
    }

    /// Drop the clients and leases of `STOP` chains, and the clients of
    /// chains whose plugin server was stopped. Returns the clients released.
    pub async fn clean(&self) -> Result<usize, NodeError> {
        let mut released = 0;
        for meta in self.store.get_blockchains_by_state(BlockchainState::Stop)? {
            if self.clients.remove(&meta.chain).await {
                released += 1;
            }
            let leases = self.store.remove_distributed_tasks(&meta.chain)?;
            if leases > 0 {
                info!(chain = %meta.chain, leases, "leases of stopped chain removed");
            }
        }
        for chain in self.clients.chains().await {
            let Some(meta) = self.store.get_blockchain_meta(&chain)? else {
                continue;
            };
            if self.plugins.plugin_state(&meta.properties.plugin_server_id) == PluginServerState::Stopped
                && self.clients.remove(&chain).await
            {
                released += 1;
            }
        }
        Ok(released)
    }
}
