//! The Deploy task: brings a chain's bridging contracts up.

use async_trait::async_trait;
use tracing::info;
use xrelay_chain::{AmClient, SdpClient};
use xrelay_store::{BlockchainStore, DeployUpdate};
use xrelay_types::{ChainKey, DeployStatus, UpperProtocolType};

use crate::executor::BlockchainTask;
use crate::{NodeError, PipelineContext};

pub struct DeployService {
    ctx: PipelineContext,
}

impl DeployService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Advance deployment of `chain`. Each contract address is recorded as
    /// soon as it is known, so a failed run resumes where it stopped. Only
    /// the deploy fields are written; the lifecycle state is left to whoever
    /// changed it while the remote calls were in flight.
    pub async fn deploy_chain(&self, chain: &ChainKey) -> Result<(), NodeError> {
        let meta = self.ctx.blockchain(chain)?;
        if meta.is_deployed() {
            return Ok(());
        }
        let client = self.ctx.client(chain).await?;
        let store = &self.ctx.store;

        let am = match meta.properties.am_client_contract_address {
            Some(address) => address,
            None => {
                let address = client.deploy_am_contract().await?;
                info!(chain = %chain, %address, "am contract deployed");
                let update = DeployUpdate {
                    am_contract: Some(address.clone()),
                    ..Default::default()
                };
                store.update_deploy_progress(chain, &update)?;
                address
            }
        };
        let sdp = match meta.properties.sdp_msg_contract_address {
            Some(address) => address,
            None => {
                let address = client.deploy_sdp_contract().await?;
                info!(chain = %chain, %address, "sdp contract deployed");
                let update = DeployUpdate {
                    sdp_contract: Some(address.clone()),
                    ..Default::default()
                };
                store.update_deploy_progress(chain, &update)?;
                address
            }
        };

        client.set_protocol(&sdp, UpperProtocolType::Sdp).await?;
        client.set_am_contract(&am).await?;

        let finished = DeployUpdate {
            status: Some(DeployStatus::Finished),
            ..Default::default()
        };
        store.update_deploy_progress(chain, &finished)?;
        info!(chain = %chain, "bridging contracts ready");
        Ok(())
    }
}

#[async_trait]
impl BlockchainTask for DeployService {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError> {
        self.deploy_chain(chain).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use xrelay_types::BlockchainState;

    #[tokio::test]
    async fn deploys_and_wires_both_contracts() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        DeployService::new(fx.ctx.clone()).deploy_chain(&a).await.unwrap();

        let meta = fx.ctx.blockchain(&a).unwrap();
        assert!(meta.is_deployed());
        assert_eq!(meta.properties.am_client_contract_address.as_deref(), Some("am@testchain:a"));
        assert_eq!(meta.properties.sdp_msg_contract_address.as_deref(), Some("sdp@testchain:a"));
        assert_eq!(
            fx.factory.client(&a).calls(),
            vec![
                "deploy_am_contract".to_string(),
                "deploy_sdp_contract".to_string(),
                "set_protocol:sdp@testchain:a:SDP".to_string(),
                "set_am_contract:am@testchain:a".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stop_during_deploy_is_kept() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        let store = fx.store.clone();
        let chain = a.clone();
        fx.factory.client(&a).on_deploy(move || {
            let mut meta = store.get_blockchain_meta(&chain).unwrap().unwrap();
            meta.properties.state = BlockchainState::Stop;
            store.save_blockchain_meta(&meta).unwrap();
        });

        DeployService::new(fx.ctx.clone()).deploy_chain(&a).await.unwrap();

        let meta = fx.ctx.blockchain(&a).unwrap();
        assert_eq!(meta.properties.state, BlockchainState::Stop);
        assert!(meta.is_deployed());
        assert_eq!(meta.properties.am_client_contract_address.as_deref(), Some("am@testchain:a"));
    }

    #[tokio::test]
    async fn failure_leaves_status_init_and_resumes() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        let mut meta = fx.ctx.blockchain(&a).unwrap();
        meta.properties.am_client_contract_address = Some("am-existing".into());
        fx.store.save_blockchain_meta(&meta).unwrap();
        let client = fx.factory.client(&a);
        client.fail_deploy(Some("insufficient funds"));

        let service = DeployService::new(fx.ctx.clone());
        assert!(service.deploy_chain(&a).await.is_err());
        assert_eq!(fx.ctx.blockchain(&a).unwrap().properties.deploy_status, DeployStatus::Init);

        client.fail_deploy(None);
        service.deploy_chain(&a).await.unwrap();
        let calls = client.calls();
        assert!(!calls.contains(&"deploy_am_contract".to_string()));
        assert!(calls.contains(&"set_am_contract:am-existing".to_string()));
    }
}
