//! The Anchor task: block sync of one chain.
//!
//! Each run reads the incoming cross-chain messages of up to
//! `anchor_max_blocks_per_round` heights past the stored anchor and inserts
//! them as UCPs. The anchor advances height by height, only once that
//! height's messages are persisted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, Instrument};
use xrelay_chain::{AmClient, ChainClient};
use xrelay_store::BlockchainStore;
use xrelay_types::{ChainKey, UniformCrosschainPacketContext};

use crate::executor::BlockchainTask;
use crate::receiver::Receiver;
use crate::tracing_spans::anchor_span;
use crate::{NodeError, PipelineContext};

pub struct AnchorService {
    ctx: PipelineContext,
    receiver: Arc<Receiver>,
}

impl AnchorService {
    pub fn new(ctx: PipelineContext, receiver: Arc<Receiver>) -> Self {
        Self { ctx, receiver }
    }

    /// Sync one round. Returns the heights processed.
    pub async fn sync_chain(&self, chain: &ChainKey) -> Result<u64, NodeError> {
        let meta = self.ctx.blockchain(chain)?;
        let client = self.ctx.client(chain).await?;
        let latest = client.query_latest_height().await?;

        let start = match self.ctx.store.get_anchor_height(chain)? {
            Some(height) => height + 1,
            None if meta.properties.init_block_height == 0 => latest,
            None => meta.properties.init_block_height,
        };
        if start > latest {
            return Ok(0);
        }
        let rounds = self.ctx.config.anchor_max_blocks_per_round.max(1);
        let end = latest.min(start.saturating_add(rounds - 1));

        for height in start..=end {
            async {
                let messages = client.parse_incoming_messages(height).await?;
                if !messages.is_empty() {
                    let now = self.ctx.clock.now();
                    let ucps: Vec<_> = messages
                        .into_iter()
                        .map(|m| {
                            UniformCrosschainPacketContext::new(
                                Some(chain.clone()),
                                meta.domain.clone(),
                                m.message,
                                m.proof,
                                m.ledger,
                                now,
                            )
                        })
                        .collect();
                    let ids = self.receiver.receive_ucp(&ucps)?;
                    debug!(count = ids.len(), "messages anchored");
                }
                self.ctx.store.set_anchor_height(chain, height)?;
                Ok::<_, NodeError>(())
            }
            .instrument(anchor_span(chain, height))
            .await?;
        }
        Ok(end - start + 1)
    }
}

#[async_trait]
impl BlockchainTask for AnchorService {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError> {
        self.sync_chain(chain).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use crate::process::SdpExtractor;
    use crate::validator::{DomainRegistryVerifier, MessageValidator};
    use xrelay_chain::CrossChainMessage;
    use xrelay_store::CrossChainMessageStore;
    use xrelay_types::{LedgerInfo, UcpProcessState};

    fn service(fx: &Fixture) -> AnchorService {
        let store = fx.ctx.store.clone();
        let validator = MessageValidator::new(
            store.clone(),
            Arc::new(DomainRegistryVerifier::new(store.clone(), &[]).unwrap()),
            SdpExtractor::new(store, fx.ctx.metrics.clone()),
            fx.ctx.clock.clone(),
        );
        let receiver = Arc::new(Receiver::new(fx.ctx.clone(), Arc::new(validator)));
        AnchorService::new(fx.ctx.clone(), receiver)
    }

    fn message(height: u64) -> CrossChainMessage {
        CrossChainMessage {
            message: vec![height as u8],
            proof: vec![0xff],
            ledger: LedgerInfo {
                height,
                ..LedgerInfo::default()
            },
        }
    }

    #[tokio::test]
    async fn first_run_starts_at_the_latest_height() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        let client = fx.factory.client(&a);
        client.set_latest_height(100);
        client.add_messages(100, vec![message(100)]);

        assert_eq!(service(&fx).sync_chain(&a).await.unwrap(), 1);
        assert_eq!(fx.store.get_anchor_height(&a).unwrap(), Some(100));
        let ucps = fx.store.get_pending_ucps(&a, 10).unwrap();
        assert_eq!(ucps.len(), 1);
        assert_eq!(ucps[0].src_domain, domain("a.domain"));
        assert_eq!(ucps[0].state, UcpProcessState::Pending);
        assert!(!ucps[0].from_off_chain);
    }

    #[tokio::test]
    async fn catch_up_is_bounded_per_round() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        fx.store.set_anchor_height(&a, 10).unwrap();
        let client = fx.factory.client(&a);
        client.set_latest_height(100);
        client.add_messages(12, vec![message(12), message(12)]);

        let anchor = service(&fx);
        assert_eq!(anchor.sync_chain(&a).await.unwrap(), 16);
        assert_eq!(fx.store.get_anchor_height(&a).unwrap(), Some(26));
        assert_eq!(fx.store.all_ucps().len(), 2);

        client.set_latest_height(26);
        assert_eq!(anchor.sync_chain(&a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn init_block_height_is_honoured() {
        let fx = Fixture::new();
        let a = fx.add_chain("a");
        let mut meta = fx.ctx.blockchain(&a).unwrap();
        meta.properties.init_block_height = 95;
        fx.store.save_blockchain_meta(&meta).unwrap();
        fx.factory.client(&a).set_latest_height(97);

        assert_eq!(service(&fx).sync_chain(&a).await.unwrap(), 3);
        assert!(fx
            .factory
            .client(&a)
            .calls()
            .contains(&"parse_incoming_messages:95".to_string()));
    }
}
