//! The Confirm task: resolves submitted SDP messages from their receipts.
//!
//! Receipts of one batch are queried concurrently. Only confirmed receipts
//! are applied, in one batch; unconfirmed messages stay `TX_PENDING` for the
//! next run. A failing query only affects its own message.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn, Instrument};
use xrelay_chain::ChainClient;
use xrelay_store::CrossChainMessageStore;
use xrelay_types::{ChainKey, SdpMsgCommitResult, SdpMsgProcessState};

use crate::executor::BlockchainTask;
use crate::tracing_spans::confirm_batch_span;
use crate::{NodeError, PipelineContext};

/// Counts of one Confirm run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfirmSummary {
    pub queried: usize,
    pub confirmed: usize,
    pub query_failures: usize,
    /// Rows actually changed by the batch apply.
    pub applied: usize,
}

pub struct ConfirmService {
    ctx: PipelineContext,
}

impl ConfirmService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn confirm_chain(&self, chain: &ChainKey) -> Result<ConfirmSummary, NodeError> {
        let pending = self.ctx.store.get_sdps_by_state(
            chain,
            SdpMsgProcessState::TxPending,
            self.ctx.config.confirm_batch_size,
        )?;
        let mut summary = ConfirmSummary {
            queried: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(summary);
        }
        let client = self.ctx.client(chain).await?;
        let span = confirm_batch_span(chain, pending.len());

        let hashes: Vec<(u64, String)> = pending
            .into_iter()
            .filter_map(|sdp| match sdp.tx_hash {
                Some(hash) => Some((sdp.id, hash)),
                None => {
                    warn!(sdp = sdp.id, "tx-pending message without tx hash");
                    None
                }
            })
            .collect();

        let receipts = stream::iter(hashes)
            .map(|(id, hash)| {
                let client = client.clone();
                async move {
                    let receipt = client.query_receipt(&hash).await;
                    (id, receipt)
                }
            })
            .buffer_unordered(self.ctx.config.confirm_concurrency.max(1))
            .collect::<Vec<_>>()
            .instrument(span)
            .await;

        let mut results = Vec::new();
        for (id, receipt) in receipts {
            match receipt {
                Ok(receipt) if receipt.confirmed => results.push(SdpMsgCommitResult {
                    receiver: chain.clone(),
                    tx_hash: receipt.tx_hash,
                    success: receipt.successful,
                    fail_reason: receipt.error_msg,
                    tx_timestamp: receipt.tx_timestamp,
                }),
                Ok(_) => {}
                Err(e) => {
                    summary.query_failures += 1;
                    warn!(sdp = id, error = %e, "receipt query failed");
                }
            }
        }
        summary.confirmed = results.len();
        if results.is_empty() {
            return Ok(summary);
        }

        summary.applied = self.ctx.store.apply_commit_results(&results)?;
        for result in &results {
            let outcome = if result.success { "success" } else { "failure" };
            self.ctx.metrics.sdp_confirmed.with_label_values(&[outcome]).inc();
        }
        Ok(summary)
    }
}

#[async_trait]
impl BlockchainTask for ConfirmService {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError> {
        let summary = self.confirm_chain(chain).await?;
        if summary.queried > 0 {
            debug!(
                chain = %chain,
                queried = summary.queried,
                confirmed = summary.confirmed,
                applied = summary.applied,
                query_failures = summary.query_failures,
                "confirm run finished"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use xrelay_chain::CrossChainReceipt;
    use xrelay_store::SdpCommitUpdate;
    use xrelay_types::{
        AuthMsgProcessState, AuthMsgTrustLevel, AuthMsgWrapper, SdpMsgWrapper, Timestamp,
        UpperProtocolType, UNORDERED_SEQUENCE,
    };
    use xrelay_utils::Clock;

    /// Seed `n` TX_PENDING messages with hashes `0xt1`, `0xt2`, ...
    fn seed(fx: &Fixture, dest: &ChainKey, n: usize) -> Vec<u64> {
        let am = AuthMsgWrapper {
            id: 0,
            ucp_id: None,
            source: None,
            domain: domain("a.domain"),
            identity: sender(),
            protocol_type: UpperProtocolType::Sdp,
            trust_level: AuthMsgTrustLevel::PositiveTrust,
            raw_message: vec![],
            ledger_proof: vec![],
            state: AuthMsgProcessState::Proved,
            created_at: fx.ctx.clock.now(),
        };
        let am_id = fx.store.put_ams(&[am]).unwrap()[0];
        (1..=n)
            .map(|i| {
                let id = fx
                    .store
                    .put_sdp(&SdpMsgWrapper {
                        id: 0,
                        auth_msg_id: am_id,
                        sender_domain: domain("a.domain"),
                        sender_identity: sender(),
                        receiver_domain: domain("b.domain"),
                        receiver_identity: receiver(),
                        receiver: Some(dest.clone()),
                        msg_sequence: UNORDERED_SEQUENCE,
                        payload: vec![],
                        state: SdpMsgProcessState::Pending,
                        tx_hash: None,
                        tx_success: false,
                        tx_fail_reason: None,
                        committed_at: None,
                        confirmed_at: None,
                    })
                    .unwrap();
                fx.store
                    .update_sdp_commit(
                        id,
                        &SdpCommitUpdate {
                            state: SdpMsgProcessState::TxPending,
                            tx_hash: Some(format!("0xt{i}")),
                            fail_reason: None,
                            committed_at: fx.ctx.clock.now(),
                        },
                    )
                    .unwrap();
                id
            })
            .collect()
    }

    fn confirmed(hash: &str, successful: bool) -> CrossChainReceipt {
        CrossChainReceipt {
            tx_hash: hash.to_string(),
            confirmed: true,
            successful,
            error_msg: (!successful).then(|| "reverted".to_string()),
            tx_timestamp: Timestamp::new(42),
        }
    }

    fn state(fx: &Fixture, id: u64) -> SdpMsgProcessState {
        fx.store.get_sdp(id).unwrap().unwrap().state
    }

    #[tokio::test]
    async fn only_confirmed_receipts_are_applied() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        let ids = seed(&fx, &dest, 5);
        let client = fx.factory.client(&dest);
        client.set_receipt(confirmed("0xt1", true));
        client.set_receipt(confirmed("0xt2", true));
        client.set_receipt(confirmed("0xt3", false));

        let summary = ConfirmService::new(fx.ctx.clone()).confirm_chain(&dest).await.unwrap();
        assert_eq!(summary.queried, 5);
        assert_eq!(summary.confirmed, 3);
        assert_eq!(summary.applied, 3);

        assert_eq!(state(&fx, ids[0]), SdpMsgProcessState::TxSuccess);
        assert_eq!(state(&fx, ids[1]), SdpMsgProcessState::TxSuccess);
        assert_eq!(state(&fx, ids[2]), SdpMsgProcessState::TxFailed);
        assert_eq!(state(&fx, ids[3]), SdpMsgProcessState::TxPending);
        assert_eq!(state(&fx, ids[4]), SdpMsgProcessState::TxPending);

        let failed = fx.store.get_sdp(ids[2]).unwrap().unwrap();
        assert_eq!(failed.tx_fail_reason.as_deref(), Some("reverted"));
        assert_eq!(failed.confirmed_at, Some(Timestamp::new(42)));
    }

    #[tokio::test]
    async fn one_failing_query_does_not_block_the_batch() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        let ids = seed(&fx, &dest, 3);
        let client = fx.factory.client(&dest);
        client.fail_receipt("0xt1", "node timeout");
        client.set_receipt(confirmed("0xt2", true));
        client.set_receipt(confirmed("0xt3", true));

        let summary = ConfirmService::new(fx.ctx.clone()).confirm_chain(&dest).await.unwrap();
        assert_eq!(summary.query_failures, 1);
        assert_eq!(summary.applied, 2);
        assert_eq!(state(&fx, ids[0]), SdpMsgProcessState::TxPending);
    }

    #[tokio::test]
    async fn reapplying_a_result_is_a_no_op() {
        let fx = Fixture::new();
        let dest = fx.add_chain("b");
        let ids = seed(&fx, &dest, 1);
        fx.factory.client(&dest).set_receipt(confirmed("0xt1", true));
        let service = ConfirmService::new(fx.ctx.clone());
        assert_eq!(service.confirm_chain(&dest).await.unwrap().applied, 1);

        let again = SdpMsgCommitResult {
            receiver: dest.clone(),
            tx_hash: "0xt1".into(),
            success: false,
            fail_reason: None,
            tx_timestamp: Timestamp::new(99),
        };
        assert_eq!(fx.store.apply_commit_results(&[again]).unwrap(), 0);
        assert_eq!(state(&fx, ids[0]), SdpMsgProcessState::TxSuccess);
    }
}
