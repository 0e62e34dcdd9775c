//! The Commit task: submits `PENDING` SDP messages addressed to one chain.

use async_trait::async_trait;
use tracing::{debug, warn};
use xrelay_chain::{relay_envelope, ChainClient, ProofBundle, RelayEnvelope, SdpClient};
use xrelay_store::{CrossChainMessageStore, SdpCommitUpdate};
use xrelay_types::{ChainKey, SdpMsgProcessState, SdpMsgWrapper};

use crate::executor::BlockchainTask;
use crate::{NodeError, PipelineContext};

/// Counts of one Commit run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub submitted: usize,
    pub failed: usize,
    /// Ordered messages left pending: not due yet, or their expected
    /// sequence could not be read.
    pub deferred: usize,
}

pub struct Committer {
    ctx: PipelineContext,
}

impl Committer {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn commit_chain(&self, chain: &ChainKey) -> Result<CommitSummary, NodeError> {
        let mut summary = CommitSummary::default();
        let pending = self.ctx.store.get_sdps_by_state(
            chain,
            SdpMsgProcessState::Pending,
            self.ctx.config.commit_batch_size,
        )?;
        if pending.is_empty() {
            return Ok(summary);
        }
        let client = self.ctx.client(chain).await?;

        for sdp in pending {
            if !sdp.is_unordered() {
                let queried = client
                    .query_sequence_on_chain(
                        &sdp.sender_domain,
                        &sdp.sender_identity,
                        &sdp.receiver_domain,
                        &sdp.receiver_identity,
                    )
                    .await;
                let expected = match queried {
                    Ok(expected) => expected,
                    Err(e) => {
                        warn!(sdp = sdp.id, from = %sdp.sender_domain, error = %e, "sequence query failed, retrying next run");
                        summary.deferred += 1;
                        continue;
                    }
                };
                if expected != sdp.msg_sequence {
                    debug!(sdp = sdp.id, expected, sequence = sdp.msg_sequence, "ordered message not due yet");
                    summary.deferred += 1;
                    continue;
                }
            }
            if self.commit_one(client.as_ref(), &sdp).await? {
                summary.submitted += 1;
            } else {
                summary.failed += 1;
            }
        }
        Ok(summary)
    }

    /// Relay one message. Returns whether the submission was accepted.
    ///
    /// A receipt that is already final and unsuccessful fails the message at
    /// once; any other receipt leaves it `TX_PENDING` for the Confirm task.
    async fn commit_one(&self, client: &dyn ChainClient, sdp: &SdpMsgWrapper) -> Result<bool, NodeError> {
        let am = self.ctx.store.get_am(sdp.auth_msg_id)?.ok_or_else(|| {
            NodeError::DataIntegrity(format!("sdp {} references missing am {}", sdp.id, sdp.auth_msg_id))
        })?;
        let envelope = RelayEnvelope {
            receiver_identity: sdp.receiver_identity,
            sender_domain: sdp.sender_domain.clone(),
            flags: 0,
            proofs: ProofBundle {
                raw_message: am.raw_message,
                ledger_proof: am.ledger_proof,
            }
            .encode(),
        };

        let committed_at = self.ctx.clock.now();
        let update = match relay_envelope(client, &envelope.encode(), &self.ctx.config.service_id).await {
            Ok(receipt) if receipt.confirmed && !receipt.successful => {
                self.ctx.metrics.sdp_commit_failed.inc();
                let reason = receipt
                    .error_msg
                    .unwrap_or_else(|| "transaction reverted".to_string());
                warn!(sdp = sdp.id, tx = %receipt.tx_hash, %reason, "sdp transaction reverted");
                SdpCommitUpdate {
                    state: SdpMsgProcessState::TxFailed,
                    tx_hash: Some(receipt.tx_hash),
                    fail_reason: Some(reason),
                    committed_at,
                }
            }
            Ok(receipt) => {
                self.ctx.metrics.sdp_committed.inc();
                debug!(sdp = sdp.id, tx = %receipt.tx_hash, "sdp submitted");
                SdpCommitUpdate {
                    state: SdpMsgProcessState::TxPending,
                    tx_hash: Some(receipt.tx_hash),
                    fail_reason: None,
                    committed_at,
                }
            }
            Err(e) => {
                self.ctx.metrics.sdp_commit_failed.inc();
                warn!(sdp = sdp.id, error = %e, "sdp submission failed");
                SdpCommitUpdate {
                    state: SdpMsgProcessState::TxFailed,
                    tx_hash: None,
                    fail_reason: Some(e.to_string()),
                    committed_at,
                }
            }
        };
        let accepted = update.state == SdpMsgProcessState::TxPending;
        self.ctx.store.update_sdp_commit(sdp.id, &update)?;
        Ok(accepted)
    }
}

#[async_trait]
impl BlockchainTask for Committer {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError> {
        let summary = self.commit_chain(chain).await?;
        if summary != CommitSummary::default() {
            debug!(
                chain = %chain,
                submitted = summary.submitted,
                failed = summary.failed,
                deferred = summary.deferred,
                "commit run finished"
            );
        }
        Ok(())
    }
}
