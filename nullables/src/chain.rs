//! Nullable chain client: scriptable, records every call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use xrelay_chain::{
    AmClient, ChainClient, ChainClientFactory, ChainError, CrossChainMessage, CrossChainReceipt,
    SdpClient,
};
use xrelay_types::{
    BlockchainMeta, ChainKey, CrossChainDomain, Identity, Timestamp, UpperProtocolType,
};

type Hook = Box<dyn Fn() + Send + Sync>;

/// A chain client whose answers are set by the test.
///
/// Defaults: height 0, no messages, `relay` succeeds with hashes `0x1`,
/// `0x2`, ..., receipts are unconfirmed, on-chain sequences are 0.
pub struct NullChainClient {
    chain: ChainKey,
    latest_height: AtomicU64,
    messages: Mutex<HashMap<u64, Vec<CrossChainMessage>>>,
    next_tx: AtomicU64,
    relay_error: Mutex<Option<String>>,
    relay_revert: Mutex<Option<String>>,
    relayed: Mutex<Vec<Vec<u8>>>,
    receipts: Mutex<HashMap<String, Result<CrossChainReceipt, String>>>,
    sequences: Mutex<HashMap<(String, Identity), u32>>,
    sequence_errors: Mutex<HashMap<String, String>>,
    deploy_error: Mutex<Option<String>>,
    deploy_hook: Mutex<Option<Hook>>,
    calls: Mutex<Vec<String>>,
    shut_down: AtomicBool,
}

impl NullChainClient {
    pub fn new(chain: ChainKey) -> Self {
        Self {
            chain,
            latest_height: AtomicU64::new(0),
            messages: Mutex::new(HashMap::new()),
            next_tx: AtomicU64::new(1),
            relay_error: Mutex::new(None),
            relay_revert: Mutex::new(None),
            relayed: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
            sequence_errors: Mutex::new(HashMap::new()),
            deploy_error: Mutex::new(None),
            deploy_hook: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn set_latest_height(&self, height: u64) {
        self.latest_height.store(height, Ordering::SeqCst);
    }

    pub fn add_messages(&self, height: u64, messages: Vec<CrossChainMessage>) {
        self.messages
            .lock()
            .unwrap()
            .entry(height)
            .or_default()
            .extend(messages);
    }

    /// Make `relay` fail (`None` to recover).
    pub fn fail_relay(&self, error: Option<&str>) {
        *self.relay_error.lock().unwrap() = error.map(str::to_string);
    }

    /// Make `relay` return a receipt of a transaction that already reverted
    /// with `error` (`None` to recover).
    pub fn revert_relay(&self, error: Option<&str>) {
        *self.relay_revert.lock().unwrap() = error.map(str::to_string);
    }

    /// Run `hook` inside every deploy call, before it returns.
    pub fn on_deploy(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.deploy_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Make `query_sequence_on_chain` fail for messages from `sender_domain`.
    pub fn fail_sequence(&self, sender_domain: &str, error: &str) {
        self.sequence_errors
            .lock()
            .unwrap()
            .insert(sender_domain.to_string(), error.to_string());
    }

    /// Make both deploy calls fail (`None` to recover).
    pub fn fail_deploy(&self, error: Option<&str>) {
        *self.deploy_error.lock().unwrap() = error.map(str::to_string);
    }

    pub fn set_receipt(&self, receipt: CrossChainReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.tx_hash.clone(), Ok(receipt));
    }

    /// Make `query_receipt(tx_hash)` fail.
    pub fn fail_receipt(&self, tx_hash: &str, error: &str) {
        self.receipts
            .lock()
            .unwrap()
            .insert(tx_hash.to_string(), Err(error.to_string()));
    }

    pub fn set_sequence(&self, sender_domain: &str, sender: Identity, sequence: u32) {
        self.sequences
            .lock()
            .unwrap()
            .insert((sender_domain.to_string(), sender), sequence);
    }

    /// Proof bytes passed to `relay`, in call order.
    pub fn relayed(&self) -> Vec<Vec<u8>> {
        self.relayed.lock().unwrap().clone()
    }

    /// Method names called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn deploy_check(&self) -> Result<(), ChainError> {
        if let Some(hook) = self.deploy_hook.lock().unwrap().as_ref() {
            hook();
        }
        match self.deploy_error.lock().unwrap().clone() {
            Some(message) => Err(ChainError::Plugin {
                method: "deploy".to_string(),
                message,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AmClient for NullChainClient {
    async fn relay(&self, proofs: &[u8], _service_id: &str) -> Result<CrossChainReceipt, ChainError> {
        self.record("relay");
        if let Some(message) = self.relay_error.lock().unwrap().clone() {
            return Err(ChainError::Plugin {
                method: "relay".to_string(),
                message,
            });
        }
        self.relayed.lock().unwrap().push(proofs.to_vec());
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let mut receipt = CrossChainReceipt::pending(format!("0x{n:x}"));
        if let Some(error) = self.relay_revert.lock().unwrap().clone() {
            receipt.confirmed = true;
            receipt.error_msg = Some(error);
            receipt.tx_timestamp = Timestamp::new(n);
        }
        Ok(receipt)
    }

    async fn set_protocol(
        &self,
        protocol_contract: &str,
        protocol: UpperProtocolType,
    ) -> Result<(), ChainError> {
        self.record(format!("set_protocol:{protocol_contract}:{protocol}"));
        Ok(())
    }

    async fn deploy_am_contract(&self) -> Result<String, ChainError> {
        self.record("deploy_am_contract");
        self.deploy_check()?;
        Ok(format!("am@{}", self.chain))
    }

    async fn parse_incoming_messages(&self, height: u64) -> Result<Vec<CrossChainMessage>, ChainError> {
        self.record(format!("parse_incoming_messages:{height}"));
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SdpClient for NullChainClient {
    async fn set_am_contract(&self, am_contract: &str) -> Result<(), ChainError> {
        self.record(format!("set_am_contract:{am_contract}"));
        Ok(())
    }

    async fn query_sequence_on_chain(
        &self,
        sender_domain: &CrossChainDomain,
        sender: &Identity,
        _receiver_domain: &CrossChainDomain,
        _receiver: &Identity,
    ) -> Result<u32, ChainError> {
        self.record("query_sequence_on_chain");
        if let Some(message) = self.sequence_errors.lock().unwrap().get(sender_domain.as_str()) {
            return Err(ChainError::Rpc(message.clone()));
        }
        Ok(self
            .sequences
            .lock()
            .unwrap()
            .get(&(sender_domain.as_str().to_string(), *sender))
            .copied()
            .unwrap_or(0))
    }

    async fn deploy_sdp_contract(&self) -> Result<String, ChainError> {
        self.record("deploy_sdp_contract");
        self.deploy_check()?;
        Ok(format!("sdp@{}", self.chain))
    }
}

#[async_trait]
impl ChainClient for NullChainClient {
    fn chain(&self) -> &ChainKey {
        &self.chain
    }

    async fn query_latest_height(&self) -> Result<u64, ChainError> {
        Ok(self.latest_height.load(Ordering::SeqCst))
    }

    async fn query_receipt(&self, tx_hash: &str) -> Result<CrossChainReceipt, ChainError> {
        match self.receipts.lock().unwrap().get(tx_hash).cloned() {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(e)) => Err(ChainError::Rpc(e)),
            None => Ok(CrossChainReceipt::pending(tx_hash)),
        }
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Hands out one [`NullChainClient`] per chain, creating it on demand.
#[derive(Default)]
pub struct NullChainClientFactory {
    clients: Mutex<HashMap<ChainKey, Arc<NullChainClient>>>,
    created: AtomicU64,
    unavailable: Mutex<Option<String>>,
}

impl NullChainClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client of `chain`, created if needed. Tests script it directly.
    pub fn client(&self, chain: &ChainKey) -> Arc<NullChainClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(chain.clone())
            .or_insert_with(|| Arc::new(NullChainClient::new(chain.clone())))
            .clone()
    }

    /// Number of `create` calls that succeeded.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Make `create` fail (`None` to recover).
    pub fn fail_create(&self, error: Option<&str>) {
        *self.unavailable.lock().unwrap() = error.map(str::to_string);
    }
}

#[async_trait]
impl ChainClientFactory for NullChainClientFactory {
    async fn create(&self, meta: &BlockchainMeta) -> Result<Arc<dyn ChainClient>, ChainError> {
        if let Some(e) = self.unavailable.lock().unwrap().clone() {
            return Err(ChainError::Rpc(e));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.client(&meta.chain))
    }
}
