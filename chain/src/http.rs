//! JSON-over-HTTP adapter to plugin servers.
//!
//! `POST {url}/chains/{product}/{blockchain_id}/{method}` with a JSON object
//! body; the server answers `{"result": ...}` or `{"error": "..."}`.
//! `GET {url}/health` is the heartbeat. Binary fields travel hex-encoded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use xrelay_types::{
    BlockchainMeta, ChainKey, CrossChainDomain, Identity, LedgerInfo, Timestamp, UpperProtocolType,
};

use crate::{
    AmClient, ChainClient, ChainClientFactory, ChainError, CrossChainMessage, CrossChainReceipt,
    PluginServerProbe, SdpClient,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_http(timeout: Duration) -> Result<reqwest::Client, ChainError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| ChainError::Rpc(format!("failed to create HTTP client: {e}")))
}

fn transport_error(e: reqwest::Error) -> ChainError {
    if e.is_timeout() {
        ChainError::Rpc(format!("request timed out: {e}"))
    } else if e.is_connect() {
        ChainError::Rpc(format!("connection failed: {e}"))
    } else {
        ChainError::Rpc(e.to_string())
    }
}

/// Client of one chain, served by one plugin server.
pub struct HttpChainClient {
    http: reqwest::Client,
    base_url: String,
    chain: ChainKey,
}

#[derive(Deserialize)]
struct WireMessage {
    message: String,
    proof: String,
    height: u64,
    #[serde(default)]
    block_hash: String,
    #[serde(default)]
    tx_hash: String,
    #[serde(default)]
    timestamp: u64,
}

impl WireMessage {
    fn into_message(self) -> Result<CrossChainMessage, ChainError> {
        Ok(CrossChainMessage {
            message: decode_hex(&self.message)?,
            proof: decode_hex(&self.proof)?,
            ledger: LedgerInfo {
                height: self.height,
                block_hash: self.block_hash,
                tx_hash: self.tx_hash,
                timestamp: Timestamp::new(self.timestamp),
            },
        })
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(s.trim_start_matches("0x")).map_err(|e| ChainError::BadResponse(e.to_string()))
}

impl HttpChainClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, chain: ChainKey) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chain,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/chains/{}/{}/{}",
            self.base_url, self.chain.product, self.chain.blockchain_id, method
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&params)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(ChainError::Plugin {
                method: method.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ChainError::BadResponse(format!("{method}: {e}")))?;

        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(ChainError::Plugin {
                method: method.to_string(),
                message: err.to_string(),
            });
        }

        let result = body.get("result").cloned().unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| ChainError::BadResponse(format!("{method}: {e}")))
    }
}

#[async_trait]
impl AmClient for HttpChainClient {
    async fn relay(&self, proofs: &[u8], service_id: &str) -> Result<CrossChainReceipt, ChainError> {
        self.call(
            "relay",
            json!({ "proofs": hex::encode(proofs), "service_id": service_id }),
        )
        .await
    }

    async fn set_protocol(
        &self,
        protocol_contract: &str,
        protocol: UpperProtocolType,
    ) -> Result<(), ChainError> {
        let _: Value = self
            .call(
                "set_protocol",
                json!({ "protocol_contract": protocol_contract, "protocol": protocol.code() }),
            )
            .await?;
        Ok(())
    }

    async fn deploy_am_contract(&self) -> Result<String, ChainError> {
        self.call("deploy_am_contract", json!({})).await
    }

    async fn parse_incoming_messages(&self, height: u64) -> Result<Vec<CrossChainMessage>, ChainError> {
        let wire: Vec<WireMessage> = self
            .call("parse_incoming_messages", json!({ "height": height }))
            .await?;
        wire.into_iter().map(WireMessage::into_message).collect()
    }
}

#[async_trait]
impl SdpClient for HttpChainClient {
    async fn set_am_contract(&self, am_contract: &str) -> Result<(), ChainError> {
        let _: Value = self
            .call("set_am_contract", json!({ "am_contract": am_contract }))
            .await?;
        Ok(())
    }

    async fn query_sequence_on_chain(
        &self,
        sender_domain: &CrossChainDomain,
        sender: &Identity,
        receiver_domain: &CrossChainDomain,
        receiver: &Identity,
    ) -> Result<u32, ChainError> {
        self.call(
            "query_sequence_on_chain",
            json!({
                "sender_domain": sender_domain.as_str(),
                "sender_id": sender.to_string(),
                "receiver_domain": receiver_domain.as_str(),
                "receiver_id": receiver.to_string(),
            }),
        )
        .await
    }

    async fn deploy_sdp_contract(&self) -> Result<String, ChainError> {
        self.call("deploy_sdp_contract", json!({})).await
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    fn chain(&self) -> &ChainKey {
        &self.chain
    }

    async fn query_latest_height(&self) -> Result<u64, ChainError> {
        self.call("query_latest_height", json!({})).await
    }

    async fn query_receipt(&self, tx_hash: &str) -> Result<CrossChainReceipt, ChainError> {
        self.call("query_receipt", json!({ "tx_hash": tx_hash })).await
    }
}

/// Plugin server base URLs by id.
#[derive(Clone, Debug, Default)]
pub struct PluginEndpoints(HashMap<String, String>);

impl PluginEndpoints {
    pub fn new<I>(servers: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self(servers.into_iter().collect())
    }

    pub fn url(&self, plugin_server_id: &str) -> Result<&str, ChainError> {
        self.0
            .get(plugin_server_id)
            .map(String::as_str)
            .ok_or_else(|| ChainError::PluginServerNotFound(plugin_server_id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Creates [`HttpChainClient`]s from the chain's configured plugin server.
pub struct HttpChainClientFactory {
    http: reqwest::Client,
    endpoints: PluginEndpoints,
}

impl HttpChainClientFactory {
    pub fn new(endpoints: PluginEndpoints) -> Result<Self, ChainError> {
        Ok(Self {
            http: build_http(DEFAULT_TIMEOUT)?,
            endpoints,
        })
    }
}

#[async_trait]
impl ChainClientFactory for HttpChainClientFactory {
    async fn create(&self, meta: &BlockchainMeta) -> Result<Arc<dyn ChainClient>, ChainError> {
        let url = self.endpoints.url(&meta.properties.plugin_server_id)?;
        Ok(Arc::new(HttpChainClient::new(
            self.http.clone(),
            url,
            meta.chain.clone(),
        )))
    }
}

/// `GET {url}/health` heartbeat.
pub struct HttpPluginProbe {
    http: reqwest::Client,
    endpoints: PluginEndpoints,
}

impl HttpPluginProbe {
    pub fn new(endpoints: PluginEndpoints, timeout: Duration) -> Result<Self, ChainError> {
        Ok(Self {
            http: build_http(timeout)?,
            endpoints,
        })
    }
}

#[async_trait]
impl PluginServerProbe for HttpPluginProbe {
    async fn probe(&self, plugin_server_id: &str) -> Result<(), ChainError> {
        let url = format!(
            "{}/health",
            self.endpoints.url(plugin_server_id)?.trim_end_matches('/')
        );
        let response = self.http.get(&url).send().await.map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ChainError::Plugin {
                method: "health".to_string(),
                message: format!("HTTP {}", response.status()),
            })
        }
    }
}
