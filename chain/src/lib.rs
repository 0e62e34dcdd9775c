//! Chain-facing contracts of the relayer.
//!
//! The pipeline talks to every blockchain through the [`AmClient`] /
//! [`SdpClient`] / [`ChainClient`] traits. Concrete clients live behind an
//! external plugin server per chain type; [`http`] provides the JSON-over-HTTP
//! adapter used by the daemon.

pub mod client;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod http;
pub mod plugin;
pub mod pool;

pub use client::{AmClient, ChainClient, CrossChainMessage, CrossChainReceipt, SdpClient};
pub use codec::{AuthMessage, ProofBundle, SdpMessage};
pub use envelope::{extract_proofs, relay_envelope, try_extract_proofs, RelayEnvelope, PROOFS_OFFSET};
pub use error::{ChainError, CodecError, EnvelopeError};
pub use plugin::{PluginRegistry, PluginServerMonitor, PluginServerProbe};
pub use pool::{ChainClientFactory, ChainClientPool};
pub use http::{HttpChainClient, HttpChainClientFactory, HttpPluginProbe, PluginEndpoints};
