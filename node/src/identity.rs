//! Node identity derivation.

use std::net::{IpAddr, UdpSocket};

use rand::RngCore;
use tracing::{info, warn};
use xrelay_types::NodeId;

use crate::NodeError;

/// Identity of this relayer process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: NodeId,
    /// Outbound address, recorded in the liveness row when known.
    pub node_ip: Option<String>,
}

/// Resolve the node identity.
///
/// A configured id wins; an empty configured id is fatal. Otherwise the
/// host's outbound IP address is used, and a random identifier when no
/// address can be determined.
pub fn resolve_identity(configured: Option<&str>) -> Result<NodeIdentity, NodeError> {
    let node_ip = outbound_ip().map(|ip| ip.to_string());
    let node_id = match configured {
        Some(id) if id.trim().is_empty() => {
            return Err(NodeError::Identity("configured node_id is empty".to_string()));
        }
        Some(id) => NodeId::new(id.trim()),
        None => match &node_ip {
            Some(ip) => NodeId::new(ip.clone()),
            None => {
                warn!("no outbound address, using a random node id");
                NodeId::new(random_id())
            }
        },
    };
    info!(node = %node_id, ip = ?node_ip, "node identity resolved");
    Ok(NodeIdentity { node_id, node_ip })
}

/// Local address of the interface that routes to the public internet.
/// Connecting a UDP socket sends no packets.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
