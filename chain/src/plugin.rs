//! Plugin-server readiness.
//!
//! Every chain is served by a plugin server. The dispatcher only schedules
//! chains whose plugin server is `READY`; the monitor derives that state from
//! periodic heartbeat probes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{info, warn};
use xrelay_types::{PluginServerState, Timestamp};

use crate::ChainError;

/// Reports the readiness of plugin servers by id.
pub trait PluginRegistry: Send + Sync {
    /// `NOT_FOUND` for ids the registry has never heard of.
    fn plugin_state(&self, plugin_server_id: &str) -> PluginServerState;
}

/// One heartbeat against a plugin server.
#[async_trait]
pub trait PluginServerProbe: Send + Sync {
    async fn probe(&self, plugin_server_id: &str) -> Result<(), ChainError>;
}

#[derive(Clone, Debug)]
struct ServerHealth {
    state: PluginServerState,
    misses: u32,
    last_ok: Option<Timestamp>,
}

/// Heartbeat-driven [`PluginRegistry`].
///
/// States: `INIT` until the first probe, `READY` after a successful probe,
/// `HEARTBEAT_LOST` after `max_misses` consecutive failures, `STOPPED` once
/// marked stopped (no longer probed).
pub struct PluginServerMonitor {
    probe: Arc<dyn PluginServerProbe>,
    max_misses: u32,
    servers: RwLock<HashMap<String, ServerHealth>>,
}

impl PluginServerMonitor {
    pub fn new<I, S>(probe: Arc<dyn PluginServerProbe>, server_ids: I, max_misses: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let servers = server_ids
            .into_iter()
            .map(|id| {
                (
                    id.into(),
                    ServerHealth {
                        state: PluginServerState::Init,
                        misses: 0,
                        last_ok: None,
                    },
                )
            })
            .collect();
        Self {
            probe,
            max_misses: max_misses.max(1),
            servers: RwLock::new(servers),
        }
    }

    /// Probe every server that is not stopped, concurrently.
    pub async fn heartbeat_round(&self, now: Timestamp) {
        let ids: Vec<String> = {
            let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
            servers
                .iter()
                .filter(|(_, h)| h.state != PluginServerState::Stopped)
                .map(|(id, _)| id.clone())
                .collect()
        };
        let probes = ids.iter().map(|id| self.probe.probe(id));
        let results = join_all(probes).await;

        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        for (id, result) in ids.into_iter().zip(results) {
            let Some(health) = servers.get_mut(&id) else {
                continue;
            };
            if health.state == PluginServerState::Stopped {
                continue;
            }
            match result {
                Ok(()) => {
                    if health.state != PluginServerState::Ready {
                        info!(plugin_server = %id, "plugin server ready");
                    }
                    health.state = PluginServerState::Ready;
                    health.misses = 0;
                    health.last_ok = Some(now);
                }
                Err(e) => {
                    health.misses = health.misses.saturating_add(1);
                    if health.misses >= self.max_misses
                        && health.state != PluginServerState::HeartbeatLost
                    {
                        warn!(plugin_server = %id, misses = health.misses, error = %e, "plugin server heartbeat lost");
                        health.state = PluginServerState::HeartbeatLost;
                    }
                }
            }
        }
    }

    pub fn mark_stopped(&self, plugin_server_id: &str) {
        let mut servers = self.servers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(health) = servers.get_mut(plugin_server_id) {
            health.state = PluginServerState::Stopped;
            info!(plugin_server = %plugin_server_id, "plugin server stopped");
        }
    }

    /// Time of the last successful probe.
    pub fn last_ok(&self, plugin_server_id: &str) -> Option<Timestamp> {
        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        servers.get(plugin_server_id).and_then(|h| h.last_ok)
    }
}

impl PluginRegistry for PluginServerMonitor {
    fn plugin_state(&self, plugin_server_id: &str) -> PluginServerState {
        let servers = self.servers.read().unwrap_or_else(|e| e.into_inner());
        servers
            .get(plugin_server_id)
            .map(|h| h.state)
            .unwrap_or(PluginServerState::NotFound)
    }
}
