//! Nullable plugin registry: states set by the test.

use std::collections::HashMap;
use std::sync::Mutex;

use xrelay_chain::PluginRegistry;
use xrelay_types::PluginServerState;

#[derive(Debug, Default)]
pub struct NullPluginRegistry {
    states: Mutex<HashMap<String, PluginServerState>>,
}

impl NullPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry reporting every listed server `READY`.
    pub fn ready<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let registry = Self::new();
        for id in ids {
            registry.set_state(id, PluginServerState::Ready);
        }
        registry
    }

    pub fn set_state(&self, id: &str, state: PluginServerState) {
        self.states.lock().unwrap().insert(id.to_string(), state);
    }
}

impl PluginRegistry for NullPluginRegistry {
    fn plugin_state(&self, plugin_server_id: &str) -> PluginServerState {
        self.states
            .lock()
            .unwrap()
            .get(plugin_server_id)
            .copied()
            .unwrap_or(PluginServerState::NotFound)
    }
}
