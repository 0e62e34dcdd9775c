//! Liveness heartbeat of this node.

use std::sync::Arc;

use tracing::trace;
use xrelay_store::{RelayerStore, ScheduleStore};
use xrelay_types::ActiveNode;
use xrelay_utils::Clock;

use crate::identity::NodeIdentity;
use crate::NodeError;

pub struct Activator {
    store: Arc<dyn RelayerStore>,
    clock: Arc<dyn Clock>,
    identity: NodeIdentity,
}

impl Activator {
    pub fn new(store: Arc<dyn RelayerStore>, clock: Arc<dyn Clock>, identity: NodeIdentity) -> Self {
        Self {
            store,
            clock,
            identity,
        }
    }

    /// Refresh this node's liveness record.
    pub fn activate(&self) -> Result<(), NodeError> {
        let node = ActiveNode {
            node_id: self.identity.node_id.clone(),
            node_ip: self.identity.node_ip.clone(),
            last_active: self.clock.now(),
        };
        self.store.activate_node(&node)?;
        trace!(node = %node.node_id, "heartbeat renewed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xrelay_nullables::{NullClock, NullStore};
    use xrelay_types::{NodeId, Timestamp};

    #[test]
    fn heartbeat_is_refreshed_in_place() {
        let store = Arc::new(NullStore::new());
        let clock = Arc::new(NullClock::new(5_000));
        let activator = Activator::new(
            store.clone(),
            clock.clone(),
            NodeIdentity {
                node_id: NodeId::new("n1"),
                node_ip: Some("10.0.0.1".into()),
            },
        );
        activator.activate().unwrap();
        clock.advance(3_000);
        activator.activate().unwrap();

        let nodes = store.get_all_active_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].last_active, Timestamp::new(8_000));
        assert_eq!(nodes[0].node_ip.as_deref(), Some("10.0.0.1"));
    }
}
