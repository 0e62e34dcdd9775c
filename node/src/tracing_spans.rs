//! Pre-built [`tracing::Span`] constructors for common relayer operations.
//!
//! Using consistent span names and field sets across the codebase makes it
//! easy to filter, search, and correlate traces.

use tracing::{info_span, Span};
use xrelay_types::{ChainKey, NodeId, TaskType};

/// Span covering one dispatch cycle on the node holding the dispatch lock.
pub fn dispatch_span(node: &NodeId) -> Span {
    info_span!("dispatch", node = %node)
}

/// Span covering one execution of a task kind on one blockchain.
pub fn task_span(task_type: TaskType, chain: &ChainKey) -> Span {
    info_span!("task", task = %task_type, chain = %chain)
}

/// Span covering one batch of receipt queries.
pub fn confirm_batch_span(chain: &ChainKey, size: usize) -> Span {
    info_span!("confirm_batch", chain = %chain, size = size)
}

/// Span covering a synchronous off-chain submission.
pub fn offchain_span(domain: &str) -> Span {
    info_span!("offchain_am", domain = %domain)
}

/// Span covering the block sync of one height.
pub fn anchor_span(chain: &ChainKey, height: u64) -> Span {
    info_span!("anchor", chain = %chain, height = height)
}
