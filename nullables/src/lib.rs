//! Nullable infrastructure for deterministic testing.
//!
//! Inspired by the "A-frame architecture" pattern from RsNano.
//! Every external dependency of the relayer (clock, shuffling, storage,
//! chain clients, plugin servers) sits behind a trait. This crate provides
//! test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod plugin;
pub mod shuffle;
pub mod store;

pub use chain::{NullChainClient, NullChainClientFactory};
pub use clock::NullClock;
pub use plugin::NullPluginRegistry;
pub use shuffle::NullShuffler;
pub use store::NullStore;
