//! LMDB storage backend for the relayer.
//!
//! Implements every repository contract from `xrelay-store` over one `heed`
//! environment. LMDB serializes writers across processes, so several relayer
//! nodes on one host can share a data directory; each write method runs in a
//! single write transaction.

pub mod blockchain;
pub mod environment;
pub mod error;
pub mod message;
pub mod schedule;

pub use environment::LmdbStore;
pub use error::LmdbError;
