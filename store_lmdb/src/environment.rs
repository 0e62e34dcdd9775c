//! LMDB environment setup and shared encoding helpers.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use xrelay_store::SessionLocks;

use crate::LmdbError;

/// Default map size: 1 GiB.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 20;

pub(crate) type RawDb = Database<Bytes, Bytes>;

/// The relayer's durable state in one LMDB environment.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) blockchains_db: RawDb,
    pub(crate) anchor_heights_db: RawDb,
    pub(crate) tasks_db: RawDb,
    pub(crate) nodes_db: RawDb,
    pub(crate) locks_db: RawDb,
    pub(crate) ucp_pool_db: RawDb,
    pub(crate) ucp_archive_db: RawDb,
    pub(crate) am_pool_db: RawDb,
    pub(crate) am_archive_db: RawDb,
    pub(crate) sdp_pool_db: RawDb,
    pub(crate) sdp_archive_db: RawDb,
    /// `receiver|tx_hash` -> SDP id, for applying commit results.
    pub(crate) sdp_tx_index_db: RawDb,
    /// `receiver|state|id` -> (), one entry per SDP with a receiver.
    pub(crate) sdp_state_index_db: RawDb,
    /// `ucp|source|id` and `am|source|id` -> (), for `PENDING` rows only.
    pub(crate) pending_index_db: RawDb,
    /// AM id -> number of SDPs in the active pool that reference it.
    pub(crate) am_refs_db: RawDb,
    /// Id counters.
    pub(crate) meta_db: RawDb,
    pub(crate) sessions: SessionLocks,
}

impl LmdbStore {
    /// Open or create the environment under `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per process and never
        // opened twice from the same process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let mut create = |name: &str| -> Result<RawDb, LmdbError> {
            Ok(env.create_database(&mut wtxn, Some(name))?)
        };
        let store = Self {
            blockchains_db: create("blockchains")?,
            anchor_heights_db: create("anchor_heights")?,
            tasks_db: create("distributed_tasks")?,
            nodes_db: create("active_nodes")?,
            locks_db: create("locks")?,
            ucp_pool_db: create("ucp_pool")?,
            ucp_archive_db: create("ucp_archive")?,
            am_pool_db: create("am_pool")?,
            am_archive_db: create("am_archive")?,
            sdp_pool_db: create("sdp_pool")?,
            sdp_archive_db: create("sdp_archive")?,
            sdp_tx_index_db: create("sdp_tx_index")?,
            sdp_state_index_db: create("sdp_state_index")?,
            pending_index_db: create("pending_index")?,
            am_refs_db: create("am_refs")?,
            meta_db: create("meta")?,
            env: env.clone(),
            sessions: SessionLocks::new(),
        };
        wtxn.commit()?;
        store.build_indexes()?;
        info!(path = %path.display(), map_size, "lmdb store opened");
        Ok(store)
    }

    pub(crate) fn read_txn(&self) -> Result<RoTxn<'_>, LmdbError> {
        Ok(self.env.read_txn()?)
    }

    pub(crate) fn write_txn(&self) -> Result<RwTxn<'_>, LmdbError> {
        Ok(self.env.write_txn()?)
    }

    /// Reserve `count` consecutive ids from `counter`, returning the first.
    pub(crate) fn reserve_ids(
        &self,
        wtxn: &mut RwTxn,
        counter: &str,
        count: usize,
    ) -> Result<u64, LmdbError> {
        let key = format!("next_id:{counter}");
        let next = match self.meta_db.get(&*wtxn, key.as_bytes())? {
            Some(bytes) => decode_u64(bytes)?,
            None => 1,
        };
        let after = next + count as u64;
        self.meta_db.put(wtxn, key.as_bytes(), &after.to_be_bytes())?;
        Ok(next)
    }
}

pub(crate) fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn decode_u64(bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Serialization(format!("expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Decode every value of `db`, in key order.
pub(crate) fn scan<T: DeserializeOwned>(txn: &RoTxn, db: &RawDb) -> Result<Vec<T>, LmdbError> {
    let mut out = Vec::new();
    for item in db.iter(txn)? {
        let (_key, val) = item?;
        out.push(decode(val)?);
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn open_temp() -> (tempfile::TempDir, LmdbStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
    (dir, store)
}
