//! LMDB implementation of BlockchainStore.
//!
//! Key format: `product:blockchain_id`.

use xrelay_store::{BlockchainStore, DeployUpdate, StoreError};
use xrelay_types::{BlockchainMeta, ChainKey};

use crate::environment::{decode, decode_u64, encode, scan, LmdbStore};

fn chain_key(chain: &ChainKey) -> Vec<u8> {
    chain.to_string().into_bytes()
}

impl BlockchainStore for LmdbStore {
    fn save_blockchain_meta(&self, meta: &BlockchainMeta) -> Result<(), StoreError> {
        let bytes = encode(meta)?;
        let mut wtxn = self.write_txn()?;
        self.blockchains_db
            .put(&mut wtxn, &chain_key(&meta.chain), &bytes)
            .map_err(crate::LmdbError::from)?;
        wtxn.commit().map_err(crate::LmdbError::from)?;
        Ok(())
    }

    fn get_blockchain_meta(&self, chain: &ChainKey) -> Result<Option<BlockchainMeta>, StoreError> {
        let rtxn = self.read_txn()?;
        let val = self
            .blockchains_db
            .get(&rtxn, &chain_key(chain))
            .map_err(crate::LmdbError::from)?;
        Ok(val.map(decode).transpose()?)
    }

    fn update_deploy_progress(&self, chain: &ChainKey, update: &DeployUpdate) -> Result<(), StoreError> {
        let key = chain_key(chain);
        let mut wtxn = self.write_txn()?;
        let mut meta: BlockchainMeta = match self
            .blockchains_db
            .get(&wtxn, &key)
            .map_err(crate::LmdbError::from)?
        {
            Some(bytes) => decode(bytes)?,
            None => return Err(StoreError::NotFound(format!("blockchain {chain}"))),
        };
        update.apply(&mut meta.properties);
        self.blockchains_db
            .put(&mut wtxn, &key, &encode(&meta)?)
            .map_err(crate::LmdbError::from)?;
        wtxn.commit().map_err(crate::LmdbError::from)?;
        Ok(())
    }

    fn get_all_blockchain_meta(&self) -> Result<Vec<BlockchainMeta>, StoreError> {
        let rtxn = self.read_txn()?;
        Ok(scan(&rtxn, &self.blockchains_db)?)
    }

    fn get_anchor_height(&self, chain: &ChainKey) -> Result<Option<u64>, StoreError> {
        let rtxn = self.read_txn()?;
        let val = self
            .anchor_heights_db
            .get(&rtxn, &chain_key(chain))
            .map_err(crate::LmdbError::from)?;
        Ok(val.map(decode_u64).transpose()?)
    }

    fn set_anchor_height(&self, chain: &ChainKey, height: u64) -> Result<(), StoreError> {
        let mut wtxn = self.write_txn()?;
        self.anchor_heights_db
            .put(&mut wtxn, &chain_key(chain), &height.to_be_bytes())
            .map_err(crate::LmdbError::from)?;
        wtxn.commit().map_err(crate::LmdbError::from)?;
        Ok(())
    }
}
