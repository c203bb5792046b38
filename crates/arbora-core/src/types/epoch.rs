use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, Hash};
use crate::error::CoreError;
use crate::serialize;
use crate::types::address::Address;

/// A block-production round under a single validator. Epochs form a hash
/// chain through `previous_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub index: u32,
    pub timestamp: u64,
    pub validator: Address,
    pub previous_hash: Hash,
    pub block_hashes: Vec<Hash>,
    pub hash: Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EpochDigestData {
    index: u32,
    timestamp: u64,
    validator: Address,
    previous_hash: Hash,
    block_hashes: Vec<Hash>,
}

impl Epoch {
    pub fn new(
        index: u32,
        timestamp: u64,
        validator: Address,
        previous_hash: Hash,
    ) -> Result<Self, CoreError> {
        let mut epoch = Epoch {
            index,
            timestamp,
            validator,
            previous_hash,
            block_hashes: Vec::new(),
            hash: Hash::NULL,
        };
        epoch.recompute_hash()?;
        Ok(epoch)
    }

    /// Recompute the epoch digest over all other fields
    pub fn recompute_hash(&mut self) -> Result<(), CoreError> {
        let data = EpochDigestData {
            index: self.index,
            timestamp: self.timestamp,
            validator: self.validator,
            previous_hash: self.previous_hash,
            block_hashes: self.block_hashes.clone(),
        };
        let bytes = serialize::to_bytes(&data)?;
        self.hash = hash_blake3(&bytes);
        Ok(())
    }

    /// Append an accepted block hash and refresh the digest
    pub fn append_block(&mut self, block_hash: Hash) -> Result<(), CoreError> {
        self.block_hashes.push(block_hash);
        self.recompute_hash()
    }

    /// Remove a block hash during rollback and refresh the digest
    pub fn remove_block(&mut self, block_hash: &Hash) -> Result<(), CoreError> {
        self.block_hashes.retain(|h| h != block_hash);
        self.recompute_hash()
    }

    pub fn is_empty(&self) -> bool {
        self.block_hashes.is_empty()
    }
}
