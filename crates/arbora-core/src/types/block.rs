use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, Hash};
use crate::error::CoreError;
use crate::serialize;
use crate::types::event::Event;

/// A block: an ordered list of transaction hashes plus per-transaction
/// results and events populated during application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub previous_hash: Hash,
    pub timestamp: u64,
    /// Transaction hashes in execution order; fixed at construction
    pub tx_hashes: Vec<Hash>,
    /// Serialized result per transaction, filled during application
    pub results: BTreeMap<Hash, Vec<u8>>,
    /// Events per transaction, filled during application
    pub events: BTreeMap<Hash, Vec<Event>>,
}

/// Header fields covered by the block hash. Results and events are
/// populated after the hash is fixed and must not move it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlockHeaderData {
    height: u64,
    previous_hash: Hash,
    timestamp: u64,
    tx_hashes: Vec<Hash>,
}

impl Block {
    /// Create a new block with its transaction hashes fixed
    pub fn new(height: u64, previous_hash: Hash, timestamp: u64, tx_hashes: Vec<Hash>) -> Self {
        Block {
            height,
            previous_hash,
            timestamp,
            tx_hashes,
            results: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }

    /// Compute the block hash over the fixed header fields
    pub fn hash(&self) -> Result<Hash, CoreError> {
        let header = BlockHeaderData {
            height: self.height,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            tx_hashes: self.tx_hashes.clone(),
        };
        let bytes = serialize::to_bytes(&header)?;
        Ok(hash_blake3(&bytes))
    }

    /// Record the execution result for a transaction
    pub fn set_result(&mut self, tx_hash: Hash, result: Vec<u8>) {
        self.results.insert(tx_hash, result);
    }

    /// Get the recorded result for a transaction
    pub fn result_of(&self, tx_hash: &Hash) -> Option<&[u8]> {
        self.results.get(tx_hash).map(|r| r.as_slice())
    }

    /// Append events for a transaction
    pub fn add_events(&mut self, tx_hash: Hash, events: Vec<Event>) {
        self.events.entry(tx_hash).or_default().extend(events);
    }

    /// Get the recorded events for a transaction
    pub fn events_of(&self, tx_hash: &Hash) -> &[Event] {
        self.events.get(tx_hash).map(|e| e.as_slice()).unwrap_or(&[])
    }
}
