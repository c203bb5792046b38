use std::collections::BTreeMap;

use arbora_core::{Address, Block, Contract, Epoch, Hash, TokenInfo, Transaction};
use arbora_storage::{ChangeSetBundle, KeyValueStore, StorageContext};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::sheets::{BalanceSheet, OwnershipSheet};

/// Validate a chain or contract name: 3 to 19 characters from [a-z0-9_]
pub fn is_valid_name(name: &str) -> bool {
    if !(3..=19).contains(&name.len()) {
        return false;
    }
    name.bytes()
        .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_'))
}

/// The authoritative ledger state of one chain.
///
/// Owns its storage context and the four persisted maps scoped to it
/// (`blocks`, `txs`, `txbk`, `epoch`); the runtime-visible `data`
/// namespace lives in the same store. Block application itself is driven
/// by the runtime crate; `Chain` provides the state transitions.
pub struct Chain {
    name: String,
    address: Address,
    level: u32,
    parent: Option<Address>,
    parent_block: Option<Hash>,
    storage: Box<dyn StorageContext>,
    blocks: KeyValueStore<Block>,
    txs: KeyValueStore<Transaction>,
    tx_blocks: KeyValueStore<Hash>,
    epochs: KeyValueStore<Epoch>,
    /// Height to block hash, rebuilt as blocks come and go
    block_heights: BTreeMap<u64, Hash>,
    contracts: BTreeMap<String, Contract>,
    /// Child chain name to address
    children: BTreeMap<String, Address>,
    last_block: Option<Block>,
    current_epoch: Option<Epoch>,
    /// Change-set bundles retained per committed block for rollback
    block_changes: BTreeMap<Hash, ChangeSetBundle>,
}

impl Chain {
    pub fn new(
        name: &str,
        level: u32,
        parent: Option<Address>,
        parent_block: Option<Hash>,
        storage: Box<dyn StorageContext>,
    ) -> Result<Self, LedgerError> {
        if !is_valid_name(name) {
            return Err(LedgerError::InvalidName(name.to_string()));
        }

        info!("Creating chain '{}' at level {}", name, level);

        Ok(Chain {
            name: name.to_string(),
            address: Address::from_name(name),
            level,
            parent,
            parent_block,
            storage,
            blocks: KeyValueStore::new("blocks"),
            txs: KeyValueStore::new("txs"),
            tx_blocks: KeyValueStore::new("txbk"),
            epochs: KeyValueStore::new("epoch"),
            block_heights: BTreeMap::new(),
            contracts: BTreeMap::new(),
            children: BTreeMap::new(),
            last_block: None,
            current_epoch: None,
            block_changes: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn parent(&self) -> Option<Address> {
        self.parent
    }

    pub fn parent_block(&self) -> Option<Hash> {
        self.parent_block
    }

    pub fn last_block(&self) -> Option<&Block> {
        self.last_block.as_ref()
    }

    pub fn current_epoch(&self) -> Option<&Epoch> {
        self.current_epoch.as_ref()
    }

    /// Height of the last block, zero when empty
    pub fn height(&self) -> u64 {
        self.last_block.as_ref().map(|b| b.height).unwrap_or(0)
    }

    pub fn storage(&self) -> &dyn StorageContext {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> &mut dyn StorageContext {
        self.storage.as_mut()
    }

    // Lookups

    pub fn find_block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, LedgerError> {
        Ok(self.blocks.get(self.storage.as_ref(), hash.as_bytes())?)
    }

    pub fn find_block_by_height(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        match self.block_heights.get(&height) {
            Some(hash) => self.find_block_by_hash(&hash.clone()),
            None => Ok(None),
        }
    }

    pub fn contains_block(&self, hash: &Hash) -> bool {
        self.blocks.contains(self.storage.as_ref(), hash.as_bytes())
    }

    pub fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.txs.get(self.storage.as_ref(), hash.as_bytes())?)
    }

    /// Hash of the block that carries a transaction
    pub fn find_block_of_transaction(&self, tx_hash: &Hash) -> Result<Option<Hash>, LedgerError> {
        Ok(self.tx_blocks.get(self.storage.as_ref(), tx_hash.as_bytes())?)
    }

    pub fn block_count(&self) -> usize {
        self.block_heights.len()
    }

    // Contracts

    /// Register a contract; names share the chain-name rules
    pub fn deploy_contract(&mut self, contract: Contract) -> Result<(), LedgerError> {
        if !is_valid_name(&contract.name) {
            return Err(LedgerError::InvalidName(contract.name));
        }
        if self.contracts.contains_key(&contract.name) {
            return Err(LedgerError::ContractExists(contract.name));
        }
        debug!("Deploying contract '{}' on chain '{}'", contract.name, self.name);
        self.contracts.insert(contract.name.clone(), contract);
        Ok(())
    }

    pub fn contract(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    // Children

    pub(crate) fn register_child(&mut self, name: &str, address: Address) {
        self.children.insert(name.to_string(), address);
    }

    pub fn child_address(&self, name: &str) -> Option<Address> {
        self.children.get(name).copied()
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &Address)> {
        self.children.iter()
    }

    pub fn has_child(&self, address: &Address) -> bool {
        self.children.values().any(|a| a == address)
    }

    // Block linkage and commit

    /// Check the height/previous-hash linkage of a candidate block
    pub fn verify_linkage(&self, block: &Block) -> Result<(), LedgerError> {
        match &self.last_block {
            Some(last) => {
                if block.height != last.height + 1 {
                    return Err(LedgerError::BlockGeneration(format!(
                        "height {} does not follow {}",
                        block.height, last.height
                    )));
                }
                let last_hash = last.hash()?;
                if block.previous_hash != last_hash {
                    return Err(LedgerError::BlockGeneration(format!(
                        "previous hash {} does not match last block {}",
                        block.previous_hash, last_hash
                    )));
                }
            }
            None => {
                if !block.previous_hash.is_null() {
                    return Err(LedgerError::BlockGeneration(
                        "first block must have a null previous hash".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Record a fully executed block: persist it and its transactions,
    /// advance the epoch, retain the change-set bundle for rollback, and
    /// move the chain head. The bundle's journals must already be applied.
    pub fn commit_block(
        &mut self,
        block: &Block,
        transactions: &[Transaction],
        bundle: ChangeSetBundle,
        validators: &[Address],
        blocks_per_epoch: usize,
    ) -> Result<(), LedgerError> {
        let hash = block.hash()?;

        self.blocks.put(self.storage.as_mut(), hash.as_bytes(), block)?;
        self.block_heights.insert(block.height, hash);

        for tx in transactions {
            let tx_hash = tx.hash()?;
            self.txs.put(self.storage.as_mut(), tx_hash.as_bytes(), tx)?;
            self.tx_blocks
                .put(self.storage.as_mut(), tx_hash.as_bytes(), &hash)?;
        }

        self.update_epoch(hash, block.timestamp, validators, blocks_per_epoch)?;

        self.block_changes.insert(hash, bundle);
        self.last_block = Some(block.clone());
        self.storage.flush()?;

        info!(
            "Chain '{}' committed block {} at height {}",
            self.name, hash, block.height
        );
        Ok(())
    }

    fn update_epoch(
        &mut self,
        block_hash: Hash,
        timestamp: u64,
        validators: &[Address],
        blocks_per_epoch: usize,
    ) -> Result<(), LedgerError> {
        let capacity = blocks_per_epoch.max(1);

        let mut epoch = match self.current_epoch.take() {
            None => {
                let validator = validators.first().copied().unwrap_or(Address::NULL);
                Epoch::new(0, timestamp, validator, Hash::NULL)?
            }
            Some(current) if current.block_hashes.len() >= capacity => {
                let next_index = current.index + 1;
                let validator = if validators.is_empty() {
                    Address::NULL
                } else {
                    validators[(next_index as usize) % validators.len()]
                };
                debug!(
                    "Chain '{}' rotating to epoch {} under validator {}",
                    self.name, next_index, validator
                );
                Epoch::new(next_index, timestamp, validator, current.hash)?
            }
            Some(current) => current,
        };

        epoch.append_block(block_hash)?;
        self.epochs
            .put(self.storage.as_mut(), &epoch.index.to_le_bytes(), &epoch)?;
        self.current_epoch = Some(epoch);
        Ok(())
    }

    /// True when the address holds block-production authority right now
    pub fn is_current_validator(&self, address: &Address, validators: &[Address]) -> bool {
        match &self.current_epoch {
            Some(epoch) => epoch.validator == *address,
            None => validators.first() == Some(address),
        }
    }

    // Rollback support

    pub(crate) fn take_block_changes(&mut self, hash: &Hash) -> Option<ChangeSetBundle> {
        self.block_changes.remove(hash)
    }

    pub(crate) fn set_last_block(&mut self, block: Option<Block>) {
        self.last_block = block;
    }

    /// Remove a block's bookkeeping after its change sets were undone
    pub(crate) fn unwind_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        let hash = block.hash()?;

        self.blocks.remove(self.storage.as_mut(), hash.as_bytes());
        self.block_heights.remove(&block.height);

        for tx_hash in &block.tx_hashes {
            self.txs.remove(self.storage.as_mut(), tx_hash.as_bytes());
            self.tx_blocks.remove(self.storage.as_mut(), tx_hash.as_bytes());
        }

        if let Some(mut epoch) = self.current_epoch.take() {
            epoch.remove_block(&hash)?;
            if epoch.is_empty() {
                self.epochs
                    .remove(self.storage.as_mut(), &epoch.index.to_le_bytes());
                if epoch.index > 0 {
                    let previous_index = epoch.index - 1;
                    let previous = self
                        .epochs
                        .get(self.storage.as_ref(), &previous_index.to_le_bytes())?
                        .ok_or_else(|| {
                            LedgerError::Chain(format!("missing epoch {}", previous_index))
                        })?;
                    self.current_epoch = Some(previous);
                }
            } else {
                self.epochs
                    .put(self.storage.as_mut(), &epoch.index.to_le_bytes(), &epoch)?;
                self.current_epoch = Some(epoch);
            }
        }

        self.storage.flush()?;
        debug!(
            "Chain '{}' unwound block {} at height {}",
            self.name, hash, block.height
        );
        Ok(())
    }

    // Token state accessor: dispatch on the token's flags

    /// Balance of an address: fungible amount, or held ID count for
    /// non-fungible tokens
    pub fn get_token_balance(&self, token: &TokenInfo, address: &Address) -> u64 {
        if token.is_fungible() {
            BalanceSheet::new(&token.symbol).get(self.storage.as_ref(), address)
        } else {
            OwnershipSheet::new(&token.symbol)
                .ids_of(self.storage.as_ref(), address)
                .len() as u64
        }
    }

    /// IDs of a non-fungible token held by an address
    pub fn get_owned_tokens(&self, token: &TokenInfo, address: &Address) -> Vec<u64> {
        OwnershipSheet::new(&token.symbol).ids_of(self.storage.as_ref(), address)
    }
}
