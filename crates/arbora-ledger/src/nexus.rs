use std::collections::BTreeMap;
use std::sync::Arc;

use arbora_core::{Address, Block, Hash, TokenInfo};
use arbora_storage::{
    ChangeSetView, FileStore, MemoryStore, StorageChangeSet, StorageContext,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::chain::{is_valid_name, Chain};
use crate::config::NexusConfig;
use crate::error::LedgerError;
use crate::sheets::{BalanceSheet, SupplySheet};

/// Hook fired after a block commits, in registration order.
/// Callbacks must not reenter the writing chain.
pub trait ChainPlugin: Send + Sync {
    fn on_block(&self, chain: &Chain, block: &Block);
}

/// Shared handle serializing readers against the writer in progress
pub type SharedNexus = Arc<RwLock<Nexus>>;

/// Validate a token symbol: 2 to 10 characters from [A-Z0-9]
pub fn is_valid_symbol(symbol: &str) -> bool {
    if !(2..=10).contains(&symbol.len()) {
        return false;
    }
    symbol
        .bytes()
        .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9'))
}

/// Root registry of the chain tree.
///
/// Owns every chain as an arena keyed by address (chains refer to their
/// parent by address, never by reference), the token registry, the
/// ordered validator list, and the plugin list.
pub struct Nexus {
    config: NexusConfig,
    chains: BTreeMap<Address, Chain>,
    chain_names: BTreeMap<String, Address>,
    root: Address,
    tokens: BTreeMap<String, TokenInfo>,
    validators: Vec<Address>,
    plugins: Vec<Box<dyn ChainPlugin>>,
}

impl Nexus {
    /// Create a nexus with its root chain at level 1
    pub fn new(config: NexusConfig) -> Result<Self, LedgerError> {
        let root_name = config.root_chain.clone();
        let root_address = Address::from_name(&root_name);
        let storage = Self::make_storage(&config, &root_address)?;
        let root_chain = Chain::new(&root_name, 1, None, None, storage)?;

        info!("Nexus initialized with root chain '{}'", root_name);

        let mut chains = BTreeMap::new();
        let mut chain_names = BTreeMap::new();
        chains.insert(root_address, root_chain);
        chain_names.insert(root_name, root_address);

        Ok(Nexus {
            config,
            chains,
            chain_names,
            root: root_address,
            tokens: BTreeMap::new(),
            validators: Vec::new(),
            plugins: Vec::new(),
        })
    }

    /// Wrap into the shared reader-writer handle
    pub fn into_shared(self) -> SharedNexus {
        Arc::new(RwLock::new(self))
    }

    fn make_storage(
        config: &NexusConfig,
        address: &Address,
    ) -> Result<Box<dyn StorageContext>, LedgerError> {
        if config.is_volatile() {
            Ok(Box::new(MemoryStore::new()))
        } else {
            let path = config.data_dir.join(format!("{}.db", address.to_hex()));
            Ok(Box::new(FileStore::open(path)?))
        }
    }

    pub fn blocks_per_epoch(&self) -> usize {
        self.config.blocks_per_epoch
    }

    // Chain registry

    pub fn root(&self) -> Address {
        self.root
    }

    pub fn root_chain(&self) -> &Chain {
        // The root chain is created in `new` and never removed
        &self.chains[&self.root]
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.chains.values()
    }

    pub fn contains_chain(&self, name: &str) -> bool {
        self.chain_names.contains_key(name)
    }

    pub fn get_chain_by_name(&self, name: &str) -> Option<&Chain> {
        self.chain_names
            .get(name)
            .and_then(|address| self.chains.get(address))
    }

    pub fn get_chain(&self, address: &Address) -> Option<&Chain> {
        self.chains.get(address)
    }

    pub fn chain_mut(&mut self, address: &Address) -> Option<&mut Chain> {
        self.chains.get_mut(address)
    }

    /// Spawn a child chain under a parent, registering it in the
    /// parent's child map
    pub fn create_chain(&mut self, parent_name: &str, name: &str) -> Result<Address, LedgerError> {
        if !is_valid_name(name) {
            return Err(LedgerError::InvalidName(name.to_string()));
        }
        if self.chain_names.contains_key(name) {
            return Err(LedgerError::Chain(format!("chain '{}' already exists", name)));
        }

        let parent_address = *self
            .chain_names
            .get(parent_name)
            .ok_or_else(|| LedgerError::ChainNotFound(parent_name.to_string()))?;

        let (level, parent_block) = {
            let parent = self
                .chains
                .get(&parent_address)
                .ok_or_else(|| LedgerError::ChainNotFound(parent_name.to_string()))?;
            let parent_block = match parent.last_block() {
                Some(block) => Some(block.hash()?),
                None => None,
            };
            (parent.level() + 1, parent_block)
        };

        let address = Address::from_name(name);
        let storage = Self::make_storage(&self.config, &address)?;
        let chain = Chain::new(name, level, Some(parent_address), parent_block, storage)?;

        if let Some(parent) = self.chains.get_mut(&parent_address) {
            parent.register_child(name, address);
        }
        self.chain_names.insert(name.to_string(), address);
        self.chains.insert(address, chain);

        info!(
            "Created chain '{}' at level {} under '{}'",
            name, level, parent_name
        );
        Ok(address)
    }

    // Token registry

    /// Register a token; a capped token seeds the root supply sheet with
    /// its max supply
    pub fn create_token(&mut self, token: TokenInfo) -> Result<(), LedgerError> {
        if !is_valid_symbol(&token.symbol) {
            return Err(LedgerError::InvalidName(token.symbol));
        }
        if self.tokens.contains_key(&token.symbol) {
            return Err(LedgerError::TokenExists(token.symbol));
        }
        if token.is_capped() {
            if token.max_supply == 0 {
                return Err(LedgerError::Chain(format!(
                    "capped token {} needs a max supply",
                    token.symbol
                )));
            }
            let root = self
                .chains
                .get_mut(&self.root)
                .ok_or_else(|| LedgerError::ChainNotFound("root".to_string()))?;
            SupplySheet::new(&token.symbol).init(root.storage_mut(), token.max_supply);
            root.storage_mut().flush()?;
        }

        info!("Registered token {} ({})", token.symbol, token.name);
        self.tokens.insert(token.symbol.clone(), token);
        Ok(())
    }

    pub fn get_token(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens.get(symbol)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }

    // Validators

    pub fn set_validators(&mut self, validators: Vec<Address>) {
        self.validators = validators;
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    pub fn get_validator_by_index(&self, index: usize) -> Option<Address> {
        self.validators.get(index).copied()
    }

    pub fn get_index_of_validator(&self, address: &Address) -> Option<usize> {
        self.validators.iter().position(|v| v == address)
    }

    pub fn get_validator_count(&self) -> usize {
        self.validators.len()
    }

    /// True when the address holds production authority on the chain
    pub fn is_current_validator(&self, chain: &Address, address: &Address) -> bool {
        self.chains
            .get(chain)
            .map(|c| c.is_current_validator(address, &self.validators))
            .unwrap_or(false)
    }

    // Plugins

    pub fn add_plugin(&mut self, plugin: Box<dyn ChainPlugin>) {
        self.plugins.push(plugin);
    }

    /// Fire plugin hooks for a committed block, in registration order
    pub fn plugin_trigger_block(&self, chain_address: &Address, block: &Block) {
        if let Some(chain) = self.chains.get(chain_address) {
            for plugin in &self.plugins {
                plugin.on_block(chain, block);
            }
        }
    }

    // Token state

    pub fn get_token_balance(
        &self,
        chain_address: &Address,
        symbol: &str,
        address: &Address,
    ) -> Result<u64, LedgerError> {
        let token = self
            .tokens
            .get(symbol)
            .ok_or_else(|| LedgerError::TokenNotFound(symbol.to_string()))?;
        let chain = self
            .chains
            .get(chain_address)
            .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
        Ok(chain.get_token_balance(token, address))
    }

    /// The `{local, child, max}` supply triple of a capped token on a
    /// chain. On a child chain with no sheet yet, the first read seeds
    /// the max slice from the parent's current local balance.
    pub fn get_token_supply(
        &mut self,
        chain_address: &Address,
        symbol: &str,
    ) -> Result<(u64, u64, u64), LedgerError> {
        let token = self
            .tokens
            .get(symbol)
            .ok_or_else(|| LedgerError::TokenNotFound(symbol.to_string()))?;
        if !token.is_capped() {
            return Err(LedgerError::Chain(format!("token {} is not capped", symbol)));
        }

        let sheet = SupplySheet::new(symbol);

        let needs_seed = {
            let chain = self
                .chains
                .get(chain_address)
                .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
            !sheet.is_initialized(chain.storage())
        };

        if needs_seed {
            let parent_address = self
                .chains
                .get(chain_address)
                .and_then(|c| c.parent());
            if let Some(parent_address) = parent_address {
                let parent_local = {
                    let parent = self
                        .chains
                        .get(&parent_address)
                        .ok_or_else(|| LedgerError::ChainNotFound(parent_address.to_hex()))?;
                    sheet.local(parent.storage())
                };
                if let Some(chain) = self.chains.get_mut(chain_address) {
                    sheet.ensure_seeded(chain.storage_mut(), parent_local);
                    chain.storage_mut().flush()?;
                }
            }
        }

        let chain = self
            .chains
            .get(chain_address)
            .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
        Ok((
            sheet.local(chain.storage()),
            sheet.child(chain.storage()),
            sheet.max(chain.storage()),
        ))
    }

    /// Sum of local balances across the whole tree; never exceeds the
    /// token's max supply for any valid history
    pub fn total_token_supply(&self, symbol: &str) -> u64 {
        let sheet = SupplySheet::new(symbol);
        self.chains
            .values()
            .fold(0u64, |total, chain| total.saturating_add(sheet.local(chain.storage())))
    }

    /// Mint directly outside block application (genesis-style setup)
    pub fn mint_tokens(
        &mut self,
        chain_address: &Address,
        symbol: &str,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let token = self
            .tokens
            .get(symbol)
            .ok_or_else(|| LedgerError::TokenNotFound(symbol.to_string()))?
            .clone();
        if !token.is_fungible() {
            return Err(LedgerError::Chain(format!("token {} is not fungible", symbol)));
        }
        let chain = self
            .chains
            .get_mut(chain_address)
            .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;

        if token.is_capped() {
            SupplySheet::new(symbol).mint(chain.storage_mut(), amount)?;
        }
        BalanceSheet::new(symbol).add(chain.storage_mut(), to, amount);
        chain.storage_mut().flush()?;
        Ok(())
    }

    // Cross-chain capped supply

    fn verify_child_of(&self, parent: &Address, child: &Address) -> Result<(), LedgerError> {
        let child_chain = self
            .chains
            .get(child)
            .ok_or_else(|| LedgerError::ChainNotFound(child.to_hex()))?;
        if child_chain.parent() != Some(*parent) {
            return Err(LedgerError::Chain(format!(
                "chain {} is not a child of {}",
                child.to_hex(),
                parent.to_hex()
            )));
        }
        self.chains
            .get(parent)
            .map(|_| ())
            .ok_or_else(|| LedgerError::ChainNotFound(parent.to_hex()))
    }

    /// Move a capped token holding from a parent chain into one of its
    /// children. Both sides stage into change sets; the parent journal is
    /// applied first (writer ordering is parent before child).
    pub fn transfer_to_child(
        &mut self,
        parent_address: &Address,
        child_address: &Address,
        symbol: &str,
        owner: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let token = self
            .tokens
            .get(symbol)
            .ok_or_else(|| LedgerError::TokenNotFound(symbol.to_string()))?;
        if !token.is_fungible() || !token.is_capped() {
            return Err(LedgerError::Chain(format!(
                "token {} does not support cross-chain supply transfer",
                symbol
            )));
        }
        self.verify_child_of(parent_address, child_address)?;

        let supply = SupplySheet::new(symbol);
        let balances = BalanceSheet::new(symbol);
        let mut parent_changes = StorageChangeSet::new();
        let mut child_changes = StorageChangeSet::new();

        {
            let parent = self
                .chains
                .get(parent_address)
                .ok_or_else(|| LedgerError::ChainNotFound(parent_address.to_hex()))?;
            let child = self
                .chains
                .get(child_address)
                .ok_or_else(|| LedgerError::ChainNotFound(child_address.to_hex()))?;

            let mut parent_view = ChangeSetView::new(parent.storage(), &mut parent_changes);
            let mut child_view = ChangeSetView::new(child.storage(), &mut child_changes);

            balances.subtract(&mut parent_view, owner, amount)?;
            supply.move_to_child(&mut parent_view, &mut child_view, amount)?;
            balances.add(&mut child_view, owner, amount);
        }

        self.apply_pair(parent_address, parent_changes, child_address, child_changes)?;

        debug!(
            "Moved {} {} from {} into child {}",
            amount,
            symbol,
            parent_address.to_hex(),
            child_address.to_hex()
        );
        Ok(())
    }

    /// Move a capped token holding from a child chain back to its parent
    pub fn transfer_from_child(
        &mut self,
        parent_address: &Address,
        child_address: &Address,
        symbol: &str,
        owner: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let token = self
            .tokens
            .get(symbol)
            .ok_or_else(|| LedgerError::TokenNotFound(symbol.to_string()))?;
        if !token.is_fungible() || !token.is_capped() {
            return Err(LedgerError::Chain(format!(
                "token {} does not support cross-chain supply transfer",
                symbol
            )));
        }
        self.verify_child_of(parent_address, child_address)?;

        let supply = SupplySheet::new(symbol);
        let balances = BalanceSheet::new(symbol);
        let mut parent_changes = StorageChangeSet::new();
        let mut child_changes = StorageChangeSet::new();

        {
            let parent = self
                .chains
                .get(parent_address)
                .ok_or_else(|| LedgerError::ChainNotFound(parent_address.to_hex()))?;
            let child = self
                .chains
                .get(child_address)
                .ok_or_else(|| LedgerError::ChainNotFound(child_address.to_hex()))?;

            let mut parent_view = ChangeSetView::new(parent.storage(), &mut parent_changes);
            let mut child_view = ChangeSetView::new(child.storage(), &mut child_changes);

            balances.subtract(&mut child_view, owner, amount)?;
            supply.move_from_child(&mut parent_view, &mut child_view, amount)?;
            balances.add(&mut parent_view, owner, amount);
        }

        self.apply_pair(parent_address, parent_changes, child_address, child_changes)?;
        Ok(())
    }

    fn apply_pair(
        &mut self,
        parent_address: &Address,
        parent_changes: StorageChangeSet,
        child_address: &Address,
        child_changes: StorageChangeSet,
    ) -> Result<(), LedgerError> {
        let parent = self
            .chains
            .get_mut(parent_address)
            .ok_or_else(|| LedgerError::ChainNotFound(parent_address.to_hex()))?;
        parent_changes.execute(parent.storage_mut());
        parent.storage_mut().flush()?;

        let child = self
            .chains
            .get_mut(child_address)
            .ok_or_else(|| LedgerError::ChainNotFound(child_address.to_hex()))?;
        child_changes.execute(child.storage_mut());
        child.storage_mut().flush()?;
        Ok(())
    }

    // Rollback

    /// Walk backward from the chain head, undoing each block's change
    /// sets and removing its bookkeeping, until the predecessor equals
    /// `target`. The target block and everything before it are retained;
    /// a null target clears the chain.
    pub fn delete_blocks(&mut self, chain_address: &Address, target: Hash) -> Result<(), LedgerError> {
        loop {
            let (block, block_hash) = {
                let chain = self
                    .chains
                    .get(chain_address)
                    .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
                match chain.last_block() {
                    None => {
                        if target.is_null() {
                            return Ok(());
                        }
                        return Err(LedgerError::RollbackTargetNotFound(target));
                    }
                    Some(last) => {
                        let hash = last.hash()?;
                        if hash == target {
                            return Ok(());
                        }
                        (last.clone(), hash)
                    }
                }
            };

            let bundle = self
                .chains
                .get_mut(chain_address)
                .and_then(|chain| chain.take_block_changes(&block_hash))
                .ok_or(LedgerError::MissingChangeSet(block_hash))?;

            for (touched, changes) in bundle.chains() {
                let chain = self
                    .chains
                    .get_mut(touched)
                    .ok_or_else(|| LedgerError::ChainNotFound(touched.to_hex()))?;
                changes.undo(chain.storage_mut());
                chain.storage_mut().flush()?;
            }

            let chain = self
                .chains
                .get_mut(chain_address)
                .ok_or_else(|| LedgerError::ChainNotFound(chain_address.to_hex()))?;
            chain.unwind_block(&block)?;

            info!(
                "Chain '{}' rolled back block {} at height {}",
                chain.name(),
                block_hash,
                block.height
            );

            if block.previous_hash.is_null() {
                chain.set_last_block(None);
                if target.is_null() {
                    return Ok(());
                }
                return Err(LedgerError::RollbackTargetNotFound(target));
            }

            let previous = chain
                .find_block_by_hash(&block.previous_hash)?
                .ok_or(LedgerError::MissingBlock(block.previous_hash))?;
            chain.set_last_block(Some(previous));
        }
    }
}
