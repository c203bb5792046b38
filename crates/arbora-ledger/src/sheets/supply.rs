use arbora_core::serialize;
use arbora_storage::StorageContext;
use tracing::debug;

use crate::error::LedgerError;

/// Capped-supply accounting for one token on one chain.
///
/// Persists the `{local, child, max}` triple. On the root chain `max` is
/// the token's max supply; on a child chain `max` is the slice seeded from
/// the parent's local balance at first access. The invariant
/// `local + child <= max` bounds minting, and cross-chain moves keep the
/// parent's child balance equal to the sum of its children's locals.
#[derive(Debug, Clone)]
pub struct SupplySheet {
    symbol: String,
}

impl SupplySheet {
    pub fn new(symbol: &str) -> Self {
        SupplySheet {
            symbol: symbol.to_string(),
        }
    }

    fn key(&self, field: &str) -> Vec<u8> {
        format!("supply/{}/{}", self.symbol, field).into_bytes()
    }

    fn read(&self, store: &dyn StorageContext, field: &str) -> u64 {
        store
            .get(&self.key(field))
            .and_then(|bytes| serialize::from_bytes(&bytes).ok())
            .unwrap_or(0)
    }

    fn write(&self, store: &mut dyn StorageContext, field: &str, value: u64) {
        if let Ok(bytes) = serialize::to_bytes(&value) {
            store.put(&self.key(field), &bytes);
        }
    }

    /// Whether this chain already carries a sheet for the token
    pub fn is_initialized(&self, store: &dyn StorageContext) -> bool {
        store.contains(&self.key("max"))
    }

    /// Seed the sheet's max slice; on the root chain this is the token's
    /// max supply, on a child chain the parent's local balance at seed time
    pub fn init(&self, store: &mut dyn StorageContext, max: u64) {
        debug!("Seeding supply sheet for {} with max {}", self.symbol, max);
        self.write(store, "max", max);
    }

    /// Seed from the parent's current local balance unless already seeded
    pub fn ensure_seeded(&self, store: &mut dyn StorageContext, parent_local: u64) {
        if !self.is_initialized(store) {
            self.init(store, parent_local);
        }
    }

    pub fn local(&self, store: &dyn StorageContext) -> u64 {
        self.read(store, "local")
    }

    pub fn child(&self, store: &dyn StorageContext) -> u64 {
        self.read(store, "child")
    }

    pub fn max(&self, store: &dyn StorageContext) -> u64 {
        self.read(store, "max")
    }

    /// Mint into the local balance, bounded by the max slice
    pub fn mint(&self, store: &mut dyn StorageContext, amount: u64) -> Result<(), LedgerError> {
        let local = self.local(store);
        let child = self.child(store);
        let max = self.max(store);

        let minted = local
            .checked_add(child)
            .and_then(|held| held.checked_add(amount));
        match minted {
            Some(total) if total <= max => {
                self.write(store, "local", local + amount);
                Ok(())
            }
            _ => Err(LedgerError::SupplyExceeded {
                amount,
                local,
                child,
                max,
            }),
        }
    }

    /// Burn from the local balance
    pub fn burn(&self, store: &mut dyn StorageContext, amount: u64) -> Result<(), LedgerError> {
        let local = self.local(store);
        if local < amount {
            return Err(LedgerError::InsufficientBalance {
                have: local,
                need: amount,
            });
        }
        self.write(store, "local", local - amount);
        Ok(())
    }

    /// Move supply from a parent chain into one of its children.
    /// The parent is mutated first (lock ordering is parent before child).
    pub fn move_to_child(
        &self,
        parent: &mut dyn StorageContext,
        child: &mut dyn StorageContext,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let parent_local = self.local(parent);
        if parent_local < amount {
            return Err(LedgerError::InsufficientBalance {
                have: parent_local,
                need: amount,
            });
        }

        // Seed the child slice from the pre-transfer parent balance
        self.ensure_seeded(child, parent_local);

        self.write(parent, "local", parent_local - amount);
        let parent_child = self.child(parent);
        self.write(parent, "child", parent_child + amount);
        let child_local = self.local(child);
        self.write(child, "local", child_local + amount);
        Ok(())
    }

    /// Move supply from a child chain back into its parent
    pub fn move_from_child(
        &self,
        parent: &mut dyn StorageContext,
        child: &mut dyn StorageContext,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let child_local = self.local(child);
        if child_local < amount {
            return Err(LedgerError::InsufficientBalance {
                have: child_local,
                need: amount,
            });
        }
        let parent_child = self.child(parent);
        if parent_child < amount {
            return Err(LedgerError::InsufficientBalance {
                have: parent_child,
                need: amount,
            });
        }

        self.write(parent, "child", parent_child - amount);
        let parent_local = self.local(parent);
        self.write(parent, "local", parent_local + amount);
        self.write(child, "local", child_local - amount);
        Ok(())
    }
}
