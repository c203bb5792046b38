use arbora_core::{serialize, Address};
use arbora_storage::StorageContext;

use crate::error::LedgerError;

/// Non-fungible ownership for one token: the address-to-IDs relation and
/// its inverse, kept in lockstep under every mutation.
#[derive(Debug, Clone)]
pub struct OwnershipSheet {
    symbol: String,
}

impl OwnershipSheet {
    pub fn new(symbol: &str) -> Self {
        OwnershipSheet {
            symbol: symbol.to_string(),
        }
    }

    fn forward_key(&self, address: &Address) -> Vec<u8> {
        let mut key = format!("owner/{}/ids/", self.symbol).into_bytes();
        key.extend_from_slice(address.as_bytes());
        key
    }

    fn inverse_key(&self, id: u64) -> Vec<u8> {
        let mut key = format!("owner/{}/of/", self.symbol).into_bytes();
        key.extend_from_slice(&id.to_le_bytes());
        key
    }

    /// IDs held by an address
    pub fn ids_of(&self, store: &dyn StorageContext, address: &Address) -> Vec<u64> {
        store
            .get(&self.forward_key(address))
            .and_then(|bytes| serialize::from_bytes(&bytes).ok())
            .unwrap_or_default()
    }

    /// Owner of an ID, if any
    pub fn owner_of(&self, store: &dyn StorageContext, id: u64) -> Option<Address> {
        store
            .get(&self.inverse_key(id))
            .and_then(|bytes| serialize::from_bytes(&bytes).ok())
    }

    fn set_ids(&self, store: &mut dyn StorageContext, address: &Address, ids: &[u64]) {
        let key = self.forward_key(address);
        if ids.is_empty() {
            store.delete(&key);
        } else if let Ok(bytes) = serialize::to_bytes(&ids) {
            store.put(&key, &bytes);
        }
    }

    /// Assign an unowned ID to an address
    pub fn give(
        &self,
        store: &mut dyn StorageContext,
        address: &Address,
        id: u64,
    ) -> Result<(), LedgerError> {
        if let Some(owner) = self.owner_of(store, id) {
            return Err(LedgerError::Ownership(format!(
                "token {} id {} already owned by {}",
                self.symbol, id, owner
            )));
        }

        let mut ids = self.ids_of(store, address);
        ids.push(id);
        ids.sort_unstable();
        self.set_ids(store, address, &ids);

        if let Ok(bytes) = serialize::to_bytes(address) {
            store.put(&self.inverse_key(id), &bytes);
        }
        Ok(())
    }

    /// Remove an ID from its owner; the caller must name the owner
    pub fn take(
        &self,
        store: &mut dyn StorageContext,
        address: &Address,
        id: u64,
    ) -> Result<(), LedgerError> {
        match self.owner_of(store, id) {
            Some(owner) if owner == *address => {}
            Some(owner) => {
                return Err(LedgerError::Ownership(format!(
                    "token {} id {} owned by {}, not {}",
                    self.symbol, id, owner, address
                )))
            }
            None => {
                return Err(LedgerError::Ownership(format!(
                    "token {} id {} has no owner",
                    self.symbol, id
                )))
            }
        }

        let mut ids = self.ids_of(store, address);
        ids.retain(|held| *held != id);
        self.set_ids(store, address, &ids);

        store.delete(&self.inverse_key(id));
        Ok(())
    }

    /// Move an ID between addresses
    pub fn transfer(
        &self,
        store: &mut dyn StorageContext,
        from: &Address,
        to: &Address,
        id: u64,
    ) -> Result<(), LedgerError> {
        self.take(store, from, id)?;
        self.give(store, to, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbora_storage::MemoryStore;

    #[test]
    fn test_give_and_take_keep_relations_inverse() {
        let mut store = MemoryStore::new();
        let sheet = OwnershipSheet::new("CARD");
        let alice = Address::from_name("alice");

        sheet.give(&mut store, &alice, 7).unwrap();
        assert_eq!(sheet.ids_of(&store, &alice), vec![7]);
        assert_eq!(sheet.owner_of(&store, 7), Some(alice));

        sheet.take(&mut store, &alice, 7).unwrap();
        assert!(sheet.ids_of(&store, &alice).is_empty());
        assert_eq!(sheet.owner_of(&store, 7), None);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_double_give_rejected() {
        let mut store = MemoryStore::new();
        let sheet = OwnershipSheet::new("CARD");
        let alice = Address::from_name("alice");
        let bob = Address::from_name("bob");

        sheet.give(&mut store, &alice, 7).unwrap();
        assert!(sheet.give(&mut store, &bob, 7).is_err());
        assert_eq!(sheet.owner_of(&store, 7), Some(alice));
    }

    #[test]
    fn test_take_wrong_owner_rejected() {
        let mut store = MemoryStore::new();
        let sheet = OwnershipSheet::new("CARD");
        let alice = Address::from_name("alice");
        let bob = Address::from_name("bob");

        sheet.give(&mut store, &alice, 7).unwrap();
        assert!(sheet.take(&mut store, &bob, 7).is_err());
        assert!(sheet.take(&mut store, &alice, 99).is_err());
    }

    #[test]
    fn test_transfer() {
        let mut store = MemoryStore::new();
        let sheet = OwnershipSheet::new("CARD");
        let alice = Address::from_name("alice");
        let bob = Address::from_name("bob");

        sheet.give(&mut store, &alice, 1).unwrap();
        sheet.give(&mut store, &alice, 2).unwrap();
        sheet.transfer(&mut store, &alice, &bob, 1).unwrap();

        assert_eq!(sheet.ids_of(&store, &alice), vec![2]);
        assert_eq!(sheet.ids_of(&store, &bob), vec![1]);
        assert_eq!(sheet.owner_of(&store, 1), Some(bob));
        assert_eq!(sheet.owner_of(&store, 2), Some(alice));
    }
}
