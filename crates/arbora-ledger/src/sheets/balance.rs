use arbora_core::{serialize, Address};
use arbora_storage::StorageContext;

use crate::error::LedgerError;

/// Fungible balances for one token: a typed projection over storage keys.
///
/// Mutations take a `StorageContext` so that under a block every write is
/// buffered by the change set.
#[derive(Debug, Clone)]
pub struct BalanceSheet {
    symbol: String,
}

impl BalanceSheet {
    pub fn new(symbol: &str) -> Self {
        BalanceSheet {
            symbol: symbol.to_string(),
        }
    }

    fn key(&self, address: &Address) -> Vec<u8> {
        let mut key = format!("balance/{}/", self.symbol).into_bytes();
        key.extend_from_slice(address.as_bytes());
        key
    }

    fn prefix(&self) -> Vec<u8> {
        format!("balance/{}/", self.symbol).into_bytes()
    }

    /// Current balance of an address, zero when absent
    pub fn get(&self, store: &dyn StorageContext, address: &Address) -> u64 {
        store
            .get(&self.key(address))
            .and_then(|bytes| serialize::from_bytes(&bytes).ok())
            .unwrap_or(0)
    }

    fn set(&self, store: &mut dyn StorageContext, address: &Address, amount: u64) {
        let key = self.key(address);
        if amount == 0 {
            store.delete(&key);
        } else if let Ok(bytes) = serialize::to_bytes(&amount) {
            store.put(&key, &bytes);
        }
    }

    /// Credit an address
    pub fn add(&self, store: &mut dyn StorageContext, address: &Address, amount: u64) {
        let balance = self.get(store, address);
        self.set(store, address, balance.saturating_add(amount));
    }

    /// Debit an address, failing when the balance is insufficient
    pub fn subtract(
        &self,
        store: &mut dyn StorageContext,
        address: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let balance = self.get(store, address);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }
        self.set(store, address, balance - amount);
        Ok(())
    }

    /// Move an amount between two addresses
    pub fn transfer(
        &self,
        store: &mut dyn StorageContext,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.subtract(store, from, amount)?;
        self.add(store, to, amount);
        Ok(())
    }

    /// Sum over all addresses; equals the supply sheet's local balance
    pub fn total(&self, store: &dyn StorageContext) -> u64 {
        let prefix = self.prefix();
        let mut total: u64 = 0;
        store.visit(&mut |key, value| {
            if key.starts_with(&prefix) {
                if let Ok(amount) = serialize::from_bytes::<u64>(value) {
                    total = total.saturating_add(amount);
                }
            }
        });
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbora_storage::MemoryStore;

    #[test]
    fn test_add_and_subtract() {
        let mut store = MemoryStore::new();
        let sheet = BalanceSheet::new("GOLD");
        let alice = Address::from_name("alice");

        assert_eq!(sheet.get(&store, &alice), 0);

        sheet.add(&mut store, &alice, 500);
        assert_eq!(sheet.get(&store, &alice), 500);

        sheet.subtract(&mut store, &alice, 200).unwrap();
        assert_eq!(sheet.get(&store, &alice), 300);

        let result = sheet.subtract(&mut store, &alice, 1000);
        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { have: 300, need: 1000 })
        ));
    }

    #[test]
    fn test_transfer() {
        let mut store = MemoryStore::new();
        let sheet = BalanceSheet::new("GOLD");
        let alice = Address::from_name("alice");
        let bob = Address::from_name("bob");

        sheet.add(&mut store, &alice, 500);
        sheet.transfer(&mut store, &alice, &bob, 200).unwrap();

        assert_eq!(sheet.get(&store, &alice), 300);
        assert_eq!(sheet.get(&store, &bob), 200);
        assert_eq!(sheet.total(&store), 500);
    }

    #[test]
    fn test_zero_balance_removes_key() {
        let mut store = MemoryStore::new();
        let sheet = BalanceSheet::new("GOLD");
        let alice = Address::from_name("alice");

        sheet.add(&mut store, &alice, 100);
        sheet.subtract(&mut store, &alice, 100).unwrap();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_symbols_isolated() {
        let mut store = MemoryStore::new();
        let gold = BalanceSheet::new("GOLD");
        let iron = BalanceSheet::new("IRON");
        let alice = Address::from_name("alice");

        gold.add(&mut store, &alice, 10);
        iron.add(&mut store, &alice, 20);

        assert_eq!(gold.get(&store, &alice), 10);
        assert_eq!(iron.get(&store, &alice), 20);
        assert_eq!(gold.total(&store), 10);
    }
}
