use std::marker::PhantomData;

use arbora_core::serialize;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::StorageContext;
use crate::error::StorageError;

/// Typed facade over one namespace of a `StorageContext`.
///
/// Keys are prefixed with the namespace; values are bincode-encoded.
/// Chain-address scoping comes from each chain owning its own store.
#[derive(Debug, Clone)]
pub struct KeyValueStore<T> {
    prefix: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> KeyValueStore<T> {
    pub fn new(namespace: &str) -> Self {
        let mut prefix = namespace.as_bytes().to_vec();
        prefix.push(b'/');
        KeyValueStore {
            prefix,
            _marker: PhantomData,
        }
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(key);
        full
    }

    pub fn contains(&self, store: &dyn StorageContext, key: &[u8]) -> bool {
        store.contains(&self.full_key(key))
    }

    pub fn get(&self, store: &dyn StorageContext, key: &[u8]) -> Result<Option<T>, StorageError> {
        match store.get(&self.full_key(key)) {
            Some(bytes) => {
                let value = serialize::from_bytes(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn put(
        &self,
        store: &mut dyn StorageContext,
        key: &[u8],
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes =
            serialize::to_bytes(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        store.put(&self.full_key(key), &bytes);
        Ok(())
    }

    pub fn remove(&self, store: &mut dyn StorageContext, key: &[u8]) {
        store.delete(&self.full_key(key));
    }

    /// Number of entries in this namespace
    pub fn count(&self, store: &dyn StorageContext) -> usize {
        let mut count = 0;
        store.visit(&mut |key, _| {
            if key.starts_with(&self.prefix) {
                count += 1;
            }
        });
        count
    }
}
