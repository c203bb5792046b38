use std::collections::BTreeMap;

use arbora_core::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::StorageContext;

/// One journal entry: the key, the value it had before the first touch,
/// and the value after this write (`None` means deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub key: Vec<u8>,
    pub before: Option<Vec<u8>>,
    pub after: Option<Vec<u8>>,
}

/// A buffered overlay over a parent `StorageContext`.
///
/// Writes append to an ordered journal; reads consult the overlay first
/// and fall back to the parent. `execute` applies the journal to a target
/// store in order, `undo` restores `before` values in reverse. A change
/// set must not be reused after `execute` or `undo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageChangeSet {
    overlay: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    journal: Vec<ChangeEntry>,
}

impl StorageChangeSet {
    pub fn new() -> Self {
        StorageChangeSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    pub fn journal(&self) -> &[ChangeEntry] {
        &self.journal
    }

    /// Read through the overlay, falling back to the parent
    pub fn get(&self, parent: &dyn StorageContext, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(buffered) = self.overlay.get(key) {
            return buffered.clone();
        }
        parent.get(key)
    }

    pub fn contains(&self, parent: &dyn StorageContext, key: &[u8]) -> bool {
        self.get(parent, key).is_some()
    }

    fn record(&mut self, parent: &dyn StorageContext, key: &[u8], after: Option<Vec<u8>>) {
        let before = match self.overlay.get(key) {
            Some(buffered) => buffered.clone(),
            None => parent.get(key),
        };
        self.journal.push(ChangeEntry {
            key: key.to_vec(),
            before,
            after: after.clone(),
        });
        self.overlay.insert(key.to_vec(), after);
    }

    /// Buffer a write
    pub fn put(&mut self, parent: &dyn StorageContext, key: &[u8], value: &[u8]) {
        self.record(parent, key, Some(value.to_vec()));
    }

    /// Buffer a deletion
    pub fn delete(&mut self, parent: &dyn StorageContext, key: &[u8]) {
        self.record(parent, key, None);
    }

    /// Apply the journal to the target in order
    pub fn execute(&self, target: &mut dyn StorageContext) {
        debug!("Executing change set with {} entries", self.journal.len());
        for entry in &self.journal {
            match &entry.after {
                Some(value) => target.put(&entry.key, value),
                None => target.delete(&entry.key),
            }
        }
    }

    /// Apply inverse entries in reverse order
    pub fn undo(&self, target: &mut dyn StorageContext) {
        debug!("Undoing change set with {} entries", self.journal.len());
        for entry in self.journal.iter().rev() {
            match &entry.before {
                Some(value) => target.put(&entry.key, value),
                None => target.delete(&entry.key),
            }
        }
    }
}

/// Adapts a (parent, change set) pair into a `StorageContext` so sheet and
/// VM code writes through the overlay without knowing about journaling.
pub struct ChangeSetView<'a> {
    parent: &'a dyn StorageContext,
    changes: &'a mut StorageChangeSet,
}

impl<'a> ChangeSetView<'a> {
    pub fn new(parent: &'a dyn StorageContext, changes: &'a mut StorageChangeSet) -> Self {
        ChangeSetView { parent, changes }
    }
}

impl StorageContext for ChangeSetView<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.changes.get(self.parent, key)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.changes.put(self.parent, key, value);
    }

    fn delete(&mut self, key: &[u8]) {
        self.changes.delete(self.parent, key);
    }

    fn count(&self) -> usize {
        let mut count = self.parent.count();
        for (key, buffered) in &self.changes.overlay {
            match (self.parent.contains(key), buffered.is_some()) {
                (true, false) => count -= 1,
                (false, true) => count += 1,
                _ => {}
            }
        }
        count
    }

    fn visit(&self, visitor: &mut dyn FnMut(&[u8], &[u8])) {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        self.parent.visit(&mut |key, value| {
            merged.insert(key.to_vec(), value.to_vec());
        });
        for (key, buffered) in &self.changes.overlay {
            match buffered {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        for (key, value) in &merged {
            visitor(key, value);
        }
    }
}

/// Change sets grouped per chain address for one block application.
///
/// The home chain stages here, and so do any other chains the runtime
/// touched; commit executes every journal and the bundle is retained per
/// block so rollback can undo foreign effects too.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSetBundle {
    sets: BTreeMap<Address, StorageChangeSet>,
}

impl ChangeSetBundle {
    pub fn new() -> Self {
        ChangeSetBundle::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.values().all(|s| s.is_empty())
    }

    /// Change set for a chain, created on first touch
    pub fn entry(&mut self, chain: Address) -> &mut StorageChangeSet {
        self.sets.entry(chain).or_default()
    }

    pub fn get(&self, chain: &Address) -> Option<&StorageChangeSet> {
        self.sets.get(chain)
    }

    /// Chains touched by this bundle, in address order
    pub fn chains(&self) -> impl Iterator<Item = (&Address, &StorageChangeSet)> {
        self.sets.iter()
    }
}
