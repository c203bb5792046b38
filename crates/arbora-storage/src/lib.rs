//! Arbora Storage - storage contexts and change-set journaling
//!
//! Provides the `StorageContext` abstraction over key-value backends, the
//! volatile and durable store implementations, the journaled change-set
//! used to make block application atomic, and a typed namespace facade.

pub mod changeset;
pub mod context;
pub mod error;
pub mod file;
pub mod keystore;
pub mod memory;

pub use changeset::{ChangeEntry, ChangeSetBundle, ChangeSetView, StorageChangeSet};
pub use context::StorageContext;
pub use error::StorageError;
pub use file::FileStore;
pub use keystore::KeyValueStore;
pub use memory::MemoryStore;
