//! Arbora - hierarchical chain core
//!
//! Re-exports the member crates: core types, change-set storage, the
//! ledger (chains, sheets, nexus), and the runtime VM bridge.

pub use arbora_core as core;
pub use arbora_ledger as ledger;
pub use arbora_storage as storage;
pub use arbora_vm as vm;
