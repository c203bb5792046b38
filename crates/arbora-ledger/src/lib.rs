//! Arbora Ledger - chains, token sheets, epochs, and the nexus registry
//!
//! The authoritative ledger state of a chain tree: per-token balance,
//! supply, and ownership sheets over chain storage, the `Chain` state
//! container, and the `Nexus` arena that owns all chains, the validator
//! list, and the plugin hooks.

pub mod chain;
pub mod config;
pub mod error;
pub mod nexus;
pub mod sheets;

pub use chain::{is_valid_name, Chain};
pub use config::NexusConfig;
pub use error::LedgerError;
pub use nexus::{ChainPlugin, Nexus, SharedNexus};
pub use sheets::{BalanceSheet, OwnershipSheet, SupplySheet};
