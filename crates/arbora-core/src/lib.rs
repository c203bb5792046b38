//! Arbora Core - core types, cryptography, and serialization
//!
//! This crate provides the foundational types shared by the storage,
//! ledger, and runtime crates: hashes, addresses, keys and signatures,
//! tokens, transactions, blocks, events, epochs, and contracts.

pub mod crypto;
pub mod error;
pub mod serialize;
pub mod types;

pub use crypto::{hash_blake3, sign, verify, Hash, KeyPair, PublicKey, SecretKey, Sig};
pub use error::CoreError;
pub use types::*;
