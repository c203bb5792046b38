use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::crypto::PublicKey;

/// A 32-byte public identity, derived from a public key or a canonical name
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The distinguished null address (all zeroes)
    pub const NULL: Address = Address([0u8; 32]);

    /// Derive an address from a public key
    pub fn from_pubkey(pubkey: &PublicKey) -> Self {
        let digest = Sha256::digest(pubkey.as_bytes());
        Address(digest.into())
    }

    /// Derive an address from a canonical name (lowercased before hashing)
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.to_lowercase().as_bytes());
        Address(digest.into())
    }

    pub fn is_null(&self) -> bool {
        *self == Address::NULL
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Address(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
