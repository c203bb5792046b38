use serde::{Deserialize, Serialize};

use crate::crypto::{hash_blake3, sign, verify, Hash, PublicKey, SecretKey, Sig};
use crate::error::CoreError;
use crate::serialize;

/// A script-carrying transaction bound to a named chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's public key
    pub sender: PublicKey,
    /// Name of the chain this transaction applies to
    pub chain: String,
    /// Serialized script executed by the runtime VM
    pub script: Vec<u8>,
    /// Sender-chosen replay discriminator
    pub nonce: u64,
    /// Gas price paid per consumed unit
    pub gas_price: u64,
    /// Maximum gas the script may consume
    pub gas_limit: u64,
    /// Signature over the transaction (excluding this field)
    pub signature: Sig,
}

/// Transaction data covered by the signature
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransactionSigningData {
    sender: PublicKey,
    chain: String,
    script: Vec<u8>,
    nonce: u64,
    gas_price: u64,
    gas_limit: u64,
}

impl Transaction {
    /// Create a new unsigned transaction
    pub fn new(
        sender: PublicKey,
        chain: &str,
        script: Vec<u8>,
        nonce: u64,
        gas_price: u64,
        gas_limit: u64,
    ) -> Self {
        Transaction {
            sender,
            chain: chain.to_string(),
            script,
            nonce,
            gas_price,
            gas_limit,
            signature: Sig::default(),
        }
    }

    fn signing_data(&self) -> TransactionSigningData {
        TransactionSigningData {
            sender: self.sender,
            chain: self.chain.clone(),
            script: self.script.clone(),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
        }
    }

    /// Get the bytes covered by the signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serialize::to_bytes(&self.signing_data())
    }

    /// Sign the transaction
    pub fn sign(&mut self, secret_key: &SecretKey) -> Result<(), CoreError> {
        let bytes = self.signing_bytes()?;
        self.signature = sign(secret_key, &bytes);
        Ok(())
    }

    /// Create a signed transaction
    pub fn new_signed(
        sender: PublicKey,
        chain: &str,
        script: Vec<u8>,
        nonce: u64,
        gas_price: u64,
        gas_limit: u64,
        secret_key: &SecretKey,
    ) -> Result<Self, CoreError> {
        let mut tx = Self::new(sender, chain, script, nonce, gas_price, gas_limit);
        tx.sign(secret_key)?;
        Ok(tx)
    }

    /// Verify the transaction signature
    pub fn verify_signature(&self) -> Result<(), CoreError> {
        let bytes = self.signing_bytes()?;
        verify(&self.sender, &bytes, &self.signature)
    }

    /// Check whether this transaction targets the given chain
    pub fn applies_to(&self, chain_name: &str) -> bool {
        self.chain == chain_name
    }

    /// Compute the transaction hash over the full serialized content
    pub fn hash(&self) -> Result<Hash, CoreError> {
        let bytes = serialize::to_bytes(self)?;
        Ok(hash_blake3(&bytes))
    }
}
