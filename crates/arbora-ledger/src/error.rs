use arbora_core::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Block generation failed: {0}")]
    BlockGeneration(String),

    #[error("Invalid transaction {0}")]
    InvalidTransaction(Hash),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Token already exists: {0}")]
    TokenExists(String),

    #[error("Contract already exists: {0}")]
    ContractExists(String),

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    #[error("Supply cap exceeded: minting {amount} with local {local}, child {child}, max {max}")]
    SupplyExceeded {
        amount: u64,
        local: u64,
        child: u64,
        max: u64,
    },

    #[error("Ownership violation: {0}")]
    Ownership(String),

    #[error("Missing change set for block {0}")]
    MissingChangeSet(Hash),

    #[error("Rollback target not found: {0}")]
    RollbackTargetNotFound(Hash),

    #[error("Missing block during rollback: {0}")]
    MissingBlock(Hash),

    #[error("Storage error: {0}")]
    Storage(#[from] arbora_storage::StorageError),

    #[error("Core error: {0}")]
    Core(#[from] arbora_core::CoreError),
}
