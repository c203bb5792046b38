use arbora_core::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Type mismatch: expected {0}")]
    TypeMismatch(&'static str),

    #[error("Unknown interop method: {0}")]
    UnknownMethod(String),

    #[error("Out of gas: limit {limit}")]
    OutOfGas { limit: u64 },

    #[error("Call depth exceeded")]
    CallDepthExceeded,

    #[error("Write attempted in read-only context")]
    ReadOnlyContext,

    #[error("Witness check failed for {0}")]
    WitnessFailed(Address),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Token misuse: {0}")]
    InvalidToken(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] arbora_ledger::LedgerError),

    #[error("Core error: {0}")]
    Core(#[from] arbora_core::CoreError),
}
