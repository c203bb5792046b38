use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Core error: {0}")]
    Core(#[from] arbora_core::CoreError),
}
