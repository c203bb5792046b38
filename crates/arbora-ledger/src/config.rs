use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Nexus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NexusConfig {
    /// Name of the root chain
    pub root_chain: String,

    /// Storage cache size; a negative value selects the volatile
    /// in-memory backend, otherwise chains persist to `data_dir`
    pub cache_size: i64,

    /// Directory for durable chain stores
    pub data_dir: PathBuf,

    /// Blocks accepted per epoch before the validator rotates
    pub blocks_per_epoch: usize,
}

impl Default for NexusConfig {
    fn default() -> Self {
        NexusConfig {
            root_chain: "main".to_string(),
            cache_size: -1,
            data_dir: PathBuf::from("./arbora-data"),
            blocks_per_epoch: 1,
        }
    }
}

impl NexusConfig {
    /// Whether chains should use the volatile in-memory backend
    pub fn is_volatile(&self) -> bool {
        self.cache_size < 0
    }

    /// Load config from a JSON file
    pub fn load(path: &PathBuf) -> Result<Self, LedgerError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| LedgerError::Chain(e.to_string()))?;
        let config: NexusConfig =
            serde_json::from_str(&content).map_err(|e| LedgerError::Chain(e.to_string()))?;
        Ok(config)
    }

    /// Save config to a JSON file
    pub fn save(&self, path: &PathBuf) -> Result<(), LedgerError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| LedgerError::Chain(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| LedgerError::Chain(e.to_string()))?;
        Ok(())
    }
}
