use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use arbora_core::serialize;

use crate::context::StorageContext;
use crate::error::StorageError;

/// File-backed storage using a single snapshot file; the durable backend
/// flavor. Writes stay in memory until `flush`.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl FileStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StorageError> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = fs::read(&path).map_err(|e| StorageError::Backend(e.to_string()))?;
            if bytes.is_empty() {
                BTreeMap::new()
            } else {
                serialize::from_bytes(&bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(FileStore { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush_to_disk(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        let bytes = serialize::to_bytes(&self.data)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| StorageError::Backend(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

impl StorageContext for FileStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.data.insert(key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, key: &[u8]) {
        self.data.remove(key);
    }

    fn count(&self) -> usize {
        self.data.len()
    }

    fn visit(&self, visitor: &mut dyn FnMut(&[u8], &[u8])) {
        for (key, value) in &self.data {
            visitor(key, value);
        }
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.flush_to_disk()
    }
}
