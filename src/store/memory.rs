// src/store/memory.rs

//! In-process artifact store

use super::{ArtifactStore, ProviderType, StoreKey, StoreLocation};
use crate::error::{Error, Result};
use crate::hash;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Store backed by a shared map; clones share contents
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<StoreKey, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn objects(&self) -> Result<MutexGuard<'_, HashMap<StoreKey, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| Error::ProviderFailure("memory store lock poisoned".to_string()))
    }
}

impl ArtifactStore for MemoryStore {
    fn provider(&self) -> ProviderType {
        ProviderType::Memory
    }

    fn put(&self, key: StoreKey, bytes: &[u8]) -> Result<StoreLocation> {
        self.objects()?.insert(key, bytes.to_vec());
        Ok(StoreLocation {
            provider: ProviderType::Memory,
            key,
            uri: format!("memory://{}/{}", key.id, key.version_sequence),
            size: bytes.len() as u64,
            checksum: hash::sha256(bytes),
        })
    }

    fn get(&self, location: &StoreLocation) -> Result<Vec<u8>> {
        let content = self.objects()?.get(&location.key).cloned().ok_or_else(|| {
            Error::ProviderFailure(format!("Object {} not found in memory store", location.key))
        })?;
        hash::verify_sha256(&content, &location.checksum)
            .map_err(|e| Error::ProviderFailure(format!("Object {}: {}", location.key, e)))?;
        Ok(content)
    }

    fn exists(&self, key: StoreKey) -> bool {
        self.objects().map(|o| o.contains_key(&key)).unwrap_or(false)
    }

    fn remove(&self, location: &StoreLocation) -> Result<()> {
        self.objects()?.remove(&location.key);
        Ok(())
    }
}
