// src/store/mod.rs

//! Artifact store providers
//!
//! Published package bytes live in a provider keyed by the revision
//! identity (holon id + version sequence). Two providers ship with the
//! engine:
//! - [`LocalStore`]: Filesystem objects, written atomically and verified
//!   against their sha256 on every read
//! - [`MemoryStore`]: Process-local map, used by tests and ephemeral sessions
//!
//! [`ProviderSet`] maps a [`ProviderType`] to a concrete store so sessions
//! can choose where they publish without the engine knowing the backend.

mod local;
mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Storage provider selector
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProviderType {
    /// Whatever the engine configuration names as default
    #[default]
    Default,
    Local,
    Memory,
}

/// Identity of one stored revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub id: Uuid,
    pub version_sequence: u32,
}

impl StoreKey {
    pub fn new(id: Uuid, version_sequence: u32) -> Self {
        Self {
            id,
            version_sequence,
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version_sequence)
    }
}

/// Where a revision was stored, as recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreLocation {
    pub provider: ProviderType,
    pub key: StoreKey,
    /// Provider-specific address (file path or memory URI)
    pub uri: String,
    pub size: u64,
    pub checksum: String,
}

/// Durable, versioned storage of package bytes
pub trait ArtifactStore: Send + Sync {
    /// Which provider this store implements
    fn provider(&self) -> ProviderType;

    /// Store bytes under `key`, replacing any previous object
    fn put(&self, key: StoreKey, bytes: &[u8]) -> Result<StoreLocation>;

    /// Fetch the bytes at `location`, verifying the recorded checksum
    fn get(&self, location: &StoreLocation) -> Result<Vec<u8>>;

    /// Whether an object exists for `key`
    fn exists(&self, key: StoreKey) -> bool;

    /// Remove the object at `location`; removing a missing object is a no-op
    fn remove(&self, location: &StoreLocation) -> Result<()>;
}

/// Maps provider types to store implementations
#[derive(Clone)]
pub struct ProviderSet {
    default: ProviderType,
    stores: HashMap<ProviderType, Arc<dyn ArtifactStore>>,
}

impl ProviderSet {
    /// Empty set; `default` is what `ProviderType::Default` resolves to
    pub fn new(default: ProviderType) -> Self {
        Self {
            default,
            stores: HashMap::new(),
        }
    }

    /// Local filesystem store at `root` plus an in-memory store
    pub fn standard(root: impl Into<std::path::PathBuf>, default: ProviderType) -> Result<Self> {
        let mut set = Self::new(default);
        set.register(Arc::new(LocalStore::new(root)?));
        set.register(Arc::new(MemoryStore::new()));
        Ok(set)
    }

    /// Register (or replace) the store for its provider type
    pub fn register(&mut self, store: Arc<dyn ArtifactStore>) {
        self.stores.insert(store.provider(), store);
    }

    /// Concrete provider a request for `provider` maps to
    pub fn effective(&self, provider: ProviderType) -> ProviderType {
        match provider {
            ProviderType::Default => self.default,
            other => other,
        }
    }

    /// Store for `provider`, resolving `Default`
    pub fn resolve(&self, provider: ProviderType) -> Result<Arc<dyn ArtifactStore>> {
        let effective = self.effective(provider);
        self.stores.get(&effective).cloned().ok_or_else(|| {
            Error::ProviderFailure(format!("No store registered for provider '{}'", effective))
        })
    }
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<String> = self.stores.keys().map(|p| p.to_string()).collect();
        providers.sort();
        f.debug_struct("ProviderSet")
            .field("default", &self.default)
            .field("providers", &providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    #[test]
    fn test_provider_type_strings() {
        assert_eq!(ProviderType::Local.to_string(), "local");
        assert_eq!(ProviderType::from_str("MEMORY").unwrap(), ProviderType::Memory);
        assert_eq!(
            serde_json::to_string(&ProviderType::Default).unwrap(),
            "\"default\""
        );
    }

    #[test]
    fn test_default_resolves_to_configured_provider() {
        let temp = TempDir::new().unwrap();
        let set = ProviderSet::standard(temp.path(), ProviderType::Memory).unwrap();
        let store = set.resolve(ProviderType::Default).unwrap();
        assert_eq!(store.provider(), ProviderType::Memory);
        assert_eq!(
            set.resolve(ProviderType::Local).unwrap().provider(),
            ProviderType::Local
        );
    }

    #[test]
    fn test_unregistered_provider_fails() {
        let set = ProviderSet::new(ProviderType::Local);
        let err = set.resolve(ProviderType::Default).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::ProviderFailure);
    }
}
