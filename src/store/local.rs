// src/store/local.rs

//! Filesystem artifact store
//!
//! Objects are stored at `{root}/{id[..2]}/{id}/{sequence}.pkg`, written to a
//! temporary sibling and renamed into place.

use super::{ArtifactStore, ProviderType, StoreKey, StoreLocation};
use crate::error::{Error, Result};
use crate::hash;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem-backed store
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| provider_io("create store root", &root, e))?;
            debug!("Created local store directory: {:?}", root);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Object path for a key
    pub fn key_to_path(&self, key: StoreKey) -> PathBuf {
        let id = key.id.to_string();
        let (prefix, _) = id.split_at(2);
        self.root
            .join(prefix)
            .join(&id)
            .join(format!("{}.pkg", key.version_sequence))
    }
}

fn provider_io(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::ProviderFailure(format!("{} {}: {}", action, path.display(), err))
}

impl ArtifactStore for LocalStore {
    fn provider(&self) -> ProviderType {
        ProviderType::Local
    }

    fn put(&self, key: StoreKey, bytes: &[u8]) -> Result<StoreLocation> {
        let path = self.key_to_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| provider_io("create", parent, e))?;
        }

        // Write content atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(provider_io("write", &path, e));
        }

        let checksum = hash::sha256(bytes);
        debug!("Stored {} in local store ({} bytes)", key, bytes.len());
        Ok(StoreLocation {
            provider: ProviderType::Local,
            key,
            uri: path.to_string_lossy().into_owned(),
            size: bytes.len() as u64,
            checksum,
        })
    }

    fn get(&self, location: &StoreLocation) -> Result<Vec<u8>> {
        let path = self.key_to_path(location.key);
        if !path.exists() {
            return Err(Error::ProviderFailure(format!(
                "Object {} not found in local store",
                location.key
            )));
        }

        let content = fs::read(&path).map_err(|e| provider_io("read", &path, e))?;
        hash::verify_sha256(&content, &location.checksum)
            .map_err(|e| Error::ProviderFailure(format!("Object {}: {}", location.key, e)))?;

        debug!(
            "Retrieved {} from local store ({} bytes)",
            location.key,
            content.len()
        );
        Ok(content)
    }

    fn exists(&self, key: StoreKey) -> bool {
        self.key_to_path(key).exists()
    }

    fn remove(&self, location: &StoreLocation) -> Result<()> {
        let path = self.key_to_path(location.key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {} from local store", location.key);
                if let Some(parent) = path.parent() {
                    // Only succeeds once the last revision is gone
                    let _ = fs::remove_dir(parent);
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(provider_io("remove", &path, e)),
        }
    }
}
