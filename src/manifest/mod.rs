// src/manifest/mod.rs

//! Holon manifests (DNA)
//!
//! An [`Artifact`] is the full descriptor of one holon revision. It is
//! persisted twice: as JSON in the registry, and as a `holon.json` file at
//! the source, published and install locations. The file copy is what
//! travels inside packages, so a package can be installed without the
//! registry.
//!
//! Manifest files are replaced atomically (temp file, fsync, rename) while
//! holding the [`ManifestFileLock`].

pub mod ledger;
mod projection;

pub use projection::{DownloadedHolon, InstalledHolon};

use crate::error::{Error, Result};
use crate::kind::{DependencyKind, HolonKind};
use crate::lock::ManifestFileLock;
use crate::session::ActorId;
use crate::store::{ProviderType, StoreKey, StoreLocation};
use crate::version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Manifest file name
pub const MANIFEST_FILE: &str = "holon.json";

/// Dependencies of a holon, one ordered collection per kind
pub type DependencyGraph = BTreeMap<DependencyKind, Vec<DependencyRef>>;

/// Link from a parent holon to one dependency revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRef {
    pub target_id: Uuid,
    pub target_name: String,
    pub target_version: String,
    pub target_version_sequence: u32,
    pub kind: DependencyKind,
    /// Installed tree the dependency was taken from
    pub installed_from: PathBuf,
    /// Parent-owned copy
    pub installed_to: PathBuf,
}

/// Descriptor of one holon revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: HolonKind,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,

    #[serde(default)]
    pub source_path: Option<PathBuf>,
    #[serde(default)]
    pub published_path: Option<PathBuf>,
    #[serde(default)]
    pub downloaded_path: Option<PathBuf>,
    #[serde(default)]
    pub installed_path: Option<PathBuf>,
    /// Entry point relative to the install root
    #[serde(default)]
    pub launch_target: Option<String>,

    pub version: String,
    /// 0 while never published
    #[serde(default)]
    pub version_sequence: u32,
    #[serde(default)]
    pub number_of_versions: u32,

    pub created_by: ActorId,
    #[serde(default)]
    pub created_by_name: String,
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub modified_on: Option<DateTime<Utc>>,

    #[serde(default)]
    pub published_by: Option<ActorId>,
    #[serde(default)]
    pub published_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_provider: Option<ProviderType>,
    #[serde(default)]
    pub published_location: Option<StoreLocation>,
    #[serde(default)]
    pub published_size: u64,
    /// sha256 of the published package
    #[serde(default)]
    pub checksum: Option<String>,

    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub installs: u64,

    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_published: bool,

    #[serde(default)]
    pub dependencies: DependencyGraph,
}

fn default_true() -> bool {
    true
}

impl Artifact {
    /// Fresh draft created by `actor`
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: HolonKind,
        actor: ActorId,
        actor_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            kind,
            category: None,
            subcategory: None,
            source_path: None,
            published_path: None,
            downloaded_path: None,
            installed_path: None,
            launch_target: None,
            version: version::INITIAL_VERSION.to_string(),
            version_sequence: 0,
            number_of_versions: 0,
            created_by: actor,
            created_by_name: actor_name.into(),
            created_on: Utc::now(),
            modified_on: None,
            published_by: None,
            published_on: None,
            published_provider: None,
            published_location: None,
            published_size: 0,
            checksum: None,
            downloads: 0,
            installs: 0,
            is_active: true,
            is_published: false,
            dependencies: DependencyGraph::new(),
        }
    }

    /// Store key of this revision
    pub fn store_key(&self) -> StoreKey {
        StoreKey::new(self.id, self.version_sequence)
    }

    /// `name v1.2.3` for messages
    pub fn display_name(&self) -> String {
        format!("{} v{}", self.name, self.version)
    }

    /// Dependencies filed under `kind`
    pub fn dependencies_of(&self, kind: DependencyKind) -> &[DependencyRef] {
        self.dependencies
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every dependency, collections in kind order
    pub fn all_dependencies(&self) -> impl Iterator<Item = &DependencyRef> {
        self.dependencies.values().flatten()
    }

    /// File a dependency under its kind
    ///
    /// Fails with `AlreadyInstalled` when the same target is already linked
    /// in that collection.
    pub fn attach_dependency(&mut self, dependency: DependencyRef) -> Result<()> {
        let collection = self.dependencies.entry(dependency.kind).or_default();
        if collection.iter().any(|d| d.target_id == dependency.target_id) {
            return Err(Error::AlreadyInstalled(format!(
                "{} '{}' is already a dependency of '{}'",
                dependency.kind, dependency.target_name, self.name
            )));
        }
        collection.push(dependency);
        Ok(())
    }

    /// Unlink a dependency, dropping the collection when it empties
    pub fn detach_dependency(&mut self, kind: DependencyKind, target_id: Uuid) -> Option<DependencyRef> {
        let collection = self.dependencies.get_mut(&kind)?;
        let index = collection.iter().position(|d| d.target_id == target_id)?;
        let removed = collection.remove(index);
        if collection.is_empty() {
            self.dependencies.remove(&kind);
        }
        Some(removed)
    }

    /// Structural checks run on every manifest read
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ManifestCorrupt(format!(
                "holon {} has an empty name",
                self.id
            )));
        }
        version::parse(&self.version).map_err(|e| {
            Error::ManifestCorrupt(format!("holon '{}' has a bad version: {}", self.name, e))
        })?;
        for (kind, collection) in &self.dependencies {
            if let Some(stray) = collection.iter().find(|d| d.kind != *kind) {
                return Err(Error::ManifestCorrupt(format!(
                    "holon '{}' files {} dependency '{}' under {}",
                    self.name, stray.kind, stray.target_name, kind
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Artifact = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }
}

/// Path of the manifest file inside `dir`
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Atomically write `artifact` as `dir/holon.json`
pub fn write_manifest(dir: &Path, artifact: &Artifact) -> Result<PathBuf> {
    let json = artifact.to_json()?;
    let _lock = ManifestFileLock::acquire(dir)?;

    let path = manifest_path(dir);
    let temp_path = dir.join(format!(".{}.tmp", MANIFEST_FILE));
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, &path)?;

    debug!("Wrote manifest for '{}' to {}", artifact.name, path.display());
    Ok(path)
}

/// Read `dir/holon.json`
///
/// A missing or unparseable file is `ManifestCorrupt`.
pub fn read_manifest(dir: &Path) -> Result<Artifact> {
    let path = manifest_path(dir);
    let json = fs::read_to_string(&path).map_err(|e| {
        Error::ManifestCorrupt(format!("cannot read {}: {}", path.display(), e))
    })?;
    Artifact::from_json(&json).map_err(|e| match e {
        Error::ManifestCorrupt(msg) => {
            Error::ManifestCorrupt(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn library(name: &str) -> Artifact {
        Artifact::new(name, "a library", HolonKind::Library, Uuid::new_v4(), "tester")
    }

    fn dep_ref(target: &Artifact) -> DependencyRef {
        DependencyRef {
            target_id: target.id,
            target_name: target.name.clone(),
            target_version: target.version.clone(),
            target_version_sequence: 1,
            kind: target.kind,
            installed_from: PathBuf::from("/installed/lib"),
            installed_to: PathBuf::from("/src/app/Dependencies/Library/lib"),
        }
    }

    #[test]
    fn test_new_artifact_is_draft() {
        let artifact = library("MoonLib");
        assert_eq!(artifact.version, "1.0.0");
        assert_eq!(artifact.version_sequence, 0);
        assert!(!artifact.is_published);
        assert!(artifact.is_active);
        assert!(artifact.dependencies.is_empty());
    }

    #[test]
    fn test_attach_then_detach_restores_graph() {
        let mut app = Artifact::new("App", "", HolonKind::Oapp, Uuid::new_v4(), "tester");
        let lib = library("MoonLib");
        let before = app.dependencies.clone();

        app.attach_dependency(dep_ref(&lib)).unwrap();
        assert_eq!(app.dependencies_of(HolonKind::Library).len(), 1);

        let removed = app.detach_dependency(HolonKind::Library, lib.id).unwrap();
        assert_eq!(removed.target_id, lib.id);
        assert_eq!(app.dependencies, before);
    }

    #[test]
    fn test_duplicate_dependency_rejected() {
        let mut app = Artifact::new("App", "", HolonKind::Oapp, Uuid::new_v4(), "tester");
        let lib = library("MoonLib");
        app.attach_dependency(dep_ref(&lib)).unwrap();
        let err = app.attach_dependency(dep_ref(&lib)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInstalled);
    }

    #[test]
    fn test_misfiled_dependency_is_corrupt() {
        let mut app = Artifact::new("App", "", HolonKind::Oapp, Uuid::new_v4(), "tester");
        let lib = library("MoonLib");
        app.dependencies.insert(HolonKind::Runtime, vec![dep_ref(&lib)]);
        assert_eq!(app.validate().unwrap_err().kind(), ErrorKind::ManifestCorrupt);
    }

    #[test]
    fn test_manifest_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let mut app = Artifact::new("App", "demo", HolonKind::Oapp, Uuid::new_v4(), "tester");
        app.attach_dependency(dep_ref(&library("MoonLib"))).unwrap();

        let path = write_manifest(temp.path(), &app).unwrap();
        assert!(path.ends_with("holon.json"));
        assert_eq!(read_manifest(temp.path()).unwrap(), app);

        // Graph keys are kind names
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"Library\""));
    }

    #[test]
    fn test_missing_or_garbage_manifest_is_corrupt() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            read_manifest(temp.path()).unwrap_err().kind(),
            ErrorKind::ManifestCorrupt
        );

        fs::write(manifest_path(temp.path()), "{ not json").unwrap();
        assert_eq!(
            read_manifest(temp.path()).unwrap_err().kind(),
            ErrorKind::ManifestCorrupt
        );
    }
}
