// src/config.rs
//! Engine configuration
//!
//! Loaded from a TOML file (`starnet.toml`) with two sections:
//! - [paths] - Home directory, registry, store and the per-stage roots
//! - [engine] - Default provider, lock retries, dependency placement
//!
//! Every field has a default, so an empty file (or no file) is valid.
//! Relative paths in [paths] are resolved against `home`.

use crate::error::Result;
use crate::kind::HolonKind;
use crate::store::ProviderType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Environment variable overriding the home directory
pub const HOME_ENV: &str = "STARNET_HOME";

/// Default configuration file name inside the home directory
pub const CONFIG_FILE: &str = "starnet.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub engine: EngineSection,
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsSection {
    /// Root for everything below (defaults to $STARNET_HOME or the data dir)
    #[serde(default = "default_home")]
    pub home: PathBuf,

    /// SQLite registry database
    #[serde(default = "default_registry")]
    pub registry: PathBuf,

    /// Root of the local artifact store provider
    #[serde(default = "default_store")]
    pub store: PathBuf,

    /// Where new holons get their source directory
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Where published package files are written
    #[serde(default = "default_published")]
    pub published: PathBuf,

    /// Where downloaded package files land
    #[serde(default = "default_downloaded")]
    pub downloaded: PathBuf,

    /// Where holons are installed
    #[serde(default = "default_installed")]
    pub installed: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            home: default_home(),
            registry: default_registry(),
            store: default_store(),
            source: default_source(),
            published: default_published(),
            downloaded: default_downloaded(),
            installed: default_installed(),
        }
    }
}

fn default_home() -> PathBuf {
    std::env::var(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("starnet")
        })
}

fn default_registry() -> PathBuf {
    PathBuf::from("registry.db")
}

fn default_store() -> PathBuf {
    PathBuf::from("store")
}

fn default_source() -> PathBuf {
    PathBuf::from("Source")
}

fn default_published() -> PathBuf {
    PathBuf::from("Published")
}

fn default_downloaded() -> PathBuf {
    PathBuf::from("Downloaded")
}

fn default_installed() -> PathBuf {
    PathBuf::from("Installed")
}

/// Where a dependency is materialized relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// `<parent>/Dependencies/<Kind>/<name>`
    #[default]
    Nested,
    /// All transitive dependencies on one level (falls back to Nested)
    Flatten,
}

/// Engine behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Provider used when a session asks for `ProviderType::Default`
    #[serde(default = "default_provider")]
    pub default_provider: ProviderType,

    /// Attempts to acquire an identity lock before giving up
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Dependency placement policy
    #[serde(default)]
    pub placement: PlacementPolicy,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            lock_retries: default_lock_retries(),
            placement: PlacementPolicy::default(),
        }
    }
}

fn default_provider() -> ProviderType {
    ProviderType::Local
}

fn default_lock_retries() -> u32 {
    5
}

impl EngineConfig {
    /// Configuration rooted at `home` with every other field defaulted
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.home = home.into();
        config
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, else `<home>/starnet.toml` if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = default_home().join(CONFIG_FILE);
        if candidate.exists() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolved on-disk locations
    pub fn paths(&self) -> EnginePaths {
        EnginePaths::new(&self.paths)
    }
}

/// Absolute locations derived from [`PathsSection`]
#[derive(Debug, Clone)]
pub struct EnginePaths {
    pub home: PathBuf,
    pub registry: PathBuf,
    pub store: PathBuf,
    pub source: PathBuf,
    pub published: PathBuf,
    pub downloaded: PathBuf,
    pub installed: PathBuf,
}

impl EnginePaths {
    fn new(section: &PathsSection) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                section.home.join(p)
            }
        };
        Self {
            home: section.home.clone(),
            registry: resolve(&section.registry),
            store: resolve(&section.store),
            source: resolve(&section.source),
            published: resolve(&section.published),
            downloaded: resolve(&section.downloaded),
            installed: resolve(&section.installed),
        }
    }

    /// Default source directory of a new holon
    pub fn source_dir(&self, kind: HolonKind, name: &str) -> PathBuf {
        self.source.join(kind.dir_name()).join(sanitize_file_name(name))
    }

    /// Directory for published packages of one kind
    pub fn published_dir(&self, kind: HolonKind) -> PathBuf {
        self.published.join(kind.dir_name())
    }

    /// Directory for downloaded packages of one kind
    pub fn downloaded_dir(&self, kind: HolonKind) -> PathBuf {
        self.downloaded.join(kind.dir_name())
    }

    /// Default install location of one holon version
    pub fn install_dir(&self, kind: HolonKind, name: &str, id: Uuid, version: &str) -> PathBuf {
        self.installed
            .join(kind.dir_name())
            .join(format!("{}_{}_v{}", sanitize_file_name(name), short_id(id), version))
    }
}

/// First eight hex digits of an id; holon names are not unique
pub fn short_id(id: Uuid) -> String {
    let simple = id.simple().to_string();
    simple[..8].to_string()
}

/// Package file name for one holon version
pub fn package_file_name(kind: HolonKind, name: &str, id: Uuid, version: &str) -> String {
    format!(
        "{}_{}_v{}.{}",
        sanitize_file_name(name),
        short_id(id),
        version,
        kind.package_extension()
    )
}

/// Replace characters that are unsafe in a single path component
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "holon".to_string()
    } else {
        cleaned
    }
}
