// src/lib.rs

//! STARNET holon lifecycle engine
//!
//! Creates, publishes, downloads, installs, versions and interlinks holons
//! (versioned artifacts of twenty kinds) through one uniform contract.
//!
//! # Architecture
//!
//! - Registry-first: holon state, revisions and installations live in SQLite
//! - Every publish is an immutable revision keyed by (id, version sequence)
//! - Packages are deterministic tar.gz archives carrying their `holon.json`
//! - Per-kind sub-managers behind one trait; new kinds are a registration
//! - Dependencies are materialized inside the parent's source tree

pub mod config;
pub mod db;
mod dependency;
mod error;
pub mod hash;
pub mod identity;
pub mod kind;
pub mod lifecycle;
pub mod lock;
pub mod managers;
pub mod manifest;
pub mod package;
pub mod policy;
pub mod progress;
pub mod prompt;
pub mod session;
pub mod store;
pub mod version;

pub use config::{EngineConfig, EnginePaths, PlacementPolicy};
pub use error::{Error, ErrorKind, Outcome, Result, ResultExt};
pub use kind::{DependencyKind, HolonKind};
pub use lifecycle::{
    CreateRequest, InstallMode, InstallOutcome, InstallRequest, LifecycleEngine, OperationOptions,
    UpdateRequest,
};
pub use managers::{ArtifactSubManager, GenericSubManager, ManagerContext, SubManagerRegistry};
pub use manifest::{Artifact, DependencyRef, DownloadedHolon, InstalledHolon};
pub use policy::{Candidate, ConfirmationPolicy, DisambiguationPolicy, Selection};
pub use progress::{
    CallbackProgress, LifecycleStatus, LogProgress, ProgressEvent, ProgressSink, SilentProgress,
};
pub use session::{ActorId, Session};
pub use store::{ArtifactStore, ProviderSet, ProviderType, StoreKey, StoreLocation};
