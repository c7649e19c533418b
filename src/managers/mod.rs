// src/managers/mod.rs

//! Per-kind artifact sub-managers
//!
//! Every holon kind is served by an [`ArtifactSubManager`] implementing the
//! same five primitives. The engine and the dependency resolver never
//! branch on kind; they look the manager up in the [`SubManagerRegistry`].
//! Kinds with special needs register their own manager, everything else
//! uses [`GenericSubManager`].

use crate::error::{Error, Result};
use crate::identity::{self, ResolveScope};
use crate::kind::HolonKind;
use crate::lifecycle::{LifecycleEngine, OperationOptions};
use crate::manifest::{Artifact, DownloadedHolon, InstalledHolon};
use crate::session::Session;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use strum::IntoEnumIterator;
use uuid::Uuid;

/// Everything a sub-manager may need during one call
pub struct ManagerContext<'a> {
    pub engine: &'a LifecycleEngine,
    pub session: &'a Session,
    pub options: &'a OperationOptions,
    /// Holons on the current dependency install path (cycle detection)
    visiting: RefCell<HashSet<Uuid>>,
}

impl<'a> ManagerContext<'a> {
    pub fn new(engine: &'a LifecycleEngine, session: &'a Session, options: &'a OperationOptions) -> Self {
        Self {
            engine,
            session,
            options,
            visiting: RefCell::new(HashSet::new()),
        }
    }

    /// Mark `id` as being installed; false if it already is (a cycle)
    pub fn enter(&self, id: Uuid) -> bool {
        self.visiting.borrow_mut().insert(id)
    }

    pub fn leave(&self, id: Uuid) {
        self.visiting.borrow_mut().remove(&id);
    }
}

/// Find, IsInstalled, Download, Install, Uninstall for one kind
pub trait ArtifactSubManager: Send + Sync {
    fn kind(&self) -> HolonKind;

    /// Resolve a token to a holon of this kind
    fn find(&self, ctx: &ManagerContext<'_>, token: &str) -> Result<Artifact>;

    /// Newest top-level installed copy of a holon, if any
    fn is_installed(&self, ctx: &ManagerContext<'_>, id: Uuid) -> Result<Option<InstalledHolon>>;

    /// Fetch the package of a published revision
    fn download(&self, ctx: &ManagerContext<'_>, revision: &Artifact) -> Result<DownloadedHolon>;

    /// Extract a package to `dest`; `parent` owns the copy when nested
    fn install(
        &self,
        ctx: &ManagerContext<'_>,
        revision: &Artifact,
        package: &Path,
        dest: &Path,
        parent: Option<Uuid>,
    ) -> Result<InstalledHolon>;

    /// Remove an installed copy, keeping its record
    fn uninstall(&self, ctx: &ManagerContext<'_>, installed: &InstalledHolon) -> Result<InstalledHolon>;
}

/// Sub-manager that delegates to the engine primitives
#[derive(Debug, Clone, Copy)]
pub struct GenericSubManager {
    kind: HolonKind,
}

impl GenericSubManager {
    pub fn new(kind: HolonKind) -> Self {
        Self { kind }
    }
}

impl ArtifactSubManager for GenericSubManager {
    fn kind(&self) -> HolonKind {
        self.kind
    }

    fn find(&self, ctx: &ManagerContext<'_>, token: &str) -> Result<Artifact> {
        ctx.engine.with_conn(|conn| {
            identity::resolve(
                conn,
                token,
                &ResolveScope::kind(self.kind),
                &ctx.options.disambiguation,
            )
        })
    }

    fn is_installed(&self, ctx: &ManagerContext<'_>, id: Uuid) -> Result<Option<InstalledHolon>> {
        ctx.engine.installed_copy(id)
    }

    fn download(&self, ctx: &ManagerContext<'_>, revision: &Artifact) -> Result<DownloadedHolon> {
        ctx.engine.download_revision(ctx, revision)
    }

    fn install(
        &self,
        ctx: &ManagerContext<'_>,
        revision: &Artifact,
        package: &Path,
        dest: &Path,
        parent: Option<Uuid>,
    ) -> Result<InstalledHolon> {
        ctx.engine.install_revision(ctx, revision, package, dest, parent)
    }

    fn uninstall(&self, ctx: &ManagerContext<'_>, installed: &InstalledHolon) -> Result<InstalledHolon> {
        ctx.engine.uninstall_copy(ctx, installed)
    }
}

/// Kind -> sub-manager dispatch table
#[derive(Clone)]
pub struct SubManagerRegistry {
    managers: HashMap<HolonKind, Arc<dyn ArtifactSubManager>>,
}

impl SubManagerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            managers: HashMap::new(),
        }
    }

    /// A [`GenericSubManager`] for every kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in HolonKind::iter() {
            registry.register(Arc::new(GenericSubManager::new(kind)));
        }
        registry
    }

    /// Register (or replace) the manager for its kind
    pub fn register(&mut self, manager: Arc<dyn ArtifactSubManager>) {
        self.managers.insert(manager.kind(), manager);
    }

    pub fn get(&self, kind: HolonKind) -> Result<Arc<dyn ArtifactSubManager>> {
        self.managers.get(&kind).cloned().ok_or_else(|| {
            Error::InvalidInput(format!("no sub-manager registered for kind {}", kind))
        })
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl Default for SubManagerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
