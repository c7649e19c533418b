// src/lifecycle/mod.rs

//! Lifecycle orchestrator
//!
//! [`LifecycleEngine`] drives a holon through its states:
//!
//! ```text
//! Create -> Draft -> Publish -> Published -> Download/Install -> Installed
//!                       ^           |                              |
//!                       +-Unpublish-+                          Uninstall
//! Delete (any state): purge source, published, store and registry copies
//! ```
//!
//! Every public operation resolves its target through the identifier
//! resolver, checks creator rights where required, and holds the identity
//! lock of the revision it touches for the duration of the call.

mod install;
mod options;
mod publish;

pub use install::{DEPENDENCIES_DIR, nested_dependency_dir};
pub(crate) use install::prepare_destination;
pub use options::{
    CreateRequest, InstallMode, InstallOutcome, InstallRequest, OperationOptions, UpdateRequest,
};

use crate::config::{EngineConfig, EnginePaths};
use crate::db::{
    self,
    models::{HolonQuery, HolonRecord, InstallStatus, Installation},
};
use crate::error::{Error, Result};
use crate::identity::{self, ResolveScope};
use crate::kind::HolonKind;
use crate::lock::{DRAFT_SEQUENCE, IdentityGuard, IdentityLocks};
use crate::managers::{ArtifactSubManager, SubManagerRegistry};
use crate::manifest::{self, Artifact, InstalledHolon, ledger};
use crate::session::Session;
use crate::store::ProviderSet;
use crate::version;
use chrono::Utc;
use rusqlite::Connection;
use std::fs;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// The holon lifecycle engine
///
/// Thread-safe: operations may run concurrently on worker threads. The
/// registry connection is shared behind a mutex and only held for short,
/// non-reentrant sections.
pub struct LifecycleEngine {
    config: EngineConfig,
    paths: EnginePaths,
    conn: Mutex<Connection>,
    providers: ProviderSet,
    locks: IdentityLocks,
    managers: SubManagerRegistry,
}

impl LifecycleEngine {
    /// Open the engine described by `config`, creating the registry if needed
    pub fn open(config: EngineConfig) -> Result<Self> {
        let paths = config.paths();
        let providers = ProviderSet::standard(&paths.store, config.engine.default_provider)?;
        Self::with_providers(config, providers)
    }

    /// Open with an explicit provider set
    pub fn with_providers(config: EngineConfig, providers: ProviderSet) -> Result<Self> {
        let paths = config.paths();
        db::init(&paths.registry)?;
        let conn = db::open(&paths.registry)?;
        info!("Lifecycle engine ready at {}", paths.home.display());

        Ok(Self {
            locks: IdentityLocks::new(config.engine.lock_retries),
            config,
            paths,
            conn: Mutex::new(conn),
            providers,
            managers: SubManagerRegistry::with_defaults(),
        })
    }

    /// Replace the sub-manager for its kind
    pub fn register_manager(&mut self, manager: Arc<dyn ArtifactSubManager>) {
        self.managers.register(manager);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn paths(&self) -> &EnginePaths {
        &self.paths
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn locks(&self) -> &IdentityLocks {
        &self.locks
    }

    pub(crate) fn managers(&self) -> &SubManagerRegistry {
        &self.managers
    }

    /// Run `f` with the registry connection
    ///
    /// `f` must not call back into the engine.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::OperationInProgress("registry connection poisoned".to_string()))?;
        f(&mut conn)
    }

    /// Resolve a token of `kind` with the call's disambiguation policy
    pub(crate) fn resolve(&self, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        self.with_conn(|conn| {
            identity::resolve(conn, token, &ResolveScope::kind(kind), &options.disambiguation)
        })
    }

    /// Fail unless the session's actor created `artifact`
    pub(crate) fn ensure_creator(session: &Session, artifact: &Artifact, operation: &str) -> Result<()> {
        if artifact.created_by == session.actor {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!(
                "only the creator of {} '{}' may {} it",
                artifact.kind, artifact.name, operation
            )))
        }
    }

    /// Take the draft identity of a holon the session's actor created
    ///
    /// The descriptor is read again once the identity is held, so the caller
    /// never writes back a copy that an earlier holder has since changed.
    pub(crate) fn lock_draft(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        operation: &str,
        options: &OperationOptions,
    ) -> Result<(IdentityGuard<'_>, Artifact)> {
        let resolved = self.resolve(kind, token, options)?;
        Self::ensure_creator(session, &resolved, operation)?;
        let guard = self.locks.acquire(resolved.id, DRAFT_SEQUENCE, operation)?;
        let current = self
            .with_conn(|conn| HolonRecord::find_by_id(conn, resolved.id))?
            .ok_or_else(|| {
                Error::NotFound(format!("{} '{}' ({}) no longer exists", kind, resolved.name, resolved.id))
            })?;
        Ok((guard, current))
    }

    /// Persist the current descriptor to the registry and the source manifest
    pub(crate) fn save_current(&self, artifact: &Artifact) -> Result<()> {
        self.with_conn(|conn| HolonRecord::save(conn, artifact))?;
        if let Some(source) = &artifact.source_path
            && source.is_dir()
        {
            manifest::write_manifest(source, artifact)?;
        }
        Ok(())
    }

    /// Create a new draft holon with its source directory and manifest
    pub fn create(&self, session: &Session, request: CreateRequest) -> Result<Artifact> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("holon name must not be empty".to_string()));
        }
        let version = match &request.version {
            Some(v) => version::normalize(v)?,
            None => version::INITIAL_VERSION.to_string(),
        };

        let mut artifact = Artifact::new(
            name,
            request.description.trim(),
            request.kind,
            session.actor,
            &session.actor_name,
        );
        artifact.version = version;
        artifact.category = request.category;
        artifact.subcategory = request.subcategory;
        artifact.launch_target = request.launch_target;

        let source = request
            .source_dir
            .unwrap_or_else(|| self.paths.source_dir(request.kind, name));
        if manifest::manifest_path(&source).exists() {
            return Err(Error::InvalidInput(format!(
                "{} already contains a holon",
                source.display()
            )));
        }
        fs::create_dir_all(&source)?;
        artifact.source_path = Some(source.clone());

        self.with_conn(|conn| HolonRecord::save(conn, &artifact))?;
        manifest::write_manifest(&source, &artifact)?;

        info!(
            "Created {} '{}' ({}) at {}",
            artifact.kind,
            artifact.name,
            artifact.id,
            source.display()
        );
        Ok(artifact)
    }

    /// Change descriptor fields of a holon and rewrite its source manifest
    ///
    /// The source directory keeps its place when the name changes.
    /// Published revisions are not touched; the next publish carries the
    /// new fields.
    pub fn update(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        request: UpdateRequest,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        if request.is_empty() {
            return Err(Error::InvalidInput("nothing to update".to_string()));
        }
        let (_guard, mut artifact) = self.lock_draft(session, kind, token, "update", options)?;

        if let Some(name) = request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::InvalidInput("holon name must not be empty".to_string()));
            }
            artifact.name = name.to_string();
        }
        if let Some(description) = request.description {
            artifact.description = description.trim().to_string();
        }
        let optional = |value: String| Some(value.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(category) = request.category {
            artifact.category = optional(category);
        }
        if let Some(subcategory) = request.subcategory {
            artifact.subcategory = optional(subcategory);
        }
        if let Some(target) = request.launch_target {
            artifact.launch_target = optional(target);
        }

        artifact.modified_on = Some(Utc::now());
        self.save_current(&artifact)?;
        info!("Updated {} '{}' ({})", artifact.kind, artifact.name, artifact.id);
        Ok(artifact)
    }

    /// Copy a holon's source tree into a new draft owned by the session's actor
    ///
    /// The clone gets a new id, no revisions and the original's dependency
    /// references, rebased onto the copied tree.
    pub fn clone_holon(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        new_name: &str,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("holon name must not be empty".to_string()));
        }
        let resolved = self.resolve(kind, token, options)?;
        let _guard = self.locks.acquire(resolved.id, DRAFT_SEQUENCE, "clone")?;
        let original = self
            .with_conn(|conn| HolonRecord::find_by_id(conn, resolved.id))?
            .ok_or_else(|| Error::NotFound(format!("{} '{}' no longer exists", kind, resolved.name)))?;
        let from = original
            .source_path
            .clone()
            .filter(|p| p.is_dir())
            .ok_or_else(|| {
                Error::InvalidInput(format!("'{}' has no source directory to clone", original.name))
            })?;

        let mut artifact = Artifact::new(
            name,
            &original.description,
            kind,
            session.actor,
            &session.actor_name,
        );
        artifact.version = original.version.clone();
        artifact.category = original.category.clone();
        artifact.subcategory = original.subcategory.clone();
        artifact.launch_target = original.launch_target.clone();

        let dest = self.paths.source_dir(kind, name);
        prepare_destination(&dest, artifact.id)?;
        artifact.dependencies = original.dependencies.clone();
        for reference in artifact.dependencies.values_mut().flatten() {
            if let Ok(relative) = reference.installed_to.strip_prefix(&from) {
                reference.installed_to = dest.join(relative);
            }
        }
        artifact.source_path = Some(dest.clone());

        let result = (|| -> Result<()> {
            let files = crate::dependency::copy_tree(&from, &dest)?;
            manifest::write_manifest(&dest, &artifact)?;
            self.with_conn(|conn| HolonRecord::save(conn, &artifact))?;
            debug!("Copied {} files from {}", files, from.display());
            Ok(())
        })();
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_dir_all(&dest) {
                warn!("Could not clean up {}: {}", dest.display(), cleanup);
            }
            return Err(e);
        }

        info!(
            "Cloned {} '{}' into '{}' ({}) at {}",
            kind,
            original.name,
            artifact.name,
            artifact.id,
            dest.display()
        );
        Ok(artifact)
    }

    /// Current descriptor of a holon
    pub fn load(&self, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        self.resolve(kind, token, options)
    }

    fn set_active(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        active: bool,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        let operation = if active { "activate" } else { "deactivate" };
        let (_guard, mut artifact) = self.lock_draft(session, kind, token, operation, options)?;

        artifact.is_active = active;
        artifact.modified_on = Some(Utc::now());
        self.save_current(&artifact)?;
        info!("{} {} '{}'", operation, artifact.kind, artifact.name);
        Ok(artifact)
    }

    /// Make a holon visible in listings and searches again
    pub fn activate(&self, session: &Session, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        self.set_active(session, kind, token, true, options)
    }

    /// Hide a holon from listings and searches without touching installs
    pub fn deactivate(&self, session: &Session, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        self.set_active(session, kind, token, false, options)
    }

    /// Every recorded revision of a holon, oldest first
    pub fn list_versions(&self, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Vec<Artifact>> {
        let artifact = self.resolve(kind, token, options)?;
        self.with_conn(|conn| ledger::list_versions(conn, artifact.id))
    }

    /// Active holons of `kind` whose name or description contains `text`
    ///
    /// With `owner_only`, only holons created by the session's actor.
    pub fn search(&self, session: &Session, kind: HolonKind, text: &str, owner_only: bool) -> Result<Vec<Artifact>> {
        let mut scope = ResolveScope::kind(kind).active_only();
        if owner_only {
            scope = scope.owned_by(session.actor);
        }
        self.with_conn(|conn| identity::search(conn, text, &scope))
    }

    /// Active holons, optionally of one kind
    pub fn list_all(&self, kind: Option<HolonKind>) -> Result<Vec<Artifact>> {
        let query = HolonQuery {
            kind,
            ..HolonQuery::default()
        };
        self.with_conn(|conn| HolonRecord::list(conn, &query))
    }

    /// Drafts (never published or unpublished) created by the session's actor
    pub fn list_unpublished(&self, session: &Session, kind: Option<HolonKind>) -> Result<Vec<Artifact>> {
        let query = HolonQuery {
            kind,
            created_by: Some(session.actor),
            published: Some(false),
            include_inactive: true,
        };
        self.with_conn(|conn| HolonRecord::list(conn, &query))
    }

    /// Deactivated holons
    pub fn list_deactivated(&self, kind: Option<HolonKind>) -> Result<Vec<Artifact>> {
        let query = HolonQuery {
            kind,
            include_inactive: true,
            ..HolonQuery::default()
        };
        let all = self.with_conn(|conn| HolonRecord::list(conn, &query))?;
        Ok(all.into_iter().filter(|a| !a.is_active).collect())
    }

    fn list_by_status(&self, kind: Option<HolonKind>, status: InstallStatus) -> Result<Vec<InstalledHolon>> {
        let records = self.with_conn(|conn| Installation::list_by_status(conn, kind, status))?;
        let mut views = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(view) = InstalledHolon::from_record(record)? {
                views.push(view);
            }
        }
        debug!("{} {} holons", views.len(), status.as_str());
        Ok(views)
    }

    /// Installed holons, optionally of one kind
    pub fn list_installed(&self, kind: Option<HolonKind>) -> Result<Vec<InstalledHolon>> {
        self.list_by_status(kind, InstallStatus::Installed)
    }

    /// Uninstalled (re-installable) holons, optionally of one kind
    pub fn list_uninstalled(&self, kind: Option<HolonKind>) -> Result<Vec<InstalledHolon>> {
        self.list_by_status(kind, InstallStatus::Uninstalled)
    }
}
