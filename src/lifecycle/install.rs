// src/lifecycle/install.rs

//! Download, install and uninstall
//!
//! The public operations resolve the target, hold its identity lock and
//! dispatch to the sub-manager of its kind. The `*_revision` and `*_copy`
//! primitives behind the sub-managers never lock; whoever calls them holds
//! the identity of the revision being materialized.

use super::publish::write_file_atomic;
use super::{InstallMode, InstallOutcome, InstallRequest, LifecycleEngine, OperationOptions};
use crate::config::{PlacementPolicy, package_file_name, sanitize_file_name};
use crate::db::models::{HolonRecord, InstallStatus, Installation};
use crate::error::{Error, Result, ResultExt};
use crate::hash;
use crate::kind::HolonKind;
use crate::managers::ManagerContext;
use crate::manifest::{self, Artifact, DependencyRef, DownloadedHolon, InstalledHolon, ledger};
use crate::package;
use crate::progress::LifecycleStatus;
use crate::session::Session;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Directory holding nested dependencies inside a holon tree
pub const DEPENDENCIES_DIR: &str = "Dependencies";

/// Nested location of a dependency under `root`
pub fn nested_dependency_dir(root: &Path, kind: HolonKind, name: &str) -> PathBuf {
    root.join(DEPENDENCIES_DIR)
        .join(kind.dir_name())
        .join(sanitize_file_name(name))
}

/// Clear `dest` for a fresh copy of holon `id`
///
/// Only an empty directory or a tree whose manifest names the same holon is
/// replaced. Anything else fails with InvalidInput and stays untouched.
pub(crate) fn prepare_destination(dest: &Path, id: Uuid) -> Result<()> {
    if !dest.exists() {
        return Ok(());
    }
    if !dest.is_dir() {
        return Err(Error::InvalidInput(format!("{} is not a directory", dest.display())));
    }
    if fs::read_dir(dest)?.next().is_none() {
        return Ok(());
    }
    match manifest::read_manifest(dest) {
        Ok(existing) if existing.id == id => {
            debug!("Replacing stale tree at {}", dest.display());
            fs::remove_dir_all(dest)?;
            Ok(())
        }
        _ => Err(Error::InvalidInput(format!(
            "{} already holds files that are not a copy of holon {}",
            dest.display(),
            id
        ))),
    }
}

#[derive(Clone, Copy)]
enum Counter {
    Downloads,
    Installs,
}

impl LifecycleEngine {
    /// The published revision an operation should act on
    pub(crate) fn published_revision(&self, artifact: &Artifact, sequence: Option<u32>) -> Result<Artifact> {
        let revision = match sequence {
            Some(seq) => Some(self.with_conn(|conn| ledger::load_version(conn, artifact.id, seq))?)
                .filter(|r| r.is_published),
            None => self.with_conn(|conn| ledger::load_latest_published(conn, artifact.id))?,
        };
        revision.ok_or_else(|| {
            let which = sequence.map_or_else(|| "any version".to_string(), |s| format!("version {}", s));
            Error::NotPublished(format!(
                "{} '{}' has not published {}",
                artifact.kind, artifact.name, which
            ))
        })
    }

    fn bump_counter(&self, id: Uuid, counter: Counter) -> Result<()> {
        self.with_conn(|conn| {
            let Some(mut current) = HolonRecord::find_by_id(conn, id)? else {
                return Ok(());
            };
            match counter {
                Counter::Downloads => current.downloads += 1,
                Counter::Installs => current.installs += 1,
            }
            HolonRecord::save(conn, &current)
        })
    }

    /// Newest top-level installed copy of a holon
    pub fn installed_copy(&self, id: Uuid) -> Result<Option<InstalledHolon>> {
        let records = self.with_conn(|conn| Installation::find_with_status(conn, id, InstallStatus::Installed))?;
        match records.first() {
            Some(record) => InstalledHolon::from_record(record),
            None => Ok(None),
        }
    }

    /// Top-level installed copy of one revision
    fn installed_revision(&self, id: Uuid, sequence: u32) -> Result<Option<InstalledHolon>> {
        let record = self.with_conn(|conn| Installation::find_for(conn, id, sequence, None))?;
        match record {
            Some(record) if record.status == InstallStatus::Installed => InstalledHolon::from_record(&record),
            _ => Ok(None),
        }
    }

    /// Package file of an earlier download that is still on disk
    pub(crate) fn existing_download(&self, id: Uuid, sequence: u32) -> Result<Option<PathBuf>> {
        let record = self.with_conn(|conn| Installation::find_for(conn, id, sequence, None))?;
        Ok(record
            .and_then(|r| r.downloaded_path)
            .filter(|path| path.is_file()))
    }

    /// Fetch the package of a published revision into the downloaded directory
    pub fn download_revision(&self, ctx: &ManagerContext<'_>, revision: &Artifact) -> Result<DownloadedHolon> {
        let options = ctx.options;
        options.report(revision.id, &revision.name, LifecycleStatus::Downloading, revision.display_name());
        options.check_cancelled("download")?;

        let location = revision.published_location.as_ref().ok_or_else(|| {
            Error::ManifestCorrupt(format!(
                "published revision {} of '{}' has no store location",
                revision.version_sequence, revision.name
            ))
        })?;
        let store = self.providers.resolve(location.provider)?;
        let bytes = store.get(location).within("download", "ArtifactStore::get")?;
        options.check_cancelled("download")?;

        let path = self
            .paths
            .downloaded_dir(revision.kind)
            .join(package_file_name(revision.kind, &revision.name, revision.id, &revision.version));
        write_file_atomic(&path, &bytes)?;

        let mut downloaded = revision.clone();
        downloaded.downloaded_path = Some(path.clone());
        let now = Utc::now();
        let record = self.with_conn(|conn| {
            let mut record = match Installation::find_for(conn, revision.id, revision.version_sequence, None)? {
                Some(existing) => existing,
                None => Installation::new(&downloaded, InstallStatus::Downloaded)?,
            };
            if record.status == InstallStatus::Uninstalled {
                record.status = InstallStatus::Downloaded;
            }
            record.downloaded_path = Some(path.clone());
            record.downloaded_on = Some(now);
            record.downloaded_by = Some(ctx.session.actor);
            record.save(conn)?;
            Ok(record)
        })?;
        self.bump_counter(revision.id, Counter::Downloads)?;

        options.report(revision.id, &revision.name, LifecycleStatus::Downloaded, path.display().to_string());
        info!("Downloaded {} '{}' to {}", revision.kind, revision.display_name(), path.display());

        DownloadedHolon::from_record(&record)?.ok_or_else(|| {
            Error::ManifestCorrupt(format!("download record of '{}' lost its path", revision.name))
        })
    }

    /// Extract a package to `dest`, then install its dependencies depth-first
    ///
    /// `parent` is the holon whose tree owns the copy when it is nested.
    pub fn install_revision(
        &self,
        ctx: &ManagerContext<'_>,
        revision: &Artifact,
        package_path: &Path,
        dest: &Path,
        parent: Option<Uuid>,
    ) -> Result<InstalledHolon> {
        let options = ctx.options;
        options.report(revision.id, &revision.name, LifecycleStatus::Installing, dest.display().to_string());
        options.check_cancelled("install")?;

        let bytes = fs::read(package_path).map_err(|e| {
            Error::InvalidInput(format!("cannot read package {}: {}", package_path.display(), e))
        })?;
        if let Some(expected) = &revision.checksum {
            hash::verify_sha256(&bytes, expected).map_err(|e| {
                Error::ManifestCorrupt(format!("package {}: {}", package_path.display(), e))
            })?;
        }

        prepare_destination(dest, revision.id)?;
        let embedded = package::extract(&bytes, dest)?;
        if embedded.id != revision.id {
            if let Err(cleanup) = fs::remove_dir_all(dest) {
                warn!("Could not clean up {}: {}", dest.display(), cleanup);
            }
            return Err(Error::ManifestCorrupt(format!(
                "package {} contains holon {} instead of {}",
                package_path.display(),
                embedded.id,
                revision.id
            )));
        }

        let mut installed = revision.clone();
        installed.installed_path = Some(dest.to_path_buf());
        installed.downloaded_path = Some(package_path.to_path_buf());

        let result = (|| -> Result<Installation> {
            manifest::write_manifest(dest, &installed)?;
            self.install_dependencies(ctx, &installed, dest)?;
            options.check_cancelled("install")?;

            let now = Utc::now();
            self.with_conn(|conn| {
                let existing = Installation::find_for(conn, revision.id, revision.version_sequence, parent)?
                    .filter(|r| parent.is_none() || r.installed_path.as_deref() == Some(dest));
                let mut record = match existing {
                    Some(record) => record,
                    None => {
                        let mut record = Installation::new(&installed, InstallStatus::Installed)?;
                        record.parent_id = parent;
                        record
                    }
                };
                record.status = InstallStatus::Installed;
                record.set_manifest(&installed)?;
                if record.downloaded_path.is_none() {
                    record.downloaded_path = Some(package_path.to_path_buf());
                }
                record.installed_path = Some(dest.to_path_buf());
                record.installed_on = Some(now);
                record.installed_by = Some(ctx.session.actor);
                record.uninstalled_on = None;
                record.uninstalled_by = None;
                record.save(conn)?;
                Ok(record)
            })
        })();

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(dest) {
                    warn!("Could not clean up {}: {}", dest.display(), cleanup);
                }
                return Err(e);
            }
        };
        self.bump_counter(revision.id, Counter::Installs)?;

        options.report(revision.id, &revision.name, LifecycleStatus::Installed, dest.display().to_string());
        info!("Installed {} '{}' at {}", revision.kind, revision.display_name(), dest.display());

        InstalledHolon::from_record(&record)?.ok_or_else(|| {
            Error::ManifestCorrupt(format!("install record of '{}' lost its path", revision.name))
        })
    }

    /// Install the dependency graph of `owner` below `root`, depth-first
    fn install_dependencies(&self, ctx: &ManagerContext<'_>, owner: &Artifact, root: &Path) -> Result<()> {
        for (kind, refs) in &owner.dependencies {
            if refs.is_empty() {
                continue;
            }
            ctx.options.report(
                owner.id,
                &owner.name,
                LifecycleStatus::installing_dependencies_of(*kind),
                format!("{} {}", refs.len(), kind.collection_name()),
            );
            for dependency in refs {
                ctx.options.check_cancelled("install")?;
                self.install_dependency(ctx, owner, root, dependency)
                    .within("install", &format!("install dependency '{}'", dependency.target_name))?;
            }
        }
        Ok(())
    }

    fn install_dependency(
        &self,
        ctx: &ManagerContext<'_>,
        owner: &Artifact,
        root: &Path,
        dependency: &DependencyRef,
    ) -> Result<()> {
        let dest = nested_dependency_dir(root, dependency.kind, &dependency.target_name);
        if manifest::manifest_path(&dest).is_file() {
            debug!(
                "Dependency '{}' of '{}' shipped in the package at {}",
                dependency.target_name,
                owner.name,
                dest.display()
            );
            return Ok(());
        }
        if !ctx.enter(dependency.target_id) {
            warn!(
                "Dependency cycle through '{}' ({}), skipping",
                dependency.target_name, dependency.target_id
            );
            return Ok(());
        }

        let result = (|| -> Result<()> {
            let target = self.with_conn(|conn| HolonRecord::find_by_id(conn, dependency.target_id))?;
            let revision = match target {
                Some(target) => self
                    .published_revision(&target, Some(dependency.target_version_sequence))
                    .or_else(|_| self.published_revision(&target, None))
                    .ok(),
                None => None,
            };
            let Some(revision) = revision else {
                warn!(
                    "No published revision of dependency '{}' ({}), skipping",
                    dependency.target_name, dependency.target_id
                );
                return Ok(());
            };

            let manager = self.managers.get(dependency.kind)?;
            let _guard = self.locks.acquire(revision.id, revision.version_sequence, "install")?;
            let package_path = match self.existing_download(revision.id, revision.version_sequence)? {
                Some(path) => path,
                None => manager.download(ctx, &revision)?.path,
            };
            manager.install(ctx, &revision, &package_path, &dest, Some(owner.id))?;
            Ok(())
        })();

        ctx.leave(dependency.target_id);
        result
    }

    /// Remove an installed copy from disk and mark its record uninstalled
    pub fn uninstall_copy(&self, ctx: &ManagerContext<'_>, installed: &InstalledHolon) -> Result<InstalledHolon> {
        let artifact = &installed.artifact;
        let options = ctx.options;
        options.report(artifact.id, &artifact.name, LifecycleStatus::Uninstalling, installed.path.display().to_string());
        options.check_cancelled("uninstall")?;

        if installed.path.exists() {
            fs::remove_dir_all(&installed.path)?;
        }

        let now = Utc::now();
        let record = self.with_conn(|conn| {
            let mut record = Installation::list_for_holon(conn, artifact.id)?
                .into_iter()
                .rev()
                .find(|r| {
                    r.version_sequence == artifact.version_sequence
                        && r.status == InstallStatus::Installed
                        && r.installed_path.as_deref() == Some(installed.path.as_path())
                })
                .ok_or_else(|| Error::NotFound(format!("installed copy of '{}'", artifact.name)))?;
            record.status = InstallStatus::Uninstalled;
            record.uninstalled_on = Some(now);
            record.uninstalled_by = Some(ctx.session.actor);
            record.save(conn)?;
            Ok(record)
        })?;

        options.report(artifact.id, &artifact.name, LifecycleStatus::Uninstalled, "");
        info!("Uninstalled {} '{}' from {}", artifact.kind, artifact.display_name(), installed.path.display());

        InstalledHolon::from_record(&record)?.ok_or_else(|| {
            Error::ManifestCorrupt(format!("install record of '{}' lost its path", artifact.name))
        })
    }

    /// Download a published revision (latest when `version` is None)
    pub fn download(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        version: Option<u32>,
        options: &OperationOptions,
    ) -> Result<DownloadedHolon> {
        let ctx = ManagerContext::new(self, session, options);
        let manager = self.managers.get(kind)?;
        let artifact = manager.find(&ctx, token)?;
        let revision = self.published_revision(&artifact, version)?;

        let _guard = self.locks.acquire(revision.id, revision.version_sequence, "download")?;
        manager.download(&ctx, &revision).map_err(|e| {
            options.report(revision.id, &revision.name, LifecycleStatus::Error, e.to_string());
            e
        })
    }

    /// Install a holon according to `request.mode`
    ///
    /// With `request.package` set the local package file is installed and
    /// registry publish state is not consulted.
    pub fn install(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        request: InstallRequest,
        options: &OperationOptions,
    ) -> Result<InstallOutcome> {
        if let Some(package_path) = request.package.clone() {
            return self.install_from_package(session, kind, &package_path, request, options);
        }

        let ctx = ManagerContext::new(self, session, options);
        let manager = self.managers.get(kind)?;
        let artifact = manager.find(&ctx, token)?;
        let revision = self.published_revision(&artifact, request.version_sequence)?;

        let _guard = self.locks.acquire(revision.id, revision.version_sequence, "install")?;
        ctx.enter(revision.id);
        let result = self.install_locked(&ctx, &revision, None, &request);
        if let Err(ref e) = result {
            options.report(revision.id, &revision.name, LifecycleStatus::Error, e.to_string());
        }
        result
    }

    /// Install from a package file using its embedded manifest
    pub fn install_from_package(
        &self,
        session: &Session,
        kind: HolonKind,
        package_path: &Path,
        request: InstallRequest,
        options: &OperationOptions,
    ) -> Result<InstallOutcome> {
        let (embedded, _) = package::read_package_file(package_path)?;
        if embedded.kind != kind {
            return Err(Error::InvalidInput(format!(
                "{} contains a {}, not a {}",
                package_path.display(),
                embedded.kind,
                kind
            )));
        }

        let ctx = ManagerContext::new(self, session, options);
        let _guard = self.locks.acquire(embedded.id, embedded.version_sequence, "install")?;
        ctx.enter(embedded.id);
        let result = self.install_locked(&ctx, &embedded, Some(package_path), &request);
        if let Err(ref e) = result {
            options.report(embedded.id, &embedded.name, LifecycleStatus::Error, e.to_string());
        }
        result
    }

    fn install_locked(
        &self,
        ctx: &ManagerContext<'_>,
        revision: &Artifact,
        local_package: Option<&Path>,
        request: &InstallRequest,
    ) -> Result<InstallOutcome> {
        let mode = request.mode;
        let manager = self.managers.get(revision.kind)?;

        if mode != InstallMode::DownloadOnly
            && let Some(prior) = self.installed_revision(revision.id, revision.version_sequence)?
        {
            if !mode.replaces_existing() {
                return Err(Error::AlreadyInstalled(format!(
                    "{} '{}' is already installed at {}",
                    revision.kind,
                    revision.display_name(),
                    prior.path.display()
                )));
            }
            debug!("Replacing prior install of '{}'", revision.display_name());
            manager.uninstall(ctx, &prior)?;
        }

        let package_path = match local_package {
            Some(path) if mode != InstallMode::DownloadOnly => path.to_path_buf(),
            Some(path) => {
                return Err(Error::InvalidInput(format!(
                    "{} is already a local package; nothing to download",
                    path.display()
                )));
            }
            None if mode.forces_download() => manager.download(ctx, revision)?.path,
            None => match self.existing_download(revision.id, revision.version_sequence)? {
                Some(path) => path,
                None => manager.download(ctx, revision)?.path,
            },
        };

        if mode == InstallMode::DownloadOnly {
            let record = self.with_conn(|conn| {
                Installation::find_for(conn, revision.id, revision.version_sequence, None)
            })?;
            let downloaded = match record {
                Some(record) => DownloadedHolon::from_record(&record)?,
                None => None,
            };
            return downloaded.map(InstallOutcome::Downloaded).ok_or_else(|| {
                Error::NotFound(format!("download of '{}'", revision.display_name()))
            });
        }

        let dest = request.destination.clone().unwrap_or_else(|| {
            self.paths
                .install_dir(revision.kind, &revision.name, revision.id, &revision.version)
        });
        let installed = manager.install(ctx, revision, &package_path, &dest, None)?;
        Ok(InstallOutcome::Installed(installed))
    }

    /// Uninstall the installed copy of a holon (newest version when `version` is None)
    pub fn uninstall(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        version: Option<u32>,
        options: &OperationOptions,
    ) -> Result<InstalledHolon> {
        let ctx = ManagerContext::new(self, session, options);
        let manager = self.managers.get(kind)?;
        let artifact = manager.find(&ctx, token)?;

        let installed = match version {
            Some(seq) => self.installed_revision(artifact.id, seq)?,
            None => manager.is_installed(&ctx, artifact.id)?,
        }
        .ok_or_else(|| Error::NotFound(format!("{} '{}' is not installed", kind, artifact.name)))?;

        let _guard = self
            .locks
            .acquire(artifact.id, installed.artifact.version_sequence, "uninstall")?;
        manager.uninstall(&ctx, &installed)
    }

    /// Configured placement, with Flatten falling back to Nested
    pub(crate) fn effective_placement(&self, options: &OperationOptions) -> PlacementPolicy {
        match options.placement.unwrap_or(self.config.engine.placement) {
            PlacementPolicy::Nested => PlacementPolicy::Nested,
            PlacementPolicy::Flatten => {
                warn!("Flatten dependency placement is not implemented, using Nested");
                PlacementPolicy::Nested
            }
        }
    }
}
