// src/dependency.rs

//! Dependency resolver
//!
//! Attaches and detaches typed dependency references between a parent holon
//! and a dependency holon. A reference is only recorded once the dependency
//! has been materialized inside the parent's source tree under
//! `Dependencies/<Kind>/<name>`:
//!
//! - already installed somewhere: the installed tree is copied in
//! - published: it is downloaded and installed there, with its own
//!   dependencies following depth-first
//! - unpublished: NotPublished, or one confirmed publish and one retry when
//!   the caller opted in with `publish_if_needed`

use crate::db::models::{InstallStatus, Installation};
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::kind::{DependencyKind, HolonKind};
use crate::lifecycle::{LifecycleEngine, OperationOptions, nested_dependency_dir, prepare_destination};
use crate::managers::{ArtifactSubManager, ManagerContext};
use crate::manifest::{self, Artifact, DependencyRef};
use crate::policy::Candidate;
use crate::session::Session;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Copy a directory tree into a fresh `to`, skipping manifest lock files
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to)?;

    let mut files = 0usize;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        if relative
            .file_name()
            .is_some_and(|n| n.to_string_lossy().ends_with(".lock"))
        {
            continue;
        }
        let target = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            files += 1;
        } else if file_type.is_symlink() {
            #[cfg(unix)]
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        }
    }
    Ok(files)
}

/// Remove `dir` and then any of its ancestors below `stop` left empty
fn remove_nested(dir: &Path, stop: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    let mut current = dir.parent();
    while let Some(parent) = current {
        if parent == stop || !parent.starts_with(stop) {
            break;
        }
        // Non-empty directories stay
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
    Ok(())
}

impl LifecycleEngine {
    /// Attach `dependency_token` of `kind` to a parent holon
    ///
    /// Returns the recorded reference. Fails with AlreadyInstalled when the
    /// same dependency is already attached under `kind`.
    pub fn add_dependency(
        &self,
        session: &Session,
        parent_kind: HolonKind,
        parent_token: &str,
        kind: DependencyKind,
        dependency_token: &str,
        options: &OperationOptions,
    ) -> Result<DependencyRef> {
        let (_guard, parent) =
            self.lock_draft(session, parent_kind, parent_token, "add dependencies to", options)?;

        self.attach(session, parent, kind, dependency_token, options)
    }

    fn attach(
        &self,
        session: &Session,
        mut parent: Artifact,
        kind: DependencyKind,
        dependency_token: &str,
        options: &OperationOptions,
    ) -> Result<DependencyRef> {
        let ctx = ManagerContext::new(self, session, options);
        let manager = self.managers().get(kind)?;
        let dependency = manager
            .find(&ctx, dependency_token)
            .within("add dependency", "ArtifactSubManager::find")?;

        if dependency.id == parent.id {
            return Err(Error::InvalidInput(format!(
                "'{}' cannot depend on itself",
                parent.name
            )));
        }
        if parent
            .dependencies_of(kind)
            .iter()
            .any(|d| d.target_id == dependency.id)
        {
            return Err(Error::AlreadyInstalled(format!(
                "{} '{}' is already a dependency of '{}'",
                kind, dependency.name, parent.name
            )));
        }

        let source = parent
            .source_path
            .clone()
            .filter(|p| p.is_dir())
            .ok_or_else(|| {
                Error::InvalidInput(format!("'{}' has no source directory", parent.name))
            })?;
        let placement = self.effective_placement(options);
        let dest = nested_dependency_dir(&source, kind, &dependency.name);
        debug!("Placing '{}' at {} ({:?})", dependency.name, dest.display(), placement);

        ctx.enter(parent.id);
        let installed = manager
            .is_installed(&ctx, dependency.id)
            .within("add dependency", "ArtifactSubManager::is_installed")?;
        let (revision, installed_from) = match installed {
            Some(copy) => self.link_installed(&ctx, &parent, &copy.artifact, &copy.path, &dest)?,
            None => self.link_published(&ctx, manager.as_ref(), &parent, &dependency, &dest)?,
        };

        let reference = DependencyRef {
            target_id: revision.id,
            target_name: revision.name.clone(),
            target_version: revision.version.clone(),
            target_version_sequence: revision.version_sequence,
            kind,
            installed_from,
            installed_to: dest.clone(),
        };

        parent.attach_dependency(reference.clone())?;
        parent.modified_on = Some(Utc::now());
        if let Err(e) = self.save_current(&parent) {
            warn!("Could not record dependency, removing {}", dest.display());
            if let Err(cleanup) = remove_nested(&dest, &source) {
                warn!("Could not clean up {}: {}", dest.display(), cleanup);
            }
            return Err(e);
        }

        info!(
            "Added {} '{}' v{} as a dependency of '{}'",
            kind, revision.name, revision.version, parent.name
        );
        Ok(reference)
    }

    /// Copy an installed tree into the parent and record the nested copy
    fn link_installed(
        &self,
        ctx: &ManagerContext<'_>,
        parent: &Artifact,
        installed: &Artifact,
        installed_path: &Path,
        dest: &Path,
    ) -> Result<(Artifact, PathBuf)> {
        let _guard = self
            .locks()
            .acquire(installed.id, installed.version_sequence, "add dependency")?;
        ctx.options.check_cancelled("add dependency")?;

        prepare_destination(dest, installed.id)?;
        let files = copy_tree(installed_path, dest)?;
        let mut nested = installed.clone();
        nested.installed_path = Some(dest.to_path_buf());
        manifest::write_manifest(dest, &nested)?;

        let now = Utc::now();
        self.with_conn(|conn| {
            let mut record = Installation::new(&nested, InstallStatus::Installed)?;
            record.parent_id = Some(parent.id);
            record.downloaded_path = installed.downloaded_path.clone();
            record.installed_path = Some(dest.to_path_buf());
            record.installed_on = Some(now);
            record.installed_by = Some(ctx.session.actor);
            record.insert(conn)?;
            Ok(())
        })?;

        debug!(
            "Copied installed '{}' ({} files) from {} into {}",
            installed.name,
            files,
            installed_path.display(),
            dest.display()
        );
        Ok((nested, installed_path.to_path_buf()))
    }

    /// Download and install the latest published revision into the parent
    fn link_published(
        &self,
        ctx: &ManagerContext<'_>,
        manager: &dyn ArtifactSubManager,
        parent: &Artifact,
        dependency: &Artifact,
        dest: &Path,
    ) -> Result<(Artifact, PathBuf)> {
        let revision = self.dependency_revision(ctx.session, dependency, ctx.options)?;
        let _guard = self
            .locks()
            .acquire(revision.id, revision.version_sequence, "add dependency")?;
        ctx.enter(revision.id);

        let package_path = match self.existing_download(revision.id, revision.version_sequence)? {
            Some(path) => path,
            None => {
                manager
                    .download(ctx, &revision)
                    .within("add dependency", "ArtifactSubManager::download")?
                    .path
            }
        };
        let installed = manager
            .install(ctx, &revision, &package_path, dest, Some(parent.id))
            .within("add dependency", "ArtifactSubManager::install")?;
        ctx.leave(revision.id);

        Ok((installed.artifact, package_path))
    }

    /// Latest published revision, publishing once on request
    fn dependency_revision(
        &self,
        session: &Session,
        dependency: &Artifact,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        match self.published_revision(dependency, None) {
            Err(e) if e.kind() == ErrorKind::NotPublished && options.publish_if_needed => {
                options.confirmation.require(&format!(
                    "{} '{}' is not published. Publish it now?",
                    dependency.kind, dependency.name
                ))?;
                self.publish(
                    session,
                    dependency.kind,
                    &dependency.id.to_string(),
                    None,
                    options,
                )
                .within("add dependency", "publish")?;
                self.published_revision(dependency, None)
            }
            other => other,
        }
    }

    /// Detach a dependency of `kind` from a parent holon
    ///
    /// The token matches a target id, then an exact target name, then a
    /// case-insensitive name substring. The parent-owned copy is removed;
    /// other installations of the dependency are left alone.
    pub fn remove_dependency(
        &self,
        session: &Session,
        parent_kind: HolonKind,
        parent_token: &str,
        kind: DependencyKind,
        dependency_token: &str,
        options: &OperationOptions,
    ) -> Result<DependencyRef> {
        let (_guard, mut parent) =
            self.lock_draft(session, parent_kind, parent_token, "remove dependencies from", options)?;

        let target = select_reference(parent.dependencies_of(kind), dependency_token, kind, options)?;
        options.confirmation.require(&format!(
            "Remove {} '{}' from '{}'?",
            kind, target.target_name, parent.name
        ))?;

        let removed = parent
            .detach_dependency(kind, target.target_id)
            .ok_or_else(|| Error::NotFound(format!("{} dependency '{}'", kind, target.target_name)))?;

        let now = Utc::now();
        parent.modified_on = Some(now);
        self.save_current(&parent)?;

        let parent_id = parent.id;
        self.with_conn(|conn| {
            if let Some(mut record) = Installation::find_nested(conn, removed.target_id, parent_id)? {
                record.status = InstallStatus::Uninstalled;
                record.uninstalled_on = Some(now);
                record.uninstalled_by = Some(session.actor);
                record.save(conn)?;
            }
            Ok(())
        })?;

        // The reference is gone, so a leftover tree is only untidy
        if let Some(source) = parent.source_path.clone()
            && removed.installed_to.starts_with(&source)
            && let Err(e) = remove_nested(&removed.installed_to, &source)
        {
            warn!("Could not remove {}: {}", removed.installed_to.display(), e);
        }
        info!(
            "Removed {} '{}' from '{}'",
            kind, removed.target_name, parent.name
        );
        Ok(removed)
    }
}

/// Pick one reference out of a collection by id, exact name or substring
fn select_reference(
    refs: &[DependencyRef],
    token: &str,
    kind: DependencyKind,
    options: &OperationOptions,
) -> Result<DependencyRef> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::InvalidInput(format!("empty {} dependency identifier", kind)));
    }

    let mut matches: Vec<&DependencyRef> = match Uuid::parse_str(token) {
        Ok(id) => refs.iter().filter(|d| d.target_id == id).collect(),
        Err(_) => {
            let exact: Vec<&DependencyRef> = refs.iter().filter(|d| d.target_name == token).collect();
            if exact.is_empty() {
                let needle = token.to_lowercase();
                refs.iter()
                    .filter(|d| d.target_name.to_lowercase().contains(&needle))
                    .collect()
            } else {
                exact
            }
        }
    };

    match matches.len() {
        0 => Err(Error::NotFound(format!("{} dependency '{}'", kind, token))),
        1 => Ok(matches.remove(0).clone()),
        _ => {
            matches.sort_by(|a, b| a.target_name.cmp(&b.target_name).then(a.target_id.cmp(&b.target_id)));
            let candidates: Vec<Candidate> = matches
                .iter()
                .map(|d| Candidate {
                    id: d.target_id,
                    name: d.target_name.clone(),
                    kind: d.kind,
                    version: d.target_version.clone(),
                    description: String::new(),
                })
                .collect();
            let index = options.disambiguation.select(token, &candidates)?;
            Ok(matches[index].clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lifecycle::{CreateRequest, InstallRequest};
    use crate::policy::{ConfirmationPolicy, DisambiguationPolicy};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        engine: LifecycleEngine,
        session: Session,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let engine = LifecycleEngine::open(EngineConfig::with_home(temp.path())).unwrap();
            let session = Session::new(Uuid::new_v4(), "alice");
            Self {
                _temp: temp,
                engine,
                session,
            }
        }

        fn create(&self, kind: HolonKind, name: &str) -> Artifact {
            let artifact = self
                .engine
                .create(&self.session, CreateRequest::new(kind, name, ""))
                .unwrap();
            fs::write(
                artifact.source_path.as_ref().unwrap().join("payload.txt"),
                name,
            )
            .unwrap();
            artifact
        }

        fn publish(&self, kind: HolonKind, name: &str) -> Artifact {
            self.engine
                .publish(&self.session, kind, name, None, &OperationOptions::new())
                .unwrap()
        }
    }

    #[test]
    fn test_add_published_dependency_nests_it() {
        let f = Fixture::new();
        let lib = f.create(HolonKind::Library, "LibA");
        f.publish(HolonKind::Library, "LibA");
        let app = f.create(HolonKind::Oapp, "AppB");

        let reference = f
            .engine
            .add_dependency(
                &f.session,
                HolonKind::Oapp,
                "AppB",
                HolonKind::Library,
                &lib.id.to_string(),
                &OperationOptions::new(),
            )
            .unwrap();

        let source = app.source_path.unwrap();
        assert_eq!(reference.target_version, "1.0.0");
        assert_eq!(reference.installed_to, source.join("Dependencies/Library/LibA"));
        assert_eq!(
            fs::read_to_string(reference.installed_to.join("payload.txt")).unwrap(),
            "LibA"
        );

        let on_disk = manifest::read_manifest(&source).unwrap();
        assert_eq!(on_disk.dependencies_of(HolonKind::Library), &[reference.clone()]);
    }

    #[test]
    fn test_unpublished_dependency() {
        let f = Fixture::new();
        f.create(HolonKind::Runtime, "Rt");
        f.create(HolonKind::Oapp, "App");
        let options = OperationOptions::new();

        let err = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Runtime, "Rt", &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPublished);

        let declined = options
            .clone()
            .publish_if_needed(true)
            .with_confirmation(ConfirmationPolicy::Decline);
        let err = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Runtime, "Rt", &declined)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserCancelled);

        let eager = options.publish_if_needed(true);
        let reference = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Runtime, "Rt", &eager)
            .unwrap();
        assert_eq!(reference.target_version_sequence, 1);
    }

    #[test]
    fn test_add_installed_dependency_copies_tree() {
        let f = Fixture::new();
        f.create(HolonKind::Template, "Tpl");
        f.publish(HolonKind::Template, "Tpl");
        let installed = f
            .engine
            .install(&f.session, HolonKind::Template, "Tpl", InstallRequest::default(), &OperationOptions::new())
            .unwrap()
            .into_installed()
            .unwrap();
        f.create(HolonKind::Oapp, "App");

        let reference = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Template, "Tpl", &OperationOptions::new())
            .unwrap();
        assert_eq!(reference.installed_from, installed.path);
        assert!(reference.installed_to.join("payload.txt").exists());
        // The top-level install is untouched
        assert!(installed.path.join("payload.txt").exists());
        assert_eq!(f.engine.list_installed(None).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_and_self_dependency() {
        let f = Fixture::new();
        f.create(HolonKind::Library, "Lib");
        f.publish(HolonKind::Library, "Lib");
        f.create(HolonKind::Oapp, "App");
        let options = OperationOptions::new();

        f.engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &options)
            .unwrap();
        let err = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInstalled);

        let err = f
            .engine
            .add_dependency(&f.session, HolonKind::Library, "Lib", HolonKind::Library, "Lib", &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_add_then_remove_restores_collection() {
        let f = Fixture::new();
        let lib = f.create(HolonKind::Library, "MoonLib");
        f.publish(HolonKind::Library, "MoonLib");
        let app = f.create(HolonKind::Oapp, "App");
        let options = OperationOptions::new();
        let before = f.engine.load(HolonKind::Oapp, "App", &options).unwrap().dependencies;

        let added = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "MoonLib", &options)
            .unwrap();
        let removed = f
            .engine
            .remove_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "moon", &options)
            .unwrap();

        assert_eq!(added, removed);
        assert_eq!(removed.target_id, lib.id);
        let after = f.engine.load(HolonKind::Oapp, "App", &options).unwrap().dependencies;
        assert_eq!(before, after);
        assert!(!added.installed_to.exists());
        assert!(!app.source_path.unwrap().join("Dependencies").exists());
    }

    #[test]
    fn test_remove_declined_keeps_reference() {
        let f = Fixture::new();
        f.create(HolonKind::Library, "Lib");
        f.publish(HolonKind::Library, "Lib");
        f.create(HolonKind::Oapp, "App");
        let options = OperationOptions::new();
        f.engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &options)
            .unwrap();

        let declined = options.clone().with_confirmation(ConfirmationPolicy::Decline);
        let err = f
            .engine
            .remove_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &declined)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserCancelled);
        let app = f.engine.load(HolonKind::Oapp, "App", &options).unwrap();
        assert_eq!(app.dependencies_of(HolonKind::Library).len(), 1);
    }

    #[test]
    fn test_failed_remove_keeps_nested_copy() {
        let f = Fixture::new();
        f.create(HolonKind::Library, "Lib");
        f.publish(HolonKind::Library, "Lib");
        let app = f.create(HolonKind::Oapp, "App");
        let options = OperationOptions::new();
        let added = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &options)
            .unwrap();

        // The source manifest cannot be rewritten
        let source = app.source_path.unwrap();
        let lock = crate::lock::ManifestFileLock::lock_path(&source);
        fs::remove_file(&lock).unwrap();
        fs::create_dir(&lock).unwrap();

        f.engine
            .remove_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &options)
            .unwrap_err();
        assert!(added.installed_to.join("payload.txt").exists());
        let on_disk = manifest::read_manifest(&source).unwrap();
        assert_eq!(on_disk.dependencies_of(HolonKind::Library), &[added]);
    }

    #[test]
    fn test_nested_copy_keeps_foreign_directory() {
        let f = Fixture::new();
        f.create(HolonKind::Library, "Lib");
        f.publish(HolonKind::Library, "Lib");
        let app = f.create(HolonKind::Oapp, "App");
        let occupied = app.source_path.unwrap().join("Dependencies/Library/Lib");
        fs::create_dir_all(&occupied).unwrap();
        fs::write(occupied.join("notes.txt"), "mine").unwrap();

        let err = f
            .engine
            .add_dependency(&f.session, HolonKind::Oapp, "App", HolonKind::Library, "Lib", &OperationOptions::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(fs::read_to_string(occupied.join("notes.txt")).unwrap(), "mine");
        let app = f.engine.load(HolonKind::Oapp, "App", &OperationOptions::new()).unwrap();
        assert!(app.dependencies.is_empty());
    }

    #[test]
    fn test_select_reference_disambiguates() {
        let make = |name: &str| DependencyRef {
            target_id: Uuid::new_v4(),
            target_name: name.to_string(),
            target_version: "1.0.0".to_string(),
            target_version_sequence: 1,
            kind: HolonKind::Library,
            installed_from: PathBuf::new(),
            installed_to: PathBuf::new(),
        };
        let refs = vec![make("Moonlight"), make("MoonBase")];

        let options = OperationOptions::new();
        let err = select_reference(&refs, "moon", HolonKind::Library, &options).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);

        let first = options.with_disambiguation(DisambiguationPolicy::SelectFirst);
        let picked = select_reference(&refs, "moon", HolonKind::Library, &first).unwrap();
        assert_eq!(picked.target_name, "MoonBase");

        let by_id = select_reference(&refs, &refs[0].target_id.to_string(), HolonKind::Library, &first)
            .unwrap();
        assert_eq!(by_id.target_name, "Moonlight");

        let err = select_reference(&refs, "sun", HolonKind::Library, &first).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
