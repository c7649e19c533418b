// src/lifecycle/publish.rs

//! Publish, unpublish, republish and delete

use super::{LifecycleEngine, OperationOptions};
use crate::config::package_file_name;
use crate::db::{
    self,
    models::{HolonRecord, Installation, VersionRecord},
};
use crate::error::{Error, Result, ResultExt};
use crate::kind::HolonKind;
use crate::manifest::{self, Artifact, ledger};
use crate::package;
use crate::progress::LifecycleStatus;
use crate::session::Session;
use crate::store::StoreLocation;
use crate::version;
use chrono::Utc;
use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Write bytes to `path` atomically (temp file in the same directory, fsync, rename)
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidInput(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;
    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl LifecycleEngine {
    /// Version the next revision will carry
    ///
    /// An explicit version wins, then the one in the source manifest. If the
    /// result does not move past the latest published version, the patch
    /// component of that version is bumped.
    fn next_version(&self, draft: &Artifact, explicit: Option<&str>) -> Result<String> {
        let requested = match explicit {
            Some(v) => version::normalize(v)?,
            None => draft
                .source_path
                .as_deref()
                .and_then(|source| manifest::read_manifest(source).ok())
                .filter(|on_disk| on_disk.id == draft.id)
                .map(|on_disk| on_disk.version)
                .unwrap_or_else(|| draft.version.clone()),
        };

        let latest = self.with_conn(|conn| ledger::load_latest_published(conn, draft.id))?;
        match latest {
            Some(latest) if version::compare(&requested, &latest.version)? != Ordering::Greater => {
                let bumped = version::bump_patch(&latest.version)?;
                debug!(
                    "Version {} of '{}' is not newer than published {}, using {}",
                    requested, draft.name, latest.version, bumped
                );
                Ok(bumped)
            }
            _ => Ok(requested),
        }
    }

    /// Publish the current source of a holon as a new revision
    ///
    /// Allocates the next version sequence, packs the source tree, stores the
    /// package through the session's provider, and writes the package file
    /// to the published directory.
    pub fn publish(
        &self,
        session: &Session,
        kind: HolonKind,
        token: &str,
        version: Option<&str>,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        let (_guard, draft) = self.lock_draft(session, kind, token, "publish", options)?;
        self.publish_locked(session, draft, version, options)
    }

    /// Publish with the draft identity already held
    fn publish_locked(
        &self,
        session: &Session,
        draft: Artifact,
        version: Option<&str>,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        options.report(draft.id, &draft.name, LifecycleStatus::Publishing, "");
        let result = self.publish_revision(session, draft.clone(), version, options);
        if let Err(ref e) = result {
            options.report(draft.id, &draft.name, LifecycleStatus::Error, e.to_string());
        }
        result
    }

    fn publish_revision(
        &self,
        session: &Session,
        mut artifact: Artifact,
        version: Option<&str>,
        options: &OperationOptions,
    ) -> Result<Artifact> {
        let source = artifact
            .source_path
            .clone()
            .filter(|p| p.is_dir())
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{} '{}' has no source directory to publish",
                    artifact.kind, artifact.name
                ))
            })?;

        artifact.version = self.next_version(&artifact, version)?;
        options.check_cancelled("publish")?;

        let sequence = self.with_conn(|conn| ledger::register_version(conn, &artifact))?;
        let provider = self.providers.effective(session.provider);
        let now = Utc::now();
        artifact.version_sequence = sequence;
        artifact.number_of_versions = sequence;
        artifact.is_published = true;
        artifact.published_by = Some(session.actor);
        artifact.published_on = Some(now);
        artifact.published_provider = Some(provider);
        artifact.modified_on = Some(now);
        artifact.checksum = None;
        artifact.published_location = None;

        let mut stored: Option<StoreLocation> = None;
        let outcome = (|| -> Result<Artifact> {
            let bytes = package::pack_dir(&source, &artifact).within("publish", "pack")?;
            options.check_cancelled("publish")?;

            let store = self.providers.resolve(provider)?;
            let location = store
                .put(artifact.store_key(), &bytes)
                .within("publish", "ArtifactStore::put")?;
            stored = Some(location.clone());

            let published_path = self
                .paths
                .published_dir(artifact.kind)
                .join(package_file_name(artifact.kind, &artifact.name, artifact.id, &artifact.version));
            write_file_atomic(&published_path, &bytes)?;

            artifact.published_size = location.size;
            artifact.checksum = Some(location.checksum.clone());
            artifact.published_location = Some(location);
            artifact.published_path = Some(published_path);

            self.with_conn(|conn| ledger::commit_version(conn, &artifact))?;
            manifest::write_manifest(&source, &artifact)?;
            Ok(artifact.clone())
        })();

        match outcome {
            Ok(published) => {
                options.report(
                    published.id,
                    &published.name,
                    LifecycleStatus::Published,
                    format!("v{} (sequence {})", published.version, published.version_sequence),
                );
                info!(
                    "Published {} '{}' v{} as sequence {} ({} bytes)",
                    published.kind,
                    published.name,
                    published.version,
                    published.version_sequence,
                    published.published_size
                );
                Ok(published)
            }
            Err(e) => {
                if let Some(location) = stored
                    && let Ok(store) = self.providers.resolve(location.provider)
                    && let Err(cleanup) = store.remove(&location)
                {
                    warn!("Could not remove stored package {}: {}", location.uri, cleanup);
                }
                if let Err(cleanup) =
                    self.with_conn(|conn| ledger::discard_version(conn, artifact.id, sequence))
                {
                    warn!("Could not discard version {}: {}", sequence, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Withdraw the latest published revision; reversible with `republish`
    pub fn unpublish(&self, session: &Session, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        let (_guard, mut artifact) = self.lock_draft(session, kind, token, "unpublish", options)?;

        let mut revision = self
            .with_conn(|conn| ledger::load_latest_published(conn, artifact.id))?
            .ok_or_else(|| {
                Error::NotPublished(format!("{} '{}' is not published", kind, artifact.name))
            })?;

        revision.is_published = false;
        artifact.is_published = false;
        artifact.modified_on = Some(Utc::now());
        self.with_conn(|conn| {
            db::transaction(conn, |tx| {
                VersionRecord::update(tx, &revision)?;
                HolonRecord::save(tx, &artifact)
            })
        })?;
        if let Some(source) = artifact.source_path.as_deref().filter(|p| p.is_dir()) {
            manifest::write_manifest(source, &artifact)?;
        }

        info!(
            "Unpublished {} '{}' v{} (sequence {})",
            kind, artifact.name, revision.version, revision.version_sequence
        );
        Ok(artifact)
    }

    /// Publish the last revision again without allocating a new one
    pub fn republish(&self, session: &Session, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        let (_guard, mut artifact) = self.lock_draft(session, kind, token, "republish", options)?;

        if artifact.is_published {
            return Err(Error::InvalidInput(format!(
                "{} '{}' is already published",
                kind, artifact.name
            )));
        }
        let mut revision = self
            .with_conn(|conn| ledger::load_latest(conn, artifact.id))
            .map_err(|_| {
                Error::NotPublished(format!(
                    "{} '{}' has never been published",
                    kind, artifact.name
                ))
            })?;

        options.report(artifact.id, &artifact.name, LifecycleStatus::Publishing, "republish");
        revision.is_published = true;
        revision.published_on = Some(Utc::now());
        revision.published_by = Some(session.actor);

        // The draft keeps its source path and activity flag
        let source_path = artifact.source_path.take();
        let is_active = artifact.is_active;
        artifact = revision.clone();
        artifact.source_path = source_path;
        artifact.is_active = is_active;

        self.with_conn(|conn| {
            db::transaction(conn, |tx| {
                VersionRecord::update(tx, &revision)?;
                HolonRecord::save(tx, &artifact)
            })
        })?;
        if let Some(source) = artifact.source_path.as_deref().filter(|p| p.is_dir()) {
            manifest::write_manifest(source, &artifact)?;
        }

        options.report(artifact.id, &artifact.name, LifecycleStatus::Published, "republish");
        info!(
            "Republished {} '{}' v{} (sequence {})",
            kind, artifact.name, artifact.version, artifact.version_sequence
        );
        Ok(artifact)
    }

    /// Permanently remove a holon
    ///
    /// Purges the source directory, published and downloaded package files,
    /// every stored revision, and all registry rows. Installed trees stay on
    /// disk.
    pub fn delete(&self, session: &Session, kind: HolonKind, token: &str, options: &OperationOptions) -> Result<Artifact> {
        let (_guard, artifact) = self.lock_draft(session, kind, token, "delete", options)?;

        options.report(artifact.id, &artifact.name, LifecycleStatus::Deleting, "");
        options.check_cancelled("delete")?;

        let (revisions, records) = self.with_conn(|conn| {
            Ok((
                VersionRecord::list_for(conn, artifact.id)?,
                Installation::list_for_holon(conn, artifact.id)?,
            ))
        })?;

        for revision in &revisions {
            if let Some(location) = &revision.published_location {
                self.providers
                    .resolve(location.provider)?
                    .remove(location)
                    .within("delete", "ArtifactStore::remove")?;
            }
            if let Some(path) = &revision.published_path {
                remove_file_if_exists(path)?;
            }
        }
        for record in &records {
            if let Some(path) = &record.downloaded_path {
                remove_file_if_exists(path)?;
            }
        }
        if let Some(source) = &artifact.source_path
            && source.exists()
        {
            fs::remove_dir_all(source)?;
            debug!("Removed source directory {}", source.display());
        }

        self.with_conn(|conn| {
            db::transaction(conn, |tx| {
                Installation::delete_for_holon(tx, artifact.id)?;
                VersionRecord::delete_all(tx, artifact.id)?;
                HolonRecord::delete(tx, artifact.id)?;
                Ok(())
            })
        })?;

        options.report(artifact.id, &artifact.name, LifecycleStatus::Deleted, "");
        info!(
            "Deleted {} '{}' ({} versions)",
            kind,
            artifact.name,
            revisions.len()
        );
        Ok(artifact)
    }
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ErrorKind;
    use crate::lifecycle::CreateRequest;
    use crate::store::ProviderType;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn setup(temp: &TempDir) -> (LifecycleEngine, Session, Artifact) {
        let engine = LifecycleEngine::open(EngineConfig::with_home(temp.path())).unwrap();
        let session = Session::new(Uuid::new_v4(), "alice");
        let lib = engine
            .create(&session, CreateRequest::new(HolonKind::Library, "MoonLib", "lunar maths"))
            .unwrap();
        fs::write(lib.source_path.as_ref().unwrap().join("moon.txt"), "craters").unwrap();
        (engine, session, lib)
    }

    #[test]
    fn test_publish_stores_package() {
        let temp = TempDir::new().unwrap();
        let (engine, session, lib) = setup(&temp);
        let options = OperationOptions::new();

        let published = engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &options)
            .unwrap();
        assert_eq!(published.version_sequence, 1);
        assert!(published.is_published);
        assert_eq!(published.published_provider, Some(ProviderType::Local));

        let path = published.published_path.clone().unwrap();
        let expected = format!("MoonLib_{}_v1.0.0.olib", crate::config::short_id(lib.id));
        assert!(path.ends_with(format!("Published/Library/{}", expected)));
        let bytes = fs::read(&path).unwrap();
        assert_eq!(published.checksum.as_deref(), Some(crate::hash::sha256(&bytes).as_str()));

        let store = engine.providers().resolve(ProviderType::Local).unwrap();
        assert!(store.exists(published.store_key()));

        let source = manifest::read_manifest(lib.source_path.as_ref().unwrap()).unwrap();
        assert!(source.is_published);
    }

    #[test]
    fn test_republishing_same_version_bumps_patch() {
        let temp = TempDir::new().unwrap();
        let (engine, session, _) = setup(&temp);
        let options = OperationOptions::new();

        let first = engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &options)
            .unwrap();
        let second = engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &options)
            .unwrap();
        let third = engine
            .publish(&session, HolonKind::Library, "MoonLib", Some("2.0"), &options)
            .unwrap();

        assert_eq!(
            (first.version.as_str(), second.version.as_str(), third.version.as_str()),
            ("1.0.0", "1.0.1", "2.0.0")
        );
        assert_eq!(third.version_sequence, 3);
        assert_eq!(third.number_of_versions, 3);
    }

    #[test]
    fn test_publish_by_other_actor_denied() {
        let temp = TempDir::new().unwrap();
        let (engine, _, _) = setup(&temp);
        let bob = Session::new(Uuid::new_v4(), "bob");
        let err = engine
            .publish(&bob, HolonKind::Library, "MoonLib", None, &OperationOptions::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_cancelled_publish_leaves_no_revision() {
        let temp = TempDir::new().unwrap();
        let (engine, session, lib) = setup(&temp);
        let options = OperationOptions::new().with_cancel(Arc::new(AtomicBool::new(true)));

        let err = engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserCancelled);
        let versions = engine
            .list_versions(HolonKind::Library, &lib.id.to_string(), &OperationOptions::new())
            .unwrap();
        assert!(versions.is_empty());
    }

    #[test]
    fn test_unpublish_and_republish() {
        let temp = TempDir::new().unwrap();
        let (engine, session, _) = setup(&temp);
        let options = OperationOptions::new();

        let err = engine
            .republish(&session, HolonKind::Library, "MoonLib", &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPublished);
        let err = engine
            .unpublish(&session, HolonKind::Library, "MoonLib", &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotPublished);

        engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &options)
            .unwrap();
        let draft = engine
            .unpublish(&session, HolonKind::Library, "MoonLib", &options)
            .unwrap();
        assert!(!draft.is_published);
        assert_eq!(engine.list_unpublished(&session, None).unwrap().len(), 1);

        let again = engine
            .republish(&session, HolonKind::Library, "MoonLib", &options)
            .unwrap();
        assert!(again.is_published);
        assert_eq!(again.version_sequence, 1);
        assert_eq!(again.version, "1.0.0");
        assert!(again.source_path.is_some());
    }

    #[test]
    fn test_delete_purges_everything() {
        let temp = TempDir::new().unwrap();
        let (engine, session, lib) = setup(&temp);
        let options = OperationOptions::new();
        let published = engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &options)
            .unwrap();

        engine
            .delete(&session, HolonKind::Library, "MoonLib", &options)
            .unwrap();

        assert!(!lib.source_path.as_ref().unwrap().exists());
        assert!(!published.published_path.as_ref().unwrap().exists());
        let store = engine.providers().resolve(ProviderType::Default).unwrap();
        assert!(!store.exists(published.store_key()));

        let token = lib.id.to_string();
        for err in [
            engine.load(HolonKind::Library, &token, &options).unwrap_err(),
            engine
                .publish(&session, HolonKind::Library, &token, None, &options)
                .unwrap_err(),
            engine.list_versions(HolonKind::Library, &token, &options).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }

    #[test]
    fn test_memory_provider_publish() {
        let temp = TempDir::new().unwrap();
        let (engine, session, _) = setup(&temp);
        let session = session.with_provider(ProviderType::Memory);

        let published = engine
            .publish(&session, HolonKind::Library, "MoonLib", None, &OperationOptions::new())
            .unwrap();
        assert_eq!(published.published_provider, Some(ProviderType::Memory));
        let location = published.published_location.unwrap();
        assert!(location.uri.starts_with("memory://"));
    }
}
