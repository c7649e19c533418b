// src/manifest/projection.rs

//! Downloaded and installed views of a revision
//!
//! Both are read models over one installation record plus the descriptor
//! it was materialized from; neither is stored on its own.

use super::Artifact;
use crate::db::models::{InstallStatus, Installation};
use crate::error::Result;
use crate::session::ActorId;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A revision whose package has been fetched
#[derive(Debug, Clone)]
pub struct DownloadedHolon {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub downloaded_on: Option<DateTime<Utc>>,
    pub downloaded_by: Option<ActorId>,
}

/// A revision extracted to an install location
#[derive(Debug, Clone)]
pub struct InstalledHolon {
    pub artifact: Artifact,
    pub path: PathBuf,
    pub status: InstallStatus,
    pub downloaded_path: Option<PathBuf>,
    pub downloaded_on: Option<DateTime<Utc>>,
    pub downloaded_by: Option<ActorId>,
    pub installed_on: Option<DateTime<Utc>>,
    pub installed_by: Option<ActorId>,
    pub uninstalled_on: Option<DateTime<Utc>>,
    pub uninstalled_by: Option<ActorId>,
}

impl InstalledHolon {
    pub fn is_installed(&self) -> bool {
        self.status == InstallStatus::Installed
    }
}

impl DownloadedHolon {
    /// View over a record, if it has a downloaded package
    pub fn from_record(record: &Installation) -> Result<Option<Self>> {
        let Some(path) = record.downloaded_path.clone() else {
            return Ok(None);
        };
        let mut artifact = record.manifest()?;
        artifact.downloaded_path = Some(path.clone());
        Ok(Some(Self {
            artifact,
            path,
            downloaded_on: record.downloaded_on,
            downloaded_by: record.downloaded_by,
        }))
    }
}

impl InstalledHolon {
    /// View over a record, if it was ever installed
    pub fn from_record(record: &Installation) -> Result<Option<Self>> {
        let Some(path) = record.installed_path.clone() else {
            return Ok(None);
        };
        let mut artifact = record.manifest()?;
        artifact.installed_path = Some(path.clone());
        artifact.downloaded_path = record.downloaded_path.clone();
        Ok(Some(Self {
            artifact,
            path,
            status: record.status,
            downloaded_path: record.downloaded_path.clone(),
            downloaded_on: record.downloaded_on,
            downloaded_by: record.downloaded_by,
            installed_on: record.installed_on,
            installed_by: record.installed_by,
            uninstalled_on: record.uninstalled_on,
            uninstalled_by: record.uninstalled_by,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::HolonKind;
    use uuid::Uuid;

    #[test]
    fn test_views_share_identity() {
        let mut moon = Artifact::new("Moon", "", HolonKind::Library, Uuid::new_v4(), "tester");
        moon.version_sequence = 2;
        let mut record = Installation::new(&moon, InstallStatus::Installed).unwrap();
        record.downloaded_path = Some(PathBuf::from("/d/moon.olib"));
        record.installed_path = Some(PathBuf::from("/i/moon"));

        let downloaded = DownloadedHolon::from_record(&record).unwrap().unwrap();
        let installed = InstalledHolon::from_record(&record).unwrap().unwrap();
        assert_eq!(downloaded.artifact.id, installed.artifact.id);
        assert_eq!(
            downloaded.artifact.version_sequence,
            installed.artifact.version_sequence
        );
        assert!(installed.is_installed());
        assert_eq!(installed.artifact.installed_path, Some(PathBuf::from("/i/moon")));
    }

    #[test]
    fn test_download_only_record_has_no_install_view() {
        let moon = Artifact::new("Moon", "", HolonKind::Library, Uuid::new_v4(), "tester");
        let mut record = Installation::new(&moon, InstallStatus::Downloaded).unwrap();
        record.downloaded_path = Some(PathBuf::from("/d/moon.olib"));
        assert!(InstalledHolon::from_record(&record).unwrap().is_none());
        assert!(DownloadedHolon::from_record(&record).unwrap().is_some());
    }
}
