// src/lifecycle/options.rs

//! Per-call options and request types

use crate::config::PlacementPolicy;
use crate::error::{Error, Result};
use crate::kind::HolonKind;
use crate::manifest::{DownloadedHolon, InstalledHolon};
use crate::policy::{ConfirmationPolicy, DisambiguationPolicy};
use crate::progress::{LifecycleStatus, ProgressEvent, ProgressSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Options for controlling one lifecycle call
#[derive(Clone, Default)]
pub struct OperationOptions {
    /// Cancel token - set to true to request cancellation
    pub cancel: Option<Arc<AtomicBool>>,
    /// Receiver of status events
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub disambiguation: DisambiguationPolicy,
    pub confirmation: ConfirmationPolicy,
    /// Publish an unpublished dependency (after confirmation) instead of failing
    pub publish_if_needed: bool,
    /// Overrides the configured dependency placement
    pub placement: Option<PlacementPolicy>,
}

impl OperationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_disambiguation(mut self, policy: DisambiguationPolicy) -> Self {
        self.disambiguation = policy;
        self
    }

    pub fn with_confirmation(mut self, policy: ConfirmationPolicy) -> Self {
        self.confirmation = policy;
        self
    }

    pub fn publish_if_needed(mut self, enabled: bool) -> Self {
        self.publish_if_needed = enabled;
        self
    }

    pub fn with_placement(mut self, placement: PlacementPolicy) -> Self {
        self.placement = Some(placement);
        self
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return UserCancelled if cancellation was requested
    pub fn check_cancelled(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::UserCancelled(format!("{} cancelled", operation)))
        } else {
            Ok(())
        }
    }

    /// Report a status event if a sink is attached
    pub fn report(&self, id: Uuid, name: &str, status: LifecycleStatus, message: impl Into<String>) {
        if let Some(ref progress) = self.progress {
            progress.report(ProgressEvent::new(id, name, status, message));
        }
    }
}

/// How `install` obtains and applies a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Fetch the package only
    DownloadOnly,
    /// Use a local package or an existing download (fetching it if absent)
    InstallOnly,
    #[default]
    DownloadAndInstall,
    /// InstallOnly, replacing a prior install of the same version
    ReInstall,
    /// DownloadAndInstall, replacing a prior install of the same version
    DownloadAndReInstall,
}

impl InstallMode {
    /// Whether a prior install of the same version is replaced
    pub fn replaces_existing(&self) -> bool {
        matches!(self, Self::ReInstall | Self::DownloadAndReInstall)
    }

    /// Whether a fresh download is forced
    pub fn forces_download(&self) -> bool {
        matches!(
            self,
            Self::DownloadOnly | Self::DownloadAndInstall | Self::DownloadAndReInstall
        )
    }
}

/// Parameters of `install`
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub mode: InstallMode,
    /// Version sequence; latest published when None
    pub version_sequence: Option<u32>,
    /// Local package file (InstallOnly / ReInstall)
    pub package: Option<PathBuf>,
    /// Install location; the configured layout when None
    pub destination: Option<PathBuf>,
}

impl InstallRequest {
    pub fn mode(mode: InstallMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn version(mut self, sequence: u32) -> Self {
        self.version_sequence = Some(sequence);
        self
    }

    pub fn package(mut self, path: impl Into<PathBuf>) -> Self {
        self.package = Some(path.into());
        self
    }

    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }
}

/// Result of `install`
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Downloaded(DownloadedHolon),
    Installed(InstalledHolon),
}

impl InstallOutcome {
    pub fn installed(&self) -> Option<&InstalledHolon> {
        match self {
            Self::Installed(installed) => Some(installed),
            Self::Downloaded(_) => None,
        }
    }

    pub fn into_installed(self) -> Option<InstalledHolon> {
        match self {
            Self::Installed(installed) => Some(installed),
            Self::Downloaded(_) => None,
        }
    }
}

/// Parameters of `create`
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub description: String,
    pub kind: HolonKind,
    /// Initial version; 1.0.0 when None
    pub version: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub launch_target: Option<String>,
    /// Source directory; the configured layout when None
    pub source_dir: Option<PathBuf>,
}

impl CreateRequest {
    pub fn new(kind: HolonKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            version: None,
            category: None,
            subcategory: None,
            launch_target: None,
            source_dir: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }
}

/// Descriptor fields to change on a draft; None leaves a field as it is
///
/// An empty string clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub launch_target: Option<String>,
}

impl UpdateRequest {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn launch_target(mut self, target: impl Into<String>) -> Self {
        self.launch_target = Some(target.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.subcategory.is_none()
            && self.launch_target.is_none()
    }
}
