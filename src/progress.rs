// src/progress.rs

//! Lifecycle progress reporting
//!
//! Long-running operations (publish, download, install, delete) emit
//! discrete status events so a caller can render progress without blocking
//! other work. Implementations:
//! - `SilentProgress`: No-op for scripted/quiet modes
//! - `LogProgress`: Forwards events to tracing
//! - `CallbackProgress`: Calls a user-provided function (GUI, HTTP streaming)

use crate::kind::HolonKind;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
use uuid::Uuid;

/// Discrete lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Publishing,
    Published,
    Downloading,
    Downloaded,
    Installing,
    InstallingDependencies,
    InstallingRuntimes,
    InstallingLibs,
    InstallingTemplates,
    Installed,
    Uninstalling,
    Uninstalled,
    Deleting,
    Deleted,
    Error,
}

impl LifecycleStatus {
    /// Status announced while installing dependencies of a given kind
    pub fn installing_dependencies_of(kind: HolonKind) -> Self {
        match kind {
            HolonKind::Runtime => Self::InstallingRuntimes,
            HolonKind::Library => Self::InstallingLibs,
            HolonKind::Template => Self::InstallingTemplates,
            _ => Self::InstallingDependencies,
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Installing => "installing",
            Self::InstallingDependencies => "installing dependencies",
            Self::InstallingRuntimes => "installing runtimes",
            Self::InstallingLibs => "installing libraries",
            Self::InstallingTemplates => "installing templates",
            Self::Installed => "installed",
            Self::Uninstalling => "uninstalling",
            Self::Uninstalled => "uninstalled",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One progress event
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub holon_id: Uuid,
    pub holon_name: String,
    pub status: LifecycleStatus,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(
        holon_id: Uuid,
        holon_name: impl Into<String>,
        status: LifecycleStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            holon_id,
            holon_name: holon_name.into(),
            status,
            message: message.into(),
        }
    }
}

/// Receiver of progress events
///
/// Implementations must be thread-safe (Send + Sync) so an engine shared
/// across worker threads can report through one sink.
pub trait ProgressSink: Send + Sync {
    /// Report one event
    fn report(&self, event: ProgressEvent);

    /// Number of events received so far
    fn events_seen(&self) -> u64;
}

/// Silent progress sink (no-op)
#[derive(Debug, Default)]
pub struct SilentProgress {
    seen: AtomicU64,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for SilentProgress {
    fn report(&self, _event: ProgressEvent) {
        self.seen.fetch_add(1, Ordering::Relaxed);
    }

    fn events_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

/// Logging progress sink
///
/// Logs events to tracing at info level, errors at warn.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    seen: AtomicU64,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seen: AtomicU64::new(0),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, event: ProgressEvent) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        if event.status == LifecycleStatus::Error {
            warn!("{}: {} ERROR - {}", self.name, event.holon_name, event.message);
        } else {
            info!(
                "{}: {} [{}] {}",
                self.name, event.holon_name, event.status, event.message
            );
        }
    }

    fn events_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

/// Callback-based progress sink
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    seen: AtomicU64,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            seen: AtomicU64::new(0),
        }
    }
}

impl<F> ProgressSink for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self.seen.fetch_add(1, Ordering::Relaxed);
        (self.callback)(event);
    }

    fn events_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}
