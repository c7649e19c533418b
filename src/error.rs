// src/error.rs

//! Error taxonomy for the holon lifecycle engine
//!
//! Every layer wraps the error it received from the layer below with
//! [`Error::Context`], so the message a caller sees reads as a causal chain:
//! `install failed calling download: <store message>`. The root cause stays
//! matchable through [`Error::kind`].

use std::fmt;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the lifecycle engine
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier resolved to nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identifier resolved to more than one candidate
    #[error("Ambiguous match for '{token}': {} candidates ({})", .candidates.len(), .candidates.join(", "))]
    AmbiguousMatch {
        token: String,
        candidates: Vec<String>,
    },

    /// Actor is not the creator of the holon
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Install or download attempted before publish
    #[error("Not published: {0}")]
    NotPublished(String),

    /// Duplicate install or duplicate dependency link
    #[error("Already installed: {0}")]
    AlreadyInstalled(String),

    /// Descriptor missing or unparseable
    #[error("Manifest corrupt: {0}")]
    ManifestCorrupt(String),

    /// Artifact store I/O failure
    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    /// Explicit abort by the caller
    #[error("Cancelled: {0}")]
    UserCancelled(String),

    /// Another lifecycle operation holds the identity
    #[error("Operation in progress: {0}")]
    OperationInProgress(String),

    /// Caller supplied an unusable argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Wraps an inner failure with the operation that observed it
    #[error("{operation} failed calling {callee}: {source}")]
    Context {
        operation: String,
        callee: String,
        #[source]
        source: Box<Error>,
    },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ManifestCorrupt(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::InvalidInput(format!("Invalid configuration: {}", err))
    }
}

/// Flat classification of an [`Error`], ignoring context layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AmbiguousMatch,
    PermissionDenied,
    NotPublished,
    AlreadyInstalled,
    ManifestCorrupt,
    ProviderFailure,
    UserCancelled,
    OperationInProgress,
    InvalidInput,
    Io,
    Database,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    /// Root classification of this error, looking through context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::NotPublished(_) => ErrorKind::NotPublished,
            Error::AlreadyInstalled(_) => ErrorKind::AlreadyInstalled,
            Error::ManifestCorrupt(_) => ErrorKind::ManifestCorrupt,
            Error::ProviderFailure(_) => ErrorKind::ProviderFailure,
            Error::UserCancelled(_) => ErrorKind::UserCancelled,
            Error::OperationInProgress(_) => ErrorKind::OperationInProgress,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Io(_) => ErrorKind::Io,
            Error::Database(_) => ErrorKind::Database,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this failure is infrastructural and should be logged
    ///
    /// Everything else is an expected control-flow outcome surfaced to the
    /// caller verbatim.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ManifestCorrupt
                | ErrorKind::ProviderFailure
                | ErrorKind::Io
                | ErrorKind::Database
        )
    }

    /// Whether the caller may recover (publish and retry, reinstall, pick one)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotPublished | ErrorKind::AlreadyInstalled | ErrorKind::AmbiguousMatch
        )
    }

    /// Wrap this error with the operation that observed it
    pub fn within(self, operation: impl Into<String>, callee: impl Into<String>) -> Self {
        Error::Context {
            operation: operation.into(),
            callee: callee.into(),
            source: Box::new(self),
        }
    }
}

/// Attach operation context to fallible calls
pub trait ResultExt<T> {
    /// `operation failed calling callee: <inner>`
    fn within(self, operation: &str, callee: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn within(self, operation: &str, callee: &str) -> Result<T> {
        self.map_err(|e| e.within(operation, callee))
    }
}

/// Presentation-facing result: `{ value, is_error, message }`
///
/// Thin layers (CLI, HTTP, GUI) convert an engine `Result` into this shape
/// instead of matching on error variants themselves.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: Option<T>,
    pub is_error: bool,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T, message: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            is_error: false,
            message: message.into(),
            error_kind: None,
        }
    }

    /// Cancellation is a clean short-circuit, not a failure
    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::UserCancelled)
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::ok(value, "OK"),
            Err(err) => {
                let kind = err.kind();
                if err.is_unexpected() {
                    tracing::error!("{}", err);
                }
                Outcome {
                    value: None,
                    is_error: kind != ErrorKind::UserCancelled,
                    message: err.to_string(),
                    error_kind: Some(kind),
                }
            }
        }
    }
}
