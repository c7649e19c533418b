// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use starnet::{
    Artifact, CreateRequest, EngineConfig, HolonKind, LifecycleEngine, OperationOptions, Session,
};
use std::fs;
use tempfile::TempDir;
use uuid::Uuid;

/// An engine rooted in a temporary home directory.
///
/// Keep the struct alive for the duration of the test; dropping it removes
/// the home directory.
pub struct TestHome {
    pub temp: TempDir,
    pub engine: LifecycleEngine,
    pub session: Session,
}

impl TestHome {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let engine = LifecycleEngine::open(EngineConfig::with_home(temp.path())).unwrap();
        let session = Session::new(Uuid::new_v4(), "tester");
        Self {
            temp,
            engine,
            session,
        }
    }

    /// Another avatar using the same engine
    pub fn other_session(&self) -> Session {
        Session::new(Uuid::new_v4(), "someone-else")
    }

    /// Create a draft holon with one payload file in its source tree
    pub fn create(&self, kind: HolonKind, name: &str, description: &str) -> Artifact {
        let artifact = self
            .engine
            .create(&self.session, CreateRequest::new(kind, name, description))
            .unwrap();
        let source = artifact.source_path.as_ref().unwrap();
        fs::write(source.join("payload.txt"), format!("{} payload", name)).unwrap();
        artifact
    }

    /// Publish by id with default options
    pub fn publish(&self, artifact: &Artifact) -> Artifact {
        self.engine
            .publish(
                &self.session,
                artifact.kind,
                &artifact.id.to_string(),
                None,
                &OperationOptions::new(),
            )
            .unwrap()
    }

    /// Create and publish in one step
    pub fn published(&self, kind: HolonKind, name: &str) -> Artifact {
        let draft = self.create(kind, name, "");
        self.publish(&draft)
    }
}
