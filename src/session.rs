// src/session.rs

//! Explicit caller context passed to every engine call

use crate::store::ProviderType;
use uuid::Uuid;

/// Identity of an acting principal (avatar)
pub type ActorId = Uuid;

/// Who is acting, and which storage provider they want
#[derive(Debug, Clone)]
pub struct Session {
    pub actor: ActorId,
    pub actor_name: String,
    pub provider: ProviderType,
}

impl Session {
    pub fn new(actor: ActorId, actor_name: impl Into<String>) -> Self {
        Self {
            actor,
            actor_name: actor_name.into(),
            provider: ProviderType::Default,
        }
    }

    /// Use a specific provider instead of the configured default
    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = provider;
        self
    }
}
