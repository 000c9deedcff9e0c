//! Trait abstractions for the session's external collaborators
//!
//! Persistence and identity sit behind these traits so the orchestrator can
//! be tested with in-memory doubles.

use crate::db::{Chat, ChatSummary, Database};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Persistence call failed. Logged, never surfaced to a live turn.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("persistence failure: {0}")]
pub struct PersistenceFailure(pub String);

/// Durable storage for committed chats
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Write a committed snapshot, keyed by chat id
    async fn save_chat(&self, chat: &Chat) -> Result<(), PersistenceFailure>;

    /// Load a chat owned by `user_id`
    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, PersistenceFailure>;

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceFailure>;
}

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: String,
    pub name: Option<String>,
}

/// Session lookup. `None` means a guest: commits and resumes become no-ops.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self) -> Option<UserIdentity>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatStore + ?Sized> ChatStore for Arc<T> {
    async fn save_chat(&self, chat: &Chat) -> Result<(), PersistenceFailure> {
        (**self).save_chat(chat).await
    }

    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, PersistenceFailure> {
        (**self).get_chat(id, user_id).await
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceFailure> {
        (**self).list_chats(user_id).await
    }
}

#[async_trait]
impl<T: Authenticator + ?Sized> Authenticator for Arc<T> {
    async fn authenticate(&self) -> Option<UserIdentity> {
        (**self).authenticate().await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as ChatStore
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatStore for DatabaseStorage {
    async fn save_chat(&self, chat: &Chat) -> Result<(), PersistenceFailure> {
        self.db
            .save_chat(chat)
            .map_err(|e| PersistenceFailure(e.to_string()))
    }

    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, PersistenceFailure> {
        self.db
            .get_chat(id, user_id)
            .map_err(|e| PersistenceFailure(e.to_string()))
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceFailure> {
        self.db
            .list_chats(user_id)
            .map_err(|e| PersistenceFailure(e.to_string()))
    }
}

/// No session
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl Authenticator for Anonymous {
    async fn authenticate(&self) -> Option<UserIdentity> {
        None
    }
}

/// A session that is already resolved, e.g. from request headers
#[derive(Debug, Clone)]
pub struct FixedUser(UserIdentity);

impl FixedUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self(UserIdentity {
            id: id.into(),
            name: None,
        })
    }

    pub fn from_identity(identity: UserIdentity) -> Self {
        Self(identity)
    }
}

#[async_trait]
impl Authenticator for FixedUser {
    async fn authenticate(&self) -> Option<UserIdentity> {
        Some(self.0.clone())
    }
}
