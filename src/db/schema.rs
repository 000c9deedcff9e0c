//! Database schema and types

use crate::transcript::{AiState, Message, TITLE_MAX_CHARS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    messages TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, updated_at DESC);
";

/// A persisted conversation snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub path: String,
}

impl Chat {
    /// Snapshot a committed state for its owner
    pub fn from_state(state: &AiState, user_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: state.chat_id.clone(),
            title: chat_title(state),
            user_id: user_id.to_string(),
            created_at,
            messages: state.messages.clone(),
            path: chat_path(&state.chat_id),
        }
    }

    pub fn to_state(&self) -> AiState {
        AiState::with_messages(self.id.clone(), self.messages.clone())
    }
}

/// First entry's content, cut to [`TITLE_MAX_CHARS`] characters
pub fn chat_title(state: &AiState) -> String {
    state
        .messages
        .first()
        .map(|m| m.content.chars().take(TITLE_MAX_CHARS).collect())
        .unwrap_or_default()
}

pub fn chat_path(chat_id: &str) -> String {
    format!("/chat/{chat_id}")
}

/// Listing row, without the transcript
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}
