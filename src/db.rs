//! Chat persistence
//!
//! One row per chat, holding the committed transcript as JSON.

mod schema;

pub use schema::{chat_path, Chat, ChatSummary};
use schema::SCHEMA;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Transcript encoding error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Chat {chat_id} belongs to another user")]
    OwnerMismatch { chat_id: String },
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    /// Insert or update a chat. An existing chat keeps its first `created_at`
    /// and can only be overwritten by its owner.
    pub fn save_chat(&self, chat: &Chat) -> DbResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT user_id FROM chats WHERE id = ?1",
                params![chat.id],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_some_and(|owner| owner != chat.user_id) {
            return Err(DbError::OwnerMismatch {
                chat_id: chat.id.clone(),
            });
        }

        let messages = serde_json::to_string(&chat.messages)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        tx.execute(
            "INSERT INTO chats (id, user_id, title, path, created_at, updated_at, messages)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                path = excluded.path,
                updated_at = excluded.updated_at,
                messages = excluded.messages",
            params![
                chat.id,
                chat.user_id,
                chat.title,
                chat.path,
                chat.created_at.to_rfc3339(),
                now,
                messages
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch a chat owned by `user_id`
    pub fn get_chat(&self, id: &str, user_id: &str) -> DbResult<Option<Chat>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, title, user_id, created_at, messages, path
                 FROM chats WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, title, user_id, created_at, messages, path)) = row else {
            return Ok(None);
        };
        Ok(Some(Chat {
            id,
            title,
            user_id,
            created_at: parse_datetime(&created_at),
            messages: serde_json::from_str(&messages)?,
            path,
        }))
    }

    /// Chats of one user, most recently updated first
    pub fn list_chats(&self, user_id: &str) -> DbResult<Vec<ChatSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, path, created_at, updated_at, json_array_length(messages)
             FROM chats WHERE user_id = ?1
             ORDER BY updated_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ChatSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                path: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
                updated_at: parse_datetime(&row.get::<_, String>(4)?),
                message_count: row.get(5)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
