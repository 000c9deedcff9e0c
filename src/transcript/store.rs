//! Owner task for the canonical conversation state
//!
//! One task holds the staging transcript. Everyone else talks to it over a
//! command channel through a lease ([`MutableAiState`]). Committing a lease
//! publishes the staging value as the new committed snapshot and schedules
//! the persistence hook.

use super::message::{AiState, Message};
use crate::db::Chat;
use crate::runtime::traits::{Authenticator, ChatStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::task::TaskTracker;

const COMMAND_BUFFER: usize = 64;

/// Maximum title length, in characters
pub const TITLE_MAX_CHARS: usize = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state lease was already committed")]
    Sealed,
    #[error("staging update rejected: {0}")]
    Conflict(String),
    #[error("transcript is empty, nothing to replace")]
    Empty,
    #[error("state owner is gone")]
    Closed,
}

enum Command {
    Get {
        reply: oneshot::Sender<AiState>,
    },
    Append {
        message: Message,
        reply: oneshot::Sender<()>,
    },
    ReplaceLast {
        message: Message,
        reply: oneshot::Sender<Result<(), StateError>>,
    },
    Update {
        next: AiState,
        reply: oneshot::Sender<Result<(), StateError>>,
    },
    Commit {
        reply: oneshot::Sender<Arc<AiState>>,
    },
}

/// Check that `next` only appends one entry to, or replaces the last entry
/// of, `current`. Identical states are accepted too.
pub fn check_update(current: &AiState, next: &AiState) -> Result<(), StateError> {
    if current.chat_id != next.chat_id {
        return Err(StateError::Conflict(format!(
            "chat id changed from {} to {}",
            current.chat_id, next.chat_id
        )));
    }

    let (cur, nxt) = (&current.messages, &next.messages);
    let accepted = if nxt.len() == cur.len() + 1 {
        nxt.starts_with(cur)
    } else if nxt.len() == cur.len() {
        // Covers the unchanged case as well as replace-last
        cur.len() <= 1 || nxt[..cur.len() - 1] == cur[..cur.len() - 1]
    } else {
        false
    };

    if accepted {
        Ok(())
    } else {
        Err(StateError::Conflict(format!(
            "{} entries cannot become {} entries by one append or replace",
            cur.len(),
            nxt.len()
        )))
    }
}

struct Owner {
    staging: AiState,
    committed: watch::Sender<Arc<AiState>>,
}

impl Owner {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Get { reply } => {
                    let _ = reply.send(self.staging.clone());
                }
                Command::Append { message, reply } => {
                    self.staging.messages.push(message);
                    let _ = reply.send(());
                }
                Command::ReplaceLast { message, reply } => {
                    let result = match self.staging.messages.last_mut() {
                        Some(last) => {
                            *last = message;
                            Ok(())
                        }
                        None => Err(StateError::Empty),
                    };
                    let _ = reply.send(result);
                }
                Command::Update { next, reply } => {
                    let result = check_update(&self.staging, &next);
                    if result.is_ok() {
                        self.staging = next;
                    }
                    let _ = reply.send(result);
                }
                Command::Commit { reply } => {
                    let snapshot = Arc::new(self.staging.clone());
                    self.committed.send_replace(Arc::clone(&snapshot));
                    let _ = reply.send(snapshot);
                }
            }
        }
        tracing::debug!(chat_id = %self.staging.chat_id, "State owner stopped");
    }
}

/// Runs persistence after each commit on the session's task tracker
#[derive(Clone)]
pub struct CommitHook {
    store: Arc<dyn ChatStore>,
    tasks: TaskTracker,
}

impl CommitHook {
    pub fn new(store: Arc<dyn ChatStore>, tasks: TaskTracker) -> Self {
        Self { store, tasks }
    }

    fn schedule(&self, snapshot: Arc<AiState>, auth: Arc<dyn Authenticator>) {
        let store = Arc::clone(&self.store);
        self.tasks.spawn(async move {
            let Some(user) = auth.authenticate().await else {
                tracing::debug!(chat_id = %snapshot.chat_id, "No session, commit not persisted");
                return;
            };

            let chat = Chat::from_state(&snapshot, &user.id, chrono::Utc::now());
            match store.save_chat(&chat).await {
                Ok(()) => tracing::debug!(
                    chat_id = %chat.id,
                    messages = chat.messages.len(),
                    "Chat persisted"
                ),
                Err(e) => tracing::warn!(
                    chat_id = %chat.id,
                    error = %e,
                    "PersistenceFailure, commit kept in memory only"
                ),
            }
        });
    }
}

/// Handle to a session's state owner
#[derive(Clone)]
pub struct AiStateHandle {
    tx: mpsc::Sender<Command>,
    committed: watch::Receiver<Arc<AiState>>,
    hook: CommitHook,
}

impl AiStateHandle {
    /// Start the owner task. `initial` is treated as already committed.
    pub fn spawn(initial: AiState, hook: CommitHook) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (committed_tx, committed) = watch::channel(Arc::new(initial.clone()));
        let owner = Owner {
            staging: initial,
            committed: committed_tx,
        };
        // Not on the session tracker: it must outlive the tasks that use it
        tokio::spawn(owner.run(rx));
        Self {
            tx,
            committed,
            hook,
        }
    }

    /// A writer lease bound to the caller's identity
    pub fn lease(&self, auth: Arc<dyn Authenticator>) -> MutableAiState {
        MutableAiState {
            tx: self.tx.clone(),
            hook: self.hook.clone(),
            auth,
            sealed: false,
        }
    }

    pub fn last_committed(&self) -> Arc<AiState> {
        self.committed.borrow().clone()
    }
}

/// Writer lease over the staging transcript.
///
/// Committed at most once with [`MutableAiState::done`]. Tool handlers and
/// background actions get their own lease through [`MutableAiState::fork`].
pub struct MutableAiState {
    tx: mpsc::Sender<Command>,
    hook: CommitHook,
    auth: Arc<dyn Authenticator>,
    sealed: bool,
}

impl MutableAiState {
    /// Fresh lease on the same staging state, with the same identity
    pub fn fork(&self) -> MutableAiState {
        MutableAiState {
            tx: self.tx.clone(),
            hook: self.hook.clone(),
            auth: Arc::clone(&self.auth),
            sealed: false,
        }
    }

    /// Copy of the current staging state
    pub async fn get(&self) -> Result<AiState, StateError> {
        self.request(|reply| Command::Get { reply }).await
    }

    pub async fn append(&self, message: Message) -> Result<(), StateError> {
        self.ensure_open()?;
        self.request(|reply| Command::Append { message, reply })
            .await
    }

    pub async fn replace_last(&self, message: Message) -> Result<(), StateError> {
        self.ensure_open()?;
        self.request(|reply| Command::ReplaceLast { message, reply })
            .await?
    }

    /// Replace the staging state. Only appends and replace-last are allowed.
    pub async fn update(&self, next: AiState) -> Result<(), StateError> {
        self.ensure_open()?;
        self.request(|reply| Command::Update { next, reply }).await?
    }

    /// Commit the staging state and schedule persistence
    pub async fn done(&mut self) -> Result<Arc<AiState>, StateError> {
        self.ensure_open()?;
        self.sealed = true;
        let snapshot = self.request(|reply| Command::Commit { reply }).await?;
        tracing::debug!(
            chat_id = %snapshot.chat_id,
            messages = snapshot.messages.len(),
            "State committed"
        );
        self.hook
            .schedule(Arc::clone(&snapshot), Arc::clone(&self.auth));
        Ok(snapshot)
    }

    fn ensure_open(&self) -> Result<(), StateError> {
        if self.sealed {
            tracing::error!("Mutation attempted on a committed state lease");
            return Err(StateError::Sealed);
        }
        Ok(())
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, StateError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| StateError::Closed)?;
        rx.await.map_err(|_| StateError::Closed)
    }
}
