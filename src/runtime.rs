//! Session runtime
//!
//! [`SessionManager`] owns the live sessions, keyed by chat id. Each
//! [`Session`] runs its turns, tool handlers and commit hooks inside a
//! [`TaskScope`] that lives as long as the session.

mod actions;
mod session;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use actions::PurchaseReceipt;
pub use session::{Session, SessionConfig, SessionError, TurnError, TurnHandle, TurnReport};
pub use traits::*;

use crate::db::ChatSummary;
use crate::llm::LlmService;
use crate::stream::UiSink;
use crate::transcript::AiState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Background work tied to one session's lifetime
#[derive(Clone)]
pub struct TaskScope {
    pub tasks: TaskTracker,
    pub cancel: CancellationToken,
    pub sink: UiSink,
}

/// Manager for all live sessions
pub struct SessionManager {
    store: Arc<dyn ChatStore>,
    llm: Arc<dyn LlmService>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ChatStore>, llm: Arc<dyn LlmService>, config: SessionConfig) -> Self {
        Self {
            store,
            llm,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a fresh session with a new chat id
    pub async fn create(&self) -> Arc<Session> {
        self.insert(AiState::fresh()).await
    }

    async fn insert(&self, state: AiState) -> Arc<Session> {
        let chat_id = state.chat_id.clone();
        let session = Arc::new(Session::new(
            state,
            Arc::clone(&self.llm),
            Arc::clone(&self.store),
            self.config.clone(),
        ));
        let mut sessions = self.sessions.write().await;
        // A concurrent resume may have won the race
        let session = sessions.entry(chat_id.clone()).or_insert(session);
        tracing::info!(chat_id = %chat_id, "Session registered");
        Arc::clone(session)
    }

    /// A session that is already live
    pub async fn get(&self, chat_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(chat_id).cloned()
    }

    /// A live session the caller may access, or a persisted chat of the
    /// signed-in caller brought back to life. Chats owned by someone else
    /// look the same as missing ones. Guests cannot resume persisted chats.
    pub async fn resume(
        &self,
        chat_id: &str,
        auth: &dyn Authenticator,
    ) -> Result<Option<Arc<Session>>, SessionError> {
        if let Some(session) = self.get(chat_id).await {
            return Self::accessible(session, auth).await;
        }
        let Some(user) = auth.authenticate().await else {
            return Ok(None);
        };
        let Some(chat) = self.store.get_chat(chat_id, &user.id).await? else {
            return Ok(None);
        };

        tracing::info!(chat_id, messages = chat.messages.len(), "Resuming persisted chat");
        let session = self.insert(chat.to_state()).await;
        session.claim(&user.id);
        Self::accessible(session, auth).await
    }

    async fn accessible(
        session: Arc<Session>,
        auth: &dyn Authenticator,
    ) -> Result<Option<Arc<Session>>, SessionError> {
        match session.authorize(auth).await {
            Ok(_) => Ok(Some(session)),
            Err(SessionError::NotOwner) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persisted chats of the signed-in caller, `None` for guests
    pub async fn list(&self, auth: &dyn Authenticator) -> Result<Option<Vec<ChatSummary>>, SessionError> {
        let Some(user) = auth.authenticate().await else {
            return Ok(None);
        };
        Ok(Some(self.store.list_chats(&user.id).await?))
    }

    /// Drop sessions nobody has touched for `max_idle` and that have no
    /// running work or subscribers. Persisted chats can be resumed later.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let evicted: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            let idle: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.is_idle(max_idle))
                .map(|(id, _)| id.clone())
                .collect();
            idle.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicting idle sessions");
            futures::future::join_all(evicted.iter().map(|s| s.shutdown())).await;
        }
        evicted.len()
    }

    /// Periodically evict idle sessions until the manager is dropped
    pub fn spawn_idle_sweeper(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        let period = (max_idle / 4).max(MIN_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.evict_idle(max_idle).await;
            }
        })
    }

    /// Shut down every live session
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        tracing::info!(count = sessions.len(), "Shutting down sessions");
        futures::future::join_all(sessions.iter().map(|s| s.shutdown())).await;
    }
}
