//! One conversation session and its turn loop
//!
//! A turn appends the user entry, streams the model's reply into a render
//! node, hands tool calls to the dispatcher and commits the transcript once
//! the model is done. Everything a session starts runs on its task tracker,
//! so `shutdown` can wait for it and then cancel what is left.

use super::traits::{Authenticator, ChatStore, UserIdentity};
use super::TaskScope;
use crate::llm::{
    Fragment, LlmError, LlmMessage, LlmRequest, LlmService, DEFAULT_MODEL,
};
use crate::stream::{
    Display, SealError, StreamableUi, StreamableValue, UiEntry, UiEvent,
};
use crate::system_prompt::SYSTEM_PROMPT;
use crate::tools::{ToolError, ToolRegistry};
use crate::transcript::{
    ui_state_from_ai_state, AiState, AiStateHandle, CommitHook, Message, MutableAiState,
    StateError,
};
use futures::StreamExt;
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const SINK_CAPACITY: usize = 256;

/// Per-session tunables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub system_prompt: Arc<str>,
    pub max_tokens: Option<u32>,
    /// How long `report` shows its empty card before recording
    pub tool_settle_delay: Duration,
    /// Duration of each simulated purchase step
    pub purchase_step: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: Arc::from(SYSTEM_PROMPT),
            max_tokens: None,
            tool_settle_delay: Duration::from_secs(1),
            purchase_step: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a turn is already in progress")]
    Busy,
    #[error("session is shutting down")]
    ShuttingDown,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The caller is not the user who owns the chat
    #[error("chat not found")]
    NotOwner,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Persistence(#[from] super::traits::PersistenceFailure),
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model stream terminated: {0}")]
    StreamTerminated(#[source] LlmError),
    #[error("turn cancelled")]
    Cancelled,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Sealed(#[from] SealError),
    #[error("turn task failed: {0}")]
    Join(String),
}

/// What a finished turn did
#[derive(Debug, Default)]
pub struct TurnReport {
    /// Full assistant text, when the model produced any
    pub text: Option<String>,
    pub tool_calls: usize,
    /// Calls that were rejected before reaching a handler
    pub tool_errors: Vec<ToolError>,
    /// Nodes created after the turn's own node was handed to a tool
    pub extra_entries: Vec<UiEntry>,
}

/// Returned as soon as a turn starts
pub struct TurnHandle {
    /// The turn's render node, live while the model streams
    pub entry: UiEntry,
    join: JoinHandle<Result<TurnReport, TurnError>>,
}

impl TurnHandle {
    pub async fn finished(self) -> Result<TurnReport, TurnError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TurnError::Cancelled),
            Err(e) => Err(TurnError::Join(e.to_string())),
        }
    }
}

pub struct Session {
    chat_id: String,
    config: SessionConfig,
    llm: Arc<dyn LlmService>,
    tools: ToolRegistry,
    pub(super) state: AiStateHandle,
    pub(super) scope: TaskScope,
    turn_gate: Arc<Mutex<()>>,
    /// Signed-in user the chat belongs to, set once
    owner: OnceLock<String>,
    last_active: StdMutex<Instant>,
}

impl Session {
    /// Start a session over `initial`, which counts as already committed
    pub fn new(
        initial: AiState,
        llm: Arc<dyn LlmService>,
        store: Arc<dyn ChatStore>,
        config: SessionConfig,
    ) -> Self {
        let (sink, _) = broadcast::channel(SINK_CAPACITY);
        let scope = TaskScope {
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
            sink,
        };
        let chat_id = initial.chat_id.clone();
        let state = AiStateHandle::spawn(initial, CommitHook::new(store, scope.tasks.clone()));

        Self {
            chat_id,
            tools: ToolRegistry::standard(config.tool_settle_delay),
            config,
            llm,
            state,
            scope,
            turn_gate: Arc::new(Mutex::new(())),
            owner: OnceLock::new(),
            last_active: StdMutex::new(Instant::now()),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub(super) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.get().map(String::as_str)
    }

    /// Bind the chat to `user_id` unless it already has an owner. Returns
    /// whether `user_id` owns it afterwards.
    pub(super) fn claim(&self, user_id: &str) -> bool {
        self.owner.get_or_init(|| user_id.to_string()) == user_id
    }

    /// Resolve the caller and check they may see this chat: anyone while it
    /// has no owner, afterwards only the owner.
    pub(super) async fn authorize(
        &self,
        auth: &dyn Authenticator,
    ) -> Result<Option<UserIdentity>, SessionError> {
        let user = auth.authenticate().await;
        if let Some(owner) = self.owner.get() {
            if user.as_ref().map(|u| u.id.as_str()) != Some(owner.as_str()) {
                tracing::warn!(
                    chat_id = %self.chat_id,
                    caller = ?user.as_ref().map(|u| &u.id),
                    "Chat access denied to non-owner"
                );
                return Err(SessionError::NotOwner);
            }
        }
        self.touch();
        Ok(user)
    }

    /// Like [`Session::authorize`], and a signed-in writer claims an unowned chat
    pub(super) async fn authorize_writer(
        &self,
        auth: &dyn Authenticator,
    ) -> Result<(), SessionError> {
        if let Some(user) = self.authorize(auth).await? {
            if !self.claim(&user.id) {
                return Err(SessionError::NotOwner);
            }
        }
        Ok(())
    }

    fn touch(&self) {
        *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// No running work, no live subscribers and no access for `max_idle`
    pub(super) fn is_idle(&self, max_idle: Duration) -> bool {
        let last_active = *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.scope.tasks.is_empty()
            && self.scope.sink.receiver_count() == 0
            && last_active.elapsed() >= max_idle
    }

    /// Live change notifications for every node and value of this session
    pub async fn subscribe(
        &self,
        auth: &dyn Authenticator,
    ) -> Result<broadcast::Receiver<UiEvent>, SessionError> {
        self.authorize(auth).await?;
        Ok(self.scope.sink.subscribe())
    }

    pub fn last_committed(&self) -> Arc<AiState> {
        self.state.last_committed()
    }

    pub(super) fn ensure_running(&self) -> Result<(), SessionError> {
        if self.scope.tasks.is_closed() {
            return Err(SessionError::ShuttingDown);
        }
        Ok(())
    }

    /// Start a turn for `content`.
    ///
    /// The user entry is staged before this returns. The model reply streams
    /// into the returned entry; [`TurnHandle::finished`] resolves once the
    /// turn has committed or failed.
    pub async fn submit_user_message(
        &self,
        content: impl Into<String>,
        auth: Arc<dyn Authenticator>,
    ) -> Result<TurnHandle, SessionError> {
        self.ensure_running()?;
        self.authorize_writer(auth.as_ref()).await?;
        let gate = Arc::clone(&self.turn_gate)
            .try_lock_owned()
            .map_err(|_| SessionError::Busy)?;

        let lease = self.state.lease(auth);
        lease.append(Message::user(content)).await?;

        let root = StreamableUi::new(Display::Spinner, Some(self.scope.sink.clone()));
        let entry = UiEntry::new(root.reader());
        tracing::info!(chat_id = %self.chat_id, entry_id = %entry.id, "Turn started");

        let turn = Turn {
            chat_id: self.chat_id.clone(),
            config: self.config.clone(),
            llm: Arc::clone(&self.llm),
            tools: self.tools.clone(),
            scope: self.scope.clone(),
            _gate: gate,
        };
        let join = self.scope.tasks.spawn(turn.run(root, lease));

        Ok(TurnHandle { entry, join })
    }

    /// Rehydrated projection of the last commit. `None` for guests, an error
    /// for anyone but the owner.
    pub async fn ui_state(
        &self,
        auth: &dyn Authenticator,
    ) -> Result<Option<Vec<UiEntry>>, SessionError> {
        let user = self.authorize(auth).await?;
        Ok(user.map(|_| ui_state_from_ai_state(&self.state.last_committed())))
    }

    /// Stop accepting work, give running tasks a grace period, then cancel them
    pub async fn shutdown(&self) {
        self.scope.tasks.close();
        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, self.scope.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                chat_id = %self.chat_id,
                pending = self.scope.tasks.len(),
                "Grace period elapsed, cancelling session tasks"
            );
            self.scope.cancel.cancel();
            self.scope.tasks.wait().await;
        }
        tracing::info!(chat_id = %self.chat_id, "Session shut down");
    }
}

/// Everything one turn task needs, detached from the session borrow
struct Turn {
    chat_id: String,
    config: SessionConfig,
    llm: Arc<dyn LlmService>,
    tools: ToolRegistry,
    scope: TaskScope,
    _gate: OwnedMutexGuard<()>,
}

/// Mutable state of a turn in flight
struct TurnProgress {
    root: Option<StreamableUi>,
    text: Option<StreamableValue<String>>,
    report: TurnReport,
}

impl Turn {
    async fn run(
        self,
        root: StreamableUi,
        mut lease: MutableAiState,
    ) -> Result<TurnReport, TurnError> {
        let mut progress = TurnProgress {
            root: Some(root),
            text: None,
            report: TurnReport::default(),
        };

        let outcome = tokio::select! {
            biased;
            () = self.scope.cancel.cancelled() => Err(TurnError::Cancelled),
            result = self.stream_reply(&mut progress, &lease) => result,
        };

        match outcome {
            Ok(()) => {
                self.finish(&mut progress)?;
                lease.done().await?;
                tracing::info!(
                    chat_id = %self.chat_id,
                    tool_calls = progress.report.tool_calls,
                    tool_errors = progress.report.tool_errors.len(),
                    "Turn committed"
                );
                Ok(progress.report)
            }
            Err(e) => {
                tracing::warn!(chat_id = %self.chat_id, error = %e, "Turn failed, not committing");
                Self::abandon(&mut progress, &e);
                Err(e)
            }
        }
    }

    async fn stream_reply(
        &self,
        progress: &mut TurnProgress,
        lease: &MutableAiState,
    ) -> Result<(), TurnError> {
        let staging = lease.get().await?;
        let request = LlmRequest {
            model: self.config.model.clone(),
            system: self.config.system_prompt.to_string(),
            messages: staging
                .messages
                .iter()
                .map(|m| LlmMessage {
                    role: m.role,
                    content: m.content.clone(),
                    name: m.name.clone(),
                })
                .collect(),
            tools: self.tools.definitions(),
            max_tokens: self.config.max_tokens,
        };

        let mut fragments = self
            .llm
            .stream(&request)
            .await
            .map_err(TurnError::StreamTerminated)?;

        while let Some(fragment) = fragments.next().await {
            match fragment.map_err(TurnError::StreamTerminated)? {
                Fragment::TextDelta(delta) => {
                    self.text_value(progress).append(&delta)?;
                }
                Fragment::TextDone(full) => {
                    self.text_value(progress).done(Some(full.clone()))?;
                    lease.append(Message::assistant(full.clone())).await?;
                    progress.report.text = Some(full);
                }
                Fragment::ToolCall(call) => {
                    progress.report.tool_calls += 1;
                    let had_root = progress.root.is_some();
                    match self
                        .tools
                        .dispatch(&call, &mut progress.root, lease.fork(), &self.scope)
                    {
                        Ok(reader) => {
                            let took_root = had_root && progress.root.is_none();
                            if !took_root {
                                progress.report.extra_entries.push(UiEntry::new(reader));
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                chat_id = %self.chat_id,
                                tool = %call.name,
                                error = %e,
                                "Tool call rejected"
                            );
                            progress.report.tool_errors.push(e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The turn's text value, created on first use and shown in a bot message
    fn text_value<'a>(&self, progress: &'a mut TurnProgress) -> &'a mut StreamableValue<String> {
        progress.text.get_or_insert_with(|| {
            let value = StreamableValue::new(String::new(), Some(self.scope.sink.clone()));
            let display = Display::bot_stream(value.reader());
            match progress.root.as_mut() {
                Some(root) => {
                    if let Err(e) = root.update(display) {
                        tracing::error!(error = %e, "Turn node rejected text display");
                    }
                }
                None => {
                    // A tool already took the turn's node
                    let node = StreamableUi::new(display, Some(self.scope.sink.clone()));
                    progress.report.extra_entries.push(UiEntry::new(node.reader()));
                    progress.root = Some(node);
                }
            }
            value
        })
    }

    /// Seal whatever the turn still owns after a clean end of stream
    fn finish(&self, progress: &mut TurnProgress) -> Result<(), TurnError> {
        if let Some(text) = progress.text.as_mut().filter(|t| !t.is_sealed()) {
            // Stream closed without a completion signal, keep what arrived
            text.done(None)?;
        }

        if let Some(mut root) = progress.root.take() {
            let display = match root.current() {
                Display::Spinner if !progress.report.tool_errors.is_empty() => {
                    Display::error("The assistant could not complete this request.")
                }
                Display::Spinner => Display::Empty,
                shown => shown,
            };
            root.done(display)?;
        }
        tracing::debug!(chat_id = %self.chat_id, "Turn nodes sealed");
        Ok(())
    }

    fn abandon(progress: &mut TurnProgress, error: &TurnError) {
        if let Some(text) = progress.text.as_mut().filter(|t| !t.is_sealed()) {
            let _ = text.fail(error.to_string());
        }
        if let Some(mut root) = progress.root.take() {
            if !root.is_sealed() {
                let _ = root.fail(format!("Something went wrong: {error}"));
            }
        }
    }
}
