//! Mock implementations for testing
//!
//! These mocks enable integration testing of sessions without real I/O.

use super::session::{Session, SessionConfig};
use super::traits::*;
use crate::db::{Chat, ChatSummary};
use crate::llm::{Fragment, FragmentStream, LlmError, LlmRequest, LlmService};
use crate::transcript::AiState;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Mock LLM
// ============================================================================

enum Script {
    /// Opening the stream fails
    Refuse(LlmError),
    /// Stream yields these items, then ends
    Items(Vec<Result<Fragment, LlmError>>),
    /// Stream yields these fragments, then never ends
    Stall(Vec<Fragment>),
}

/// Mock LLM that plays back queued fragment scripts, one per request
pub struct MockLlm {
    scripts: Mutex<VecDeque<Script>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a stream that emits `fragments` and ends cleanly
    pub fn queue_fragments(&self, fragments: Vec<Fragment>) {
        self.push(Script::Items(fragments.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that emits `fragments` and then breaks
    pub fn queue_broken(&self, fragments: Vec<Fragment>, error: LlmError) {
        let mut items: Vec<_> = fragments.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.push(Script::Items(items));
    }

    /// Queue a request that fails before streaming
    pub fn queue_refusal(&self, error: LlmError) {
        self.push(Script::Refuse(error));
    }

    /// Queue a stream that never finishes
    pub fn queue_stall(&self, fragments: Vec<Fragment>) {
        self.push(Script::Stall(fragments));
    }

    /// Queue a plain text reply, delivered in one delta per word
    pub fn queue_text(&self, text: &str) {
        let mut fragments: Vec<_> = text
            .split_inclusive(' ')
            .map(|word| Fragment::TextDelta(word.to_string()))
            .collect();
        fragments.push(Fragment::TextDone(text.to_string()));
        self.queue_fragments(fragments);
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlm {
    async fn stream(&self, request: &LlmRequest) -> Result<FragmentStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Refuse(LlmError::network("No mock script queued")));

        match script {
            Script::Refuse(error) => Err(error),
            Script::Items(items) => Ok(futures::stream::iter(items).boxed()),
            Script::Stall(fragments) => Ok(futures::stream::iter(fragments.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
        }
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Chat stores
// ============================================================================

/// In-memory chat store with the same owner rules as the database
#[derive(Default)]
pub struct InMemoryChatStore {
    chats: Mutex<HashMap<String, Chat>>,
    saves: AtomicUsize,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn get(&self, id: &str) -> Option<Chat> {
        self.chats.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn save_chat(&self, chat: &Chat) -> Result<(), PersistenceFailure> {
        let mut chats = self.chats.lock().unwrap();
        let mut chat = chat.clone();
        if let Some(existing) = chats.get(&chat.id) {
            if existing.user_id != chat.user_id {
                return Err(PersistenceFailure("owner mismatch".to_string()));
            }
            chat.created_at = existing.created_at;
        }
        chats.insert(chat.id.clone(), chat);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>, PersistenceFailure> {
        Ok(self
            .chats
            .lock()
            .unwrap()
            .get(id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceFailure> {
        Ok(self
            .chats
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.user_id == user_id)
            .map(|c| ChatSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                path: c.path.clone(),
                created_at: c.created_at,
                updated_at: c.created_at,
                message_count: c.messages.len(),
            })
            .collect())
    }
}

/// Store whose every call fails
pub struct FailingChatStore;

#[async_trait]
impl ChatStore for FailingChatStore {
    async fn save_chat(&self, _chat: &Chat) -> Result<(), PersistenceFailure> {
        Err(PersistenceFailure("disk full".to_string()))
    }

    async fn get_chat(&self, _id: &str, _user_id: &str) -> Result<Option<Chat>, PersistenceFailure> {
        Err(PersistenceFailure("disk full".to_string()))
    }

    async fn list_chats(&self, _user_id: &str) -> Result<Vec<ChatSummary>, PersistenceFailure> {
        Err(PersistenceFailure("disk full".to_string()))
    }
}

// ============================================================================
// Test builder
// ============================================================================

/// Fast timings for tests
pub fn test_config() -> SessionConfig {
    SessionConfig {
        tool_settle_delay: Duration::ZERO,
        purchase_step: Duration::from_millis(5),
        shutdown_grace: Duration::from_millis(200),
        ..SessionConfig::default()
    }
}

pub struct TestSession {
    pub session: Session,
    pub llm: Arc<MockLlm>,
    pub store: Arc<InMemoryChatStore>,
}

impl TestSession {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        let llm = Arc::new(MockLlm::new());
        let session = Session::new(
            AiState::fresh(),
            llm.clone(),
            store.clone(),
            test_config(),
        );
        Self {
            session,
            llm,
            store,
        }
    }
}

/// Poll the committed snapshot until `pred` holds
pub async fn wait_for_commit(session: &Session, pred: impl Fn(&AiState) -> bool) -> Arc<AiState> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let committed = session.last_committed();
            if pred(&committed) {
                return committed;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for commit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, ToolCall};
    use crate::runtime::{SessionError, SessionManager, TurnError};
    use crate::stream::{Display, Phase, PurchaseStatus};
    use crate::system_prompt::SYSTEM_PROMPT;
    use crate::tools::{PurchaseRecord, ToolError, PURCHASE_ENTRY_NAME};
    use crate::transcript::{Message, Role};
    use serde_json::{json, Value};

    fn user() -> Arc<dyn Authenticator> {
        Arc::new(FixedUser::new("u1"))
    }

    fn guest() -> Arc<dyn Authenticator> {
        Arc::new(Anonymous)
    }

    fn tool_call(name: &str, arguments: Value) -> Fragment {
        Fragment::ToolCall(ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            arguments,
        })
    }

    fn purchase_records(state: &AiState) -> Vec<PurchaseRecord> {
        state
            .messages
            .iter()
            .filter(|m| m.is_function_named(PURCHASE_ENTRY_NAME))
            .map(|m| serde_json::from_str(&m.content).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_text_deltas_accumulate_into_assistant_entry() {
        let t = TestSession::new();
        t.llm.queue_fragments(vec![
            Fragment::TextDelta("Hel".to_string()),
            Fragment::TextDelta("lo".to_string()),
            Fragment::TextDone("Hello".to_string()),
        ]);

        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        let mut display = turn.entry.display.clone();
        let report = turn.finished().await.unwrap();

        assert_eq!(report.text.as_deref(), Some("Hello"));
        let committed = t.session.last_committed();
        assert_eq!(committed.messages.len(), 2);
        assert_eq!(committed.messages[1].role, Role::Assistant);
        assert_eq!(committed.messages[1].content, "Hello");

        let settled = display.settled_value().await;
        assert_eq!(settled.phase, Phase::Done);
        assert_eq!(settled.value, Display::bot_text("Hello"));
    }

    #[tokio::test]
    async fn test_user_entries_match_turns() {
        let t = TestSession::new();
        for i in 0..3 {
            t.llm.queue_text(&format!("reply {i}"));
            let turn = t
                .session
                .submit_user_message(format!("message {i}"), user())
                .await
                .unwrap();
            turn.finished().await.unwrap();
        }

        let committed = t.session.last_committed();
        assert_eq!(committed.count_role(Role::User), 3);
        assert_eq!(committed.count_role(Role::Assistant), 3);
    }

    #[tokio::test]
    async fn test_request_carries_directive_transcript_and_tools() {
        let t = TestSession::new();
        t.llm.queue_text("ok");
        let turn = t.session.submit_user_message("my ear hurts", user()).await.unwrap();
        turn.finished().await.unwrap();

        let requests = t.llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, SYSTEM_PROMPT);
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].content, "my ear hurts");
        let tools: Vec<_> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tools, vec!["report", "show_stock_purchase"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_degrades_turn() {
        let t = TestSession::new();
        t.llm.queue_fragments(vec![tool_call("get_weather", json!({}))]);

        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        let display = turn.entry.display.clone();
        let report = turn.finished().await.unwrap();

        assert!(matches!(
            report.tool_errors.as_slice(),
            [ToolError::UnknownTool { name }] if name == "get_weather"
        ));
        assert!(display.current().is_error());
        assert_eq!(t.session.last_committed().count_role(Role::Function), 0);

        // The session keeps going
        t.llm.queue_text("still here");
        let turn = t.session.submit_user_message("hello?", user()).await.unwrap();
        assert!(turn.finished().await.is_ok());
        assert_eq!(t.session.last_committed().count_role(Role::User), 2);
    }

    #[tokio::test]
    async fn test_invalid_tool_arguments_append_nothing() {
        let t = TestSession::new();
        t.llm.queue_fragments(vec![
            Fragment::TextDone("Please visit pediatrics.".to_string()),
            tool_call("report", json!({"summary": ""})),
        ]);

        let turn = t.session.submit_user_message("my child coughs", user()).await.unwrap();
        let display = turn.entry.display.clone();
        let report = turn.finished().await.unwrap();

        assert!(matches!(
            report.tool_errors.as_slice(),
            [ToolError::InvalidArguments { tool: "report", .. }]
        ));
        // Text was already shown, the node keeps it
        assert_eq!(display.current(), Display::bot_text("Please visit pediatrics."));
        assert_eq!(t.session.last_committed().count_role(Role::Function), 0);
    }

    #[tokio::test]
    async fn test_report_tool_records_rendered_summary() {
        let t = TestSession::new();
        t.llm.queue_fragments(vec![
            Fragment::TextDelta("Please visit ".to_string()),
            Fragment::TextDone("Please visit cardiology.".to_string()),
            tool_call("report", json!({"summary": "chest pain on exertion, 58 years old"})),
        ]);

        let turn = t.session.submit_user_message("chest hurts", user()).await.unwrap();
        let mut display = turn.entry.display.clone();
        let report = turn.finished().await.unwrap();
        assert_eq!(report.tool_calls, 1);
        assert!(report.tool_errors.is_empty());

        // The recommendation stays visible, the card gets its own node
        assert_eq!(
            display.settled_value().await.value,
            Display::bot_text("Please visit cardiology.")
        );
        assert_eq!(report.extra_entries.len(), 1);
        let mut card = report.extra_entries[0].display.clone();
        assert_eq!(
            card.settled_value().await.value,
            Display::BotCard {
                body: "chest pain on exertion, 58 years old".to_string()
            }
        );

        let committed = wait_for_commit(&t.session, |s| s.messages.len() == 3).await;
        let roles: Vec<_> = committed.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Function]);
        assert!(committed.messages[2].is_function_named("render"));
    }

    #[tokio::test]
    async fn test_second_tool_call_gets_its_own_node() {
        let t = TestSession::new();
        t.llm.queue_fragments(vec![
            tool_call("report", json!({"summary": "first"})),
            tool_call("report", json!({"summary": "second"})),
        ]);

        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        let report = turn.finished().await.unwrap();
        assert_eq!(report.tool_calls, 2);
        assert_eq!(report.extra_entries.len(), 1);

        let mut extra = report.extra_entries[0].display.clone();
        assert_eq!(
            extra.settled_value().await.value,
            Display::BotCard {
                body: "second".to_string()
            }
        );
        wait_for_commit(&t.session, |s| s.count_role(Role::Function) == 2).await;
    }

    #[tokio::test]
    async fn test_stream_termination_seals_with_error_and_skips_commit() {
        let t = TestSession::new();
        t.llm.queue_broken(
            vec![Fragment::TextDelta("Hel".to_string())],
            LlmError::stream("connection reset"),
        );

        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        let display = turn.entry.display.clone();
        let err = turn.finished().await.unwrap_err();

        assert!(matches!(
            err,
            TurnError::StreamTerminated(ref e) if e.kind == LlmErrorKind::Stream
        ));
        assert!(display.current().is_error());
        assert!(display.is_sealed());
        assert!(t.session.last_committed().messages.is_empty());
    }

    #[tokio::test]
    async fn test_refused_request_fails_turn() {
        let t = TestSession::new();
        t.llm.queue_refusal(LlmError::network("unreachable"));

        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        let display = turn.entry.display.clone();
        assert!(matches!(
            turn.finished().await,
            Err(TurnError::StreamTerminated(_))
        ));
        assert!(display.current().is_error());
    }

    #[tokio::test]
    async fn test_concurrent_turn_is_rejected_and_shutdown_cancels() {
        let t = TestSession::new();
        t.llm.queue_stall(vec![Fragment::TextDelta("thinking".to_string())]);

        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        let display = turn.entry.display.clone();
        assert!(matches!(
            t.session.submit_user_message("again", user()).await,
            Err(SessionError::Busy)
        ));

        t.session.shutdown().await;
        assert!(matches!(turn.finished().await, Err(TurnError::Cancelled)));
        assert!(display.current().is_error());
        assert!(matches!(
            t.session.submit_user_message("late", user()).await,
            Err(SessionError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_confirm_purchase_records_outcome() {
        let t = TestSession::new();
        let receipt = t
            .session
            .confirm_purchase("ACME", 10.0, 5, user())
            .await
            .unwrap();

        let mut purchasing = receipt.purchasing_ui.clone();
        assert!(matches!(purchasing.current(), Display::Progress { .. }));
        assert_eq!(
            purchasing.settled_value().await.value,
            Display::Text {
                text: "You have successfully purchased 5 $ACME. Total cost: $50.00".to_string()
            }
        );
        let mut system = receipt.new_message.display.clone();
        assert_eq!(
            system.settled_value().await.value,
            Display::SystemMessage {
                text: "You have purchased 5 shares of ACME at $10. Total cost = $50.00.".to_string()
            }
        );

        let committed = wait_for_commit(&t.session, |s| s.count_role(Role::System) == 1).await;
        let records = purchase_records(&committed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PurchaseStatus::Completed);
        assert_eq!(records[0].total, Some(50.0));
        assert_eq!(committed.count_role(Role::Function), 1);
        let narration = committed.messages.last().unwrap();
        assert_eq!(
            narration.content,
            "[User has purchased 5 shares of ACME at 10. Total cost = 50]"
        );
    }

    #[tokio::test]
    async fn test_confirm_purchase_resolves_pending_placeholder() {
        let t = TestSession::new();
        t.llm.queue_fragments(vec![tool_call(
            "show_stock_purchase",
            json!({"symbol": "ACME", "price": 10, "numberOfShares": 5}),
        )]);
        let turn = t.session.submit_user_message("buy acme", user()).await.unwrap();
        turn.finished().await.unwrap();
        let committed = wait_for_commit(&t.session, |s| !purchase_records(s).is_empty()).await;
        assert_eq!(purchase_records(&committed)[0].status, PurchaseStatus::RequiresAction);

        t.session
            .confirm_purchase("ACME", 10.0, 5, user())
            .await
            .unwrap();
        let committed = wait_for_commit(&t.session, |s| s.count_role(Role::System) == 1).await;

        let records = purchase_records(&committed);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PurchaseStatus::Completed);
    }

    #[tokio::test]
    async fn test_confirm_purchase_validates_order() {
        let t = TestSession::new();
        assert!(matches!(
            t.session.confirm_purchase("ACME", -1.0, 5, user()).await,
            Err(SessionError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_guest_commit_is_not_persisted() {
        let t = TestSession::new();
        t.llm.queue_text("hello guest");
        let turn = t.session.submit_user_message("hi", guest()).await.unwrap();
        turn.finished().await.unwrap();
        t.session.shutdown().await;

        assert_eq!(t.store.save_count(), 0);
        assert_eq!(t.session.last_committed().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_authorized_commit_is_persisted() {
        let t = TestSession::new();
        t.llm.queue_text("hello");
        let turn = t
            .session
            .submit_user_message("I have had a headache for three days", user())
            .await
            .unwrap();
        turn.finished().await.unwrap();
        t.session.shutdown().await;

        let chat = t.store.get(t.session.chat_id()).unwrap();
        assert_eq!(chat.title, "I have had a headache for three days");
        assert_eq!(chat.user_id, "u1");
        assert_eq!(chat.path, format!("/chat/{}", t.session.chat_id()));
        assert_eq!(chat.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_fail_turn() {
        let llm = Arc::new(MockLlm::new());
        let session = Session::new(
            AiState::fresh(),
            llm.clone(),
            Arc::new(FailingChatStore),
            test_config(),
        );
        llm.queue_text("hello");

        let turn = session.submit_user_message("hi", user()).await.unwrap();
        assert!(turn.finished().await.is_ok());
        session.shutdown().await;
        assert_eq!(session.last_committed().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_ui_state_requires_session() {
        let t = TestSession::new();
        assert!(t.session.ui_state(&Anonymous).await.unwrap().is_none());

        t.llm.queue_text("hello");
        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        turn.finished().await.unwrap();

        let ui = t
            .session
            .ui_state(&FixedUser::new("u1"))
            .await
            .unwrap()
            .unwrap();
        let displays: Vec<_> = ui.iter().map(|e| e.display.current()).collect();
        assert_eq!(
            displays,
            vec![
                Display::UserMessage {
                    text: "hi".to_string()
                },
                Display::bot_text("hello"),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_signed_in_writer_owns_live_chat() {
        let t = TestSession::new();
        t.llm.queue_text("hello");
        let turn = t.session.submit_user_message("hi", user()).await.unwrap();
        turn.finished().await.unwrap();
        assert_eq!(t.session.owner(), Some("u1"));

        let intruder = FixedUser::new("u2");
        assert!(matches!(
            t.session.ui_state(&intruder).await,
            Err(SessionError::NotOwner)
        ));
        assert!(matches!(
            t.session.ui_state(&Anonymous).await,
            Err(SessionError::NotOwner)
        ));
        assert!(matches!(
            t.session.subscribe(&intruder).await,
            Err(SessionError::NotOwner)
        ));
        assert!(matches!(
            t.session
                .submit_user_message("show me", Arc::new(FixedUser::new("u2")))
                .await,
            Err(SessionError::NotOwner)
        ));
        assert!(matches!(
            t.session.submit_user_message("show me", guest()).await,
            Err(SessionError::NotOwner)
        ));
        assert!(matches!(
            t.session
                .confirm_purchase("ACME", 10.0, 5, Arc::new(FixedUser::new("u2")))
                .await,
            Err(SessionError::NotOwner)
        ));
        assert_eq!(t.session.last_committed().messages.len(), 2);

        assert!(t.session.subscribe(&FixedUser::new("u1")).await.is_ok());
        t.llm.queue_text("still here");
        let turn = t.session.submit_user_message("again", user()).await.unwrap();
        turn.finished().await.unwrap();
        t.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_manager_hides_live_chat_from_other_users() {
        let llm = Arc::new(MockLlm::new());
        let manager = SessionManager::new(
            Arc::new(InMemoryChatStore::new()),
            llm.clone(),
            test_config(),
        );
        let session = manager.create().await;
        let id = session.chat_id().to_string();

        // Unowned chats are open to guests and signed-in users alike
        assert!(manager.resume(&id, &Anonymous).await.unwrap().is_some());
        assert!(manager
            .resume(&id, &FixedUser::new("u2"))
            .await
            .unwrap()
            .is_some());

        llm.queue_text("hello");
        let turn = session.submit_user_message("hi", user()).await.unwrap();
        turn.finished().await.unwrap();

        assert!(manager
            .resume(&id, &FixedUser::new("u2"))
            .await
            .unwrap()
            .is_none());
        assert!(manager.resume(&id, &Anonymous).await.unwrap().is_none());
        assert!(manager
            .resume(&id, &FixedUser::new("u1"))
            .await
            .unwrap()
            .is_some());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_evict_idle_drops_only_unused_sessions() {
        let llm = Arc::new(MockLlm::new());
        let manager = SessionManager::new(
            Arc::new(InMemoryChatStore::new()),
            llm.clone(),
            test_config(),
        );
        let unused = manager.create().await;
        let watched = manager.create().await;
        let busy = manager.create().await;

        let _events = watched.subscribe(&Anonymous).await.unwrap();
        llm.queue_stall(vec![]);
        let turn = busy.submit_user_message("hi", guest()).await.unwrap();

        assert_eq!(manager.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(manager.evict_idle(Duration::ZERO).await, 1);
        assert!(manager.get(unused.chat_id()).await.is_none());
        assert!(manager.get(watched.chat_id()).await.is_some());
        assert!(manager.get(busy.chat_id()).await.is_some());
        assert!(matches!(
            unused.submit_user_message("late", guest()).await,
            Err(SessionError::ShuttingDown)
        ));

        manager.shutdown().await;
        assert!(matches!(turn.finished().await, Err(TurnError::Cancelled)));
    }

    #[tokio::test]
    async fn test_manager_resumes_only_for_owner() {
        let store = Arc::new(InMemoryChatStore::new());
        let state = AiState::with_messages(
            "persisted",
            vec![Message::user("rash"), Message::assistant("where?")],
        );
        store
            .save_chat(&Chat::from_state(&state, "u1", chrono::Utc::now()))
            .await
            .unwrap();
        let manager = SessionManager::new(store, Arc::new(MockLlm::new()), test_config());

        assert!(manager
            .resume("persisted", &FixedUser::new("u2"))
            .await
            .unwrap()
            .is_none());
        assert!(manager.resume("persisted", &Anonymous).await.unwrap().is_none());

        let session = manager
            .resume("persisted", &FixedUser::new("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.last_committed().messages.len(), 2);
        assert_eq!(session.owner(), Some("u1"));
        assert!(manager.get("persisted").await.is_some());
        assert!(manager
            .resume("persisted", &FixedUser::new("u2"))
            .await
            .unwrap()
            .is_none());

        let fresh = manager.create().await;
        assert_ne!(fresh.chat_id(), "persisted");
        assert_eq!(
            manager.list(&FixedUser::new("u1")).await.unwrap().unwrap().len(),
            1
        );
        assert!(manager.list(&Anonymous).await.unwrap().is_none());
        manager.shutdown().await;
        assert!(manager.get("persisted").await.is_none());
    }
}
