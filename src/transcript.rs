//! Canonical conversation state
//!
//! The transcript is append-only apart from replacing its last entry. It is
//! owned by a single task per session (see [`store`]) and projected to UI
//! entries on resume (see [`rehydrate`]).

mod message;
mod rehydrate;
mod store;

pub use message::{AiState, Message, Role, RENDERED_FUNCTION_NAME};
pub use rehydrate::ui_state_from_ai_state;
pub use store::{AiStateHandle, CommitHook, MutableAiState, StateError, TITLE_MAX_CHARS};
