//! Streamed values and render nodes
//!
//! A producer owns each stream and seals it exactly once; any number of
//! readers observe it live or after the fact. Producers can also mirror their
//! changes onto a session-wide [`UiSink`] that feeds connected clients.

mod display;
mod ui;
mod value;

pub use display::{Display, PurchaseStatus, TextContent};
pub use ui::{StreamableUi, UiEntry, UiReader};
pub use value::{Phase, SealError, StreamableValue, Streamed, ValueReader};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcast channel every producer of a session publishes to
pub type UiSink = broadcast::Sender<UiEvent>;

/// What a stream carries, so clients know how to apply a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Value,
    Node,
}

/// Change notification sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Full current value of a stream
    Snapshot {
        id: String,
        kind: StreamKind,
        value: Value,
        phase: Phase,
    },
    /// Text appended to a value stream
    Delta { id: String, delta: String },
}
