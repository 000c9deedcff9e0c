//! Single-producer, many-reader values that are sealed exactly once

use super::{StreamKind, UiEvent, UiSink};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Lifecycle of a streamed value
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    Open,
    Done,
    Failed { reason: String },
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Phase::Open)
    }
}

/// What a reader observes: the current value and whether it can still change
#[derive(Debug, Clone, PartialEq)]
pub struct Streamed<T> {
    pub value: T,
    pub phase: Phase,
}

/// Raised when a producer is used after it was sealed.
///
/// A sealed stream receiving more data means a fragment was lost somewhere
/// upstream, so this is never swallowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealError {
    #[error("stream {id} is already sealed, rejected {operation}")]
    AlreadySealed { id: String, operation: &'static str },
}

/// Producer half of a streamed value.
///
/// Not `Clone`: there is exactly one writer. Readers are handed out with
/// [`StreamableValue::reader`] at any time, including after sealing.
pub struct StreamableValue<T: Clone + serde::Serialize> {
    id: Arc<str>,
    kind: StreamKind,
    tx: watch::Sender<Streamed<T>>,
    sink: Option<UiSink>,
    sealed: bool,
}

impl<T: Clone + serde::Serialize> StreamableValue<T> {
    pub fn new(initial: T, sink: Option<UiSink>) -> Self {
        Self::with_kind(StreamKind::Value, initial, sink)
    }

    pub(super) fn with_kind(kind: StreamKind, initial: T, sink: Option<UiSink>) -> Self {
        let (tx, _rx) = watch::channel(Streamed {
            value: initial,
            phase: Phase::Open,
        });
        let this = Self {
            id: Arc::from(uuid::Uuid::new_v4().to_string()),
            kind,
            tx,
            sink,
            sealed: false,
        };
        this.publish_snapshot();
        this
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Current value as seen by readers
    pub fn current(&self) -> T {
        self.tx.borrow().value.clone()
    }

    pub fn reader(&self) -> ValueReader<T> {
        ValueReader {
            id: Arc::clone(&self.id),
            rx: self.tx.subscribe(),
        }
    }

    /// Replace the current value
    pub fn update(&mut self, next: T) -> Result<(), SealError> {
        self.ensure_open("update")?;
        self.tx.send_modify(|s| s.value = next);
        self.publish_snapshot();
        Ok(())
    }

    /// Seal the value, optionally replacing it one last time
    pub fn done(&mut self, last: Option<T>) -> Result<(), SealError> {
        self.ensure_open("done")?;
        self.seal(last, Phase::Done);
        Ok(())
    }

    /// Seal the value in an error state, keeping whatever was produced so far
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SealError> {
        self.ensure_open("fail")?;
        self.seal(
            None,
            Phase::Failed {
                reason: reason.into(),
            },
        );
        Ok(())
    }

    /// Seal in an error state with a replacement value, e.g. an error display
    pub(super) fn fail_with(&mut self, last: T, reason: impl Into<String>) -> Result<(), SealError> {
        self.ensure_open("fail")?;
        self.seal(
            Some(last),
            Phase::Failed {
                reason: reason.into(),
            },
        );
        Ok(())
    }

    fn seal(&mut self, last: Option<T>, phase: Phase) {
        self.sealed = true;
        self.tx.send_modify(|s| {
            if let Some(value) = last {
                s.value = value;
            }
            s.phase = phase;
        });
        self.publish_snapshot();
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), SealError> {
        if self.sealed {
            tracing::error!(stream_id = %self.id, operation, "Operation on sealed stream");
            return Err(SealError::AlreadySealed {
                id: self.id.to_string(),
                operation,
            });
        }
        Ok(())
    }

    fn publish_snapshot(&self) {
        if let Some(sink) = &self.sink {
            let state = self.tx.borrow();
            let event = UiEvent::Snapshot {
                id: self.id.to_string(),
                kind: self.kind,
                value: serde_json::to_value(&state.value).unwrap_or(Value::Null),
                phase: state.phase.clone(),
            };
            drop(state);
            // No subscribers is fine, the watch channel still holds the value
            let _ = sink.send(event);
        }
    }
}

impl StreamableValue<String> {
    /// Append a text delta to the current value
    pub fn append(&mut self, delta: &str) -> Result<(), SealError> {
        self.ensure_open("append")?;
        self.tx.send_modify(|s| s.value.push_str(delta));
        if let Some(sink) = &self.sink {
            let _ = sink.send(UiEvent::Delta {
                id: self.id.to_string(),
                delta: delta.to_string(),
            });
        }
        Ok(())
    }
}

impl<T: Clone + serde::Serialize> Drop for StreamableValue<T> {
    fn drop(&mut self) {
        if !self.sealed {
            tracing::warn!(stream_id = %self.id, "Stream producer dropped before sealing");
            self.seal(
                None,
                Phase::Failed {
                    reason: "producer dropped".to_string(),
                },
            );
        }
    }
}

/// Read-only view of a streamed value; cheap to clone
#[derive(Debug, Clone)]
pub struct ValueReader<T> {
    id: Arc<str>,
    rx: watch::Receiver<Streamed<T>>,
}

impl<T: Clone + Send + Sync + 'static> ValueReader<T> {
    /// A reader over a value that is already final
    pub fn settled(value: T) -> Self {
        let (_tx, rx) = watch::channel(Streamed {
            value,
            phase: Phase::Done,
        });
        Self {
            id: Arc::from(uuid::Uuid::new_v4().to_string()),
            rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> Streamed<T> {
        self.rx.borrow().clone()
    }

    pub fn current(&self) -> T {
        self.rx.borrow().value.clone()
    }

    pub fn phase(&self) -> Phase {
        self.rx.borrow().phase.clone()
    }

    pub fn is_sealed(&self) -> bool {
        self.rx.borrow().phase.is_terminal()
    }

    /// Wait until the producer seals the value (or goes away) and return it
    pub async fn settled_value(&mut self) -> Streamed<T> {
        if self.rx.wait_for(|s| s.phase.is_terminal()).await.is_err() {
            tracing::debug!(stream_id = %self.id, "Producer went away while waiting");
        }
        self.rx.borrow().clone()
    }

    /// Live view: yields the current value, then every change
    pub fn into_stream(self) -> WatchStream<Streamed<T>> {
        WatchStream::new(self.rx)
    }
}

impl<T: Clone + serde::Serialize + Send + Sync + 'static> Serialize for ValueReader<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.snapshot();
        let mut out = serializer.serialize_struct("ValueReader", 3)?;
        out.serialize_field("stream_id", &*self.id)?;
        out.serialize_field("value", &state.value)?;
        out.serialize_field("phase", &state.phase)?;
        out.end()
    }
}
