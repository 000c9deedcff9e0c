//! Render nodes: displays replaced in place while a client is watching

use super::display::Display;
use super::value::{SealError, StreamableValue, ValueReader};
use super::{StreamKind, UiSink};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Read side of a render node
pub type UiReader = ValueReader<Display>;

/// Producer side of a render node.
///
/// `update` swaps the whole display, `done` seals it. A node dropped while
/// still open is sealed with an error display so clients never hang on it.
pub struct StreamableUi {
    inner: StreamableValue<Display>,
}

impl StreamableUi {
    pub fn new(initial: Display, sink: Option<UiSink>) -> Self {
        Self {
            inner: StreamableValue::with_kind(StreamKind::Node, initial, sink),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.is_sealed()
    }

    pub fn current(&self) -> Display {
        self.inner.current()
    }

    pub fn reader(&self) -> UiReader {
        self.inner.reader()
    }

    pub fn update(&mut self, display: Display) -> Result<(), SealError> {
        self.inner.update(display)
    }

    pub fn done(&mut self, display: Display) -> Result<(), SealError> {
        self.inner.done(Some(display))
    }

    /// Seal as failed, showing `message` as an error display
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SealError> {
        let message = message.into();
        self.inner.fail_with(Display::error(message.clone()), message)
    }
}

impl Drop for StreamableUi {
    fn drop(&mut self) {
        if !self.inner.is_sealed() {
            tracing::warn!(node_id = %self.inner.id(), "Render node dropped while open");
            let _ = self.fail("This response was interrupted.");
        }
    }
}

/// One item of the renderable projection
#[derive(Debug, Clone)]
pub struct UiEntry {
    pub id: String,
    pub display: UiReader,
}

impl UiEntry {
    pub fn new(display: UiReader) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display,
        }
    }

    /// Entry whose display is already final (rehydrated history)
    pub fn settled(id: impl Into<String>, display: Display) -> Self {
        Self {
            id: id.into(),
            display: UiReader::settled(display),
        }
    }

    /// Entry id and currently shown display, without node identity
    pub fn content(&self) -> (String, Display) {
        (self.id.clone(), self.display.current())
    }
}

impl Serialize for UiEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.display.snapshot();
        let mut out = serializer.serialize_struct("UiEntry", 4)?;
        out.serialize_field("id", &self.id)?;
        out.serialize_field("node_id", self.display.id())?;
        out.serialize_field("display", &state.value)?;
        out.serialize_field("phase", &state.phase)?;
        out.end()
    }
}
