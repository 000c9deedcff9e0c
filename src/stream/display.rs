//! Renderable units shown by the client

use super::value::ValueReader;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Progress of a proposed stock purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    RequiresAction,
    Completed,
    Expired,
}

/// Body text of a bot message: fixed, or following a streamed value
#[derive(Debug, Clone)]
pub enum TextContent {
    Static(String),
    Live(ValueReader<String>),
}

impl TextContent {
    /// Text as currently rendered
    pub fn text(&self) -> String {
        match self {
            TextContent::Static(text) => text.clone(),
            TextContent::Live(reader) => reader.current(),
        }
    }
}

// Content equality, stream identity is irrelevant to what the user sees
impl PartialEq for TextContent {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

impl Serialize for TextContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TextContent::Static(text) => {
                let mut out = serializer.serialize_struct("TextContent", 1)?;
                out.serialize_field("text", text)?;
                out.end()
            }
            TextContent::Live(reader) => {
                let mut out = serializer.serialize_struct("TextContent", 2)?;
                out.serialize_field("text", &reader.current())?;
                out.serialize_field("stream", reader)?;
                out.end()
            }
        }
    }
}

/// A whole renderable unit. Nodes swap one `Display` for another.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum Display {
    /// Nothing to show (context-only entries)
    Empty,
    Spinner,
    UserMessage {
        text: String,
    },
    BotMessage {
        content: TextContent,
    },
    BotCard {
        body: String,
    },
    SystemMessage {
        text: String,
    },
    /// Spinner with a status line
    Progress {
        text: String,
    },
    Text {
        text: String,
    },
    Purchase {
        symbol: String,
        price: f64,
        amount: u32,
        status: PurchaseStatus,
    },
    Error {
        message: String,
    },
}

impl Display {
    pub fn bot_text(text: impl Into<String>) -> Self {
        Display::BotMessage {
            content: TextContent::Static(text.into()),
        }
    }

    pub fn bot_stream(reader: ValueReader<String>) -> Self {
        Display::BotMessage {
            content: TextContent::Live(reader),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Display::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Display::Error { .. })
    }
}
