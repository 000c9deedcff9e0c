//! API request and response types

use crate::db::ChatSummary;
use crate::stream::UiEntry;
use serde::{Deserialize, Serialize};

/// Response to creating a chat
#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: String,
}

/// Request to send a user message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Request to confirm a proposed purchase
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub symbol: String,
    pub price: f64,
    pub amount: u32,
}

/// Rehydrated render list, `null` for guests
#[derive(Debug, Serialize)]
pub struct UiStateResponse {
    pub ui: Option<Vec<UiEntry>>,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
