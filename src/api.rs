//! HTTP API for the triage desk
//!
//! JSON endpoints drive sessions; an SSE endpoint relays every node and value
//! change of a session to the browser.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::runtime::{Anonymous, Authenticator, FixedUser, SessionManager, UserIdentity};
use axum::http::HeaderMap;
use std::sync::Arc;

/// Header carrying the signed-in user's id, set by the fronting auth proxy
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

/// Caller identity from request headers, a guest when the id header is
/// missing or blank
pub fn request_auth(headers: &HeaderMap) -> Arc<dyn Authenticator> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    };

    match header(USER_ID_HEADER) {
        Some(id) => Arc::new(FixedUser::from_identity(UserIdentity {
            id,
            name: header(USER_NAME_HEADER),
        })),
        None => Arc::new(Anonymous),
    }
}
