//! LLM provider abstraction
//!
//! Providers turn a request into an ordered stream of [`Fragment`]s.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::{OpenAiConfig, OpenAiService, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use types::*;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fragments in emission order. An `Err` item ends the stream.
pub type FragmentStream = BoxStream<'static, Result<Fragment, LlmError>>;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a streaming completion
    async fn stream(&self, request: &LlmRequest) -> Result<FragmentStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<FragmentStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream(request).await;
        let open_ms = start.elapsed().as_millis();

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %open_ms,
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
                return Err(e);
            }
        };

        tracing::info!(
            model = %self.model_id,
            duration_ms = %open_ms,
            messages = request.messages.len(),
            "LLM stream opened"
        );

        let model = self.model_id.clone();
        let fragments = Arc::new(AtomicUsize::new(0));
        let stream = stream.inspect(move |item| match item {
            Ok(Fragment::TextDone(text)) => tracing::info!(
                model = %model,
                fragments = fragments.fetch_add(1, Ordering::Relaxed) + 1,
                chars = text.chars().count(),
                duration_ms = %start.elapsed().as_millis(),
                "LLM text completed"
            ),
            Ok(Fragment::ToolCall(call)) => {
                fragments.fetch_add(1, Ordering::Relaxed);
                tracing::info!(model = %model, tool = %call.name, "LLM tool call");
            }
            Ok(Fragment::TextDelta(_)) => {
                fragments.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::error!(
                model = %model,
                fragments = fragments.load(Ordering::Relaxed),
                error = %e.message,
                "LLM stream failed"
            ),
        });

        Ok(stream.boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
