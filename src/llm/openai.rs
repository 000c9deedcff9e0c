//! `OpenAI`-compatible streaming chat completions

use super::types::{Fragment, LlmRequest, ToolCall};
use super::{FragmentStream, LlmError, LlmService};
use crate::transcript::Role;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-2024-04-09";

const FRAGMENT_BUFFER: usize = 64;

/// Connection settings for an `OpenAI`-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// `OpenAI`-compatible service implementation
pub struct OpenAiService {
    client: Client,
    api_key: String,
    endpoint: String,
    model_id: String,
}

impl OpenAiService {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model_id: config.model,
        })
    }

    fn translate_request(request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: request.system.clone(),
                name: None,
            });
        }

        // Data entries are client-side payloads, never model context
        messages.extend(
            request
                .messages
                .iter()
                .filter(|m| m.role != Role::Data)
                .map(|m| {
                    let (role, name) = match m.role {
                        Role::Function | Role::Tool => (
                            "function",
                            Some(m.name.clone().unwrap_or_else(|| "tool".to_string())),
                        ),
                        other => (other.as_str(), m.name.clone()),
                    };
                    WireMessage {
                        role,
                        content: m.content.clone(),
                        name,
                    }
                }),
        );

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| WireTool {
                        r#type: "function",
                        function: WireFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        ChatRequest {
            model: request.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }
}

#[async_trait]
impl LlmService for OpenAiService {
    async fn stream(&self, request: &LlmRequest) -> Result<FragmentStream, LlmError> {
        let body = Self::translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);

            let mut error = LlmError::from_status(status.as_u16(), &message);
            if let Some(secs) = retry_after {
                error = error.with_retry_after(Duration::from_secs(secs));
            }
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(FRAGMENT_BUFFER);
        tokio::spawn(pump(response.bytes_stream(), tx));
        Ok(ReceiverStream::new(rx).boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Decode an SSE body into fragments until completion, EOF or a closed receiver
async fn pump<S, B, E>(body: S, tx: mpsc::Sender<Result<Fragment, LlmError>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    let mut acc = ChunkAccumulator::default();

    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(LlmError::stream(format!("Response body failed: {e}"))))
                    .await;
                return;
            }
        };

        for event in decoder.push(bytes.as_ref()) {
            let fragments = match event {
                SseEvent::Done if acc.finished => return,
                SseEvent::Done => acc.finish(),
                SseEvent::Data(data) => match serde_json::from_str::<ChatChunk>(&data) {
                    Ok(chunk) => acc.apply(chunk),
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmError::stream(format!("Malformed chunk: {e}"))))
                            .await;
                        return;
                    }
                },
            };
            for fragment in fragments {
                if tx.send(Ok(fragment)).await.is_err() {
                    tracing::debug!("Fragment receiver dropped, abandoning stream");
                    return;
                }
            }
        }
    }

    if !acc.finished {
        let _ = tx
            .send(Err(LlmError::stream("Stream ended before completion")))
            .await;
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Data(String),
    Done,
}

/// Splits the body into `data:` lines. Buffers raw bytes, so a multibyte
/// character split across network chunks is decoded whole.
#[derive(Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let Some(data) = line.trim_end().strip_prefix("data:") else {
                continue;
            };
            match data.trim_start() {
                "" => {}
                "[DONE]" => events.push(SseEvent::Done),
                payload => events.push(SseEvent::Data(payload.to_string())),
            }
        }
        events
    }
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn into_call(self) -> ToolCall {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            // Unparseable arguments still reach the dispatcher, which rejects them
            serde_json::from_str(&self.arguments).unwrap_or(Value::String(self.arguments))
        };
        ToolCall {
            id: if self.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                self.id
            },
            name: self.name,
            arguments,
        }
    }
}

/// Turns streamed chunks into fragments; tool calls are emitted once complete
#[derive(Default)]
struct ChunkAccumulator {
    text: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finished: bool,
}

impl ChunkAccumulator {
    fn apply(&mut self, chunk: ChatChunk) -> Vec<Fragment> {
        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.text.push_str(&content);
                out.push(Fragment::TextDelta(content));
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let call = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    call.name.push_str(function.name.as_deref().unwrap_or_default());
                    call.arguments
                        .push_str(function.arguments.as_deref().unwrap_or_default());
                }
            }
            if choice.finish_reason.is_some() && !self.finished {
                out.extend(self.finish());
            }
        }
        out
    }

    fn finish(&mut self) -> Vec<Fragment> {
        self.finished = true;
        let mut out = Vec::new();
        if !self.text.is_empty() {
            out.push(Fragment::TextDone(std::mem::take(&mut self.text)));
        }
        out.extend(
            std::mem::take(&mut self.tool_calls)
                .into_values()
                .map(|call| Fragment::ToolCall(call.into_call())),
        );
        out
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
