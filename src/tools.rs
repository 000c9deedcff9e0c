//! Tool dispatch
//!
//! Declared tools are a closed set: [`DeclaredTool`] carries each tool's name,
//! description and schema, and [`ToolInvocation`] its validated arguments.
//! A handler runs on the session's task tracker, streams intermediate
//! displays through a [`RenderFeed`] and returns the final display. The
//! caller does not wait for it.

mod purchase;
mod report;

pub use purchase::{
    format_usd, validate_order, PurchaseInput, PurchaseRecord, PURCHASE_ENTRY_NAME,
};
pub use report::ReportInput;

use crate::llm::{ToolCall, ToolDefinition};
use crate::runtime::TaskScope;
use crate::stream::{Display, StreamableUi, UiReader};
use crate::transcript::{MutableAiState, StateError};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

const FEED_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
    #[error("transcript update failed: {0}")]
    State(#[from] StateError),
    #[error("cancelled")]
    Cancelled,
}

/// The tools offered to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredTool {
    Report,
    ShowStockPurchase,
}

impl DeclaredTool {
    pub const ALL: [DeclaredTool; 2] = [DeclaredTool::Report, DeclaredTool::ShowStockPurchase];

    pub fn name(self) -> &'static str {
        match self {
            DeclaredTool::Report => report::NAME,
            DeclaredTool::ShowStockPurchase => purchase::NAME,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DeclaredTool::Report => report::description(),
            DeclaredTool::ShowStockPurchase => purchase::description(),
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            DeclaredTool::Report => report::input_schema(),
            DeclaredTool::ShowStockPurchase => purchase::input_schema(),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// Deserialize and range-check arguments
    pub fn parse(self, arguments: Value) -> Result<ToolInvocation, ToolError> {
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool: self.name(),
            reason,
        };
        match self {
            DeclaredTool::Report => {
                let input: ReportInput =
                    serde_json::from_value(arguments).map_err(|e| invalid(e.to_string()))?;
                input.validate().map_err(invalid)?;
                Ok(ToolInvocation::Report(input))
            }
            DeclaredTool::ShowStockPurchase => {
                let input: PurchaseInput =
                    serde_json::from_value(arguments).map_err(|e| invalid(e.to_string()))?;
                input.validate().map_err(invalid)?;
                Ok(ToolInvocation::ShowStockPurchase(input))
            }
        }
    }
}

/// A validated tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    Report(ReportInput),
    ShowStockPurchase(PurchaseInput),
}

impl ToolInvocation {
    pub fn tool(&self) -> DeclaredTool {
        match self {
            ToolInvocation::Report(_) => DeclaredTool::Report,
            ToolInvocation::ShowStockPurchase(_) => DeclaredTool::ShowStockPurchase,
        }
    }

    async fn run(self, ctx: ToolContext, feed: RenderFeed) -> Result<Display, ToolError> {
        match self {
            ToolInvocation::Report(input) => report::run(input, ctx, feed).await,
            ToolInvocation::ShowStockPurchase(input) => purchase::run(input, ctx, feed).await,
        }
    }
}

/// Intermediate displays from a running handler
pub struct RenderFeed {
    tx: mpsc::Sender<Display>,
}

impl RenderFeed {
    fn channel() -> (Self, mpsc::Receiver<Display>) {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        (Self { tx }, rx)
    }

    pub async fn show(&self, display: Display) {
        if self.tx.send(display).await.is_err() {
            tracing::debug!("Render feed closed, display dropped");
        }
    }
}

/// What a handler gets to work with
pub struct ToolContext {
    /// Lease of its own, committed by the handler
    pub state: MutableAiState,
    pub settle_delay: Duration,
    pub call_id: String,
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<DeclaredTool>,
    settle_delay: Duration,
}

impl ToolRegistry {
    /// Every declared tool. `settle_delay` is how long `report` shows its
    /// empty card before recording the summary.
    pub fn standard(settle_delay: Duration) -> Self {
        Self {
            tools: DeclaredTool::ALL.to_vec(),
            settle_delay,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    /// Look up and validate a call
    pub fn prepare(&self, call: &ToolCall) -> Result<ToolInvocation, ToolError> {
        let tool = DeclaredTool::from_name(&call.name)
            .filter(|tool| self.tools.contains(tool))
            .ok_or_else(|| ToolError::UnknownTool {
                name: call.name.clone(),
            })?;
        tool.parse(call.arguments.clone())
    }

    /// Validate a call and start its handler in the background.
    ///
    /// The handler takes over the node in `slot` only while it still shows a
    /// spinner. A node already showing content is left in place and the
    /// handler drives a fresh node. On error the slot is left untouched and
    /// nothing is spawned.
    pub fn dispatch(
        &self,
        call: &ToolCall,
        slot: &mut Option<StreamableUi>,
        state: MutableAiState,
        scope: &TaskScope,
    ) -> Result<UiReader, ToolError> {
        let invocation = self.prepare(call)?;
        let tool = invocation.tool().name();

        let mut node = slot
            .take_if(|node| node.current() == Display::Spinner)
            .unwrap_or_else(|| StreamableUi::new(Display::Spinner, Some(scope.sink.clone())));
        let reader = node.reader();

        let (feed, mut displays) = RenderFeed::channel();
        let ctx = ToolContext {
            state,
            settle_delay: self.settle_delay,
            call_id: call.id.clone(),
        };
        let cancel = scope.cancel.clone();

        tracing::info!(tool, call_id = %call.id, node_id = %node.id(), "Dispatching tool call");
        scope.tasks.spawn(async move {
            let work = invocation.run(ctx, feed);
            tokio::pin!(work);

            let outcome = loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break Err(ToolError::Cancelled),
                    Some(display) = displays.recv() => {
                        if let Err(e) = node.update(display) {
                            tracing::error!(tool, error = %e, "Tool display update rejected");
                        }
                    }
                    result = &mut work => break result,
                }
            };

            while let Ok(display) = displays.try_recv() {
                if let Err(e) = node.update(display) {
                    tracing::error!(tool, error = %e, "Tool display update rejected");
                }
            }

            let sealed = match outcome {
                Ok(display) => node.done(display),
                Err(e) => {
                    tracing::warn!(tool, error = %e, "Tool handler failed");
                    node.fail(format!("{tool} failed: {e}"))
                }
            };
            if let Err(e) = sealed {
                tracing::error!(tool, error = %e, "Tool node already sealed");
            }
        });

        Ok(reader)
    }
}
