//! Report tool - hands the patient summary to the clinician
//!
//! The summary is recorded under the `render` function name, so a resumed
//! session shows it again as a bot card.

use super::{RenderFeed, ToolContext, ToolError};
use crate::stream::Display;
use crate::transcript::{Message, RENDERED_FUNCTION_NAME};
use serde::Deserialize;
use serde_json::{json, Value};

pub const NAME: &str = "report";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportInput {
    pub summary: String,
}

impl ReportInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("summary must not be empty".to_string());
        }
        Ok(())
    }
}

pub fn description() -> &'static str {
    "Report the patient's condition to the doctor. Call this at the same time as telling the \
     patient which department to visit."
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "required": ["summary"],
        "additionalProperties": false,
        "properties": {
            "summary": {
                "type": "string",
                "description": "Summary of the patient's symptoms, history and the recommended department"
            }
        }
    })
}

pub async fn run(
    input: ReportInput,
    mut ctx: ToolContext,
    feed: RenderFeed,
) -> Result<Display, ToolError> {
    tracing::info!(call_id = %ctx.call_id, chars = input.summary.chars().count(), "Reporting to clinician");

    feed.show(Display::BotCard {
        body: String::new(),
    })
    .await;
    tokio::time::sleep(ctx.settle_delay).await;

    ctx.state
        .append(Message::function(RENDERED_FUNCTION_NAME, input.summary.clone()))
        .await?;
    ctx.state.done().await?;

    Ok(Display::BotCard {
        body: input.summary,
    })
}
