//! Stock purchase proposal
//!
//! The tool only proposes: it records a `requires_action` placeholder and
//! shows a purchase card. The user confirms through
//! `Session::confirm_purchase`, which resolves the placeholder.

use super::{RenderFeed, ToolContext, ToolError};
use crate::stream::{Display, PurchaseStatus};
use crate::transcript::Message;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const NAME: &str = "show_stock_purchase";

/// Function-entry name of purchase records in the transcript
pub const PURCHASE_ENTRY_NAME: &str = "showStockPurchase";

pub const DEFAULT_SHARES: u32 = 100;
pub const MAX_SHARES: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PurchaseInput {
    pub symbol: String,
    pub price: f64,
    #[serde(default)]
    pub number_of_shares: Option<u32>,
}

impl PurchaseInput {
    pub fn validate(&self) -> Result<(), String> {
        validate_order(&self.symbol, self.price, self.amount())
    }

    pub fn amount(&self) -> u32 {
        self.number_of_shares.unwrap_or(DEFAULT_SHARES)
    }
}

/// Range checks shared by the tool and the confirming action
pub fn validate_order(symbol: &str, price: f64, amount: u32) -> Result<(), String> {
    if symbol.trim().is_empty() {
        return Err("symbol must not be empty".to_string());
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(format!("price must be a positive number, got {price}"));
    }
    if !(1..=MAX_SHARES).contains(&amount) {
        return Err(format!("share count must be between 1 and {MAX_SHARES}, got {amount}"));
    }
    Ok(())
}

/// Payload of a `showStockPurchase` function entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub symbol: String,
    pub price: f64,
    pub default_amount: u32,
    pub status: PurchaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl PurchaseRecord {
    pub fn to_message(&self) -> Message {
        let content = serde_json::to_string(self).unwrap_or_default();
        Message::function(PURCHASE_ENTRY_NAME, content)
    }
}

/// Format as US dollars with thousands separators, e.g. `$1,234.50`
pub fn format_usd(value: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let cents = (value.abs() * 100.0).round() as u64;
    let digits = (cents / 100).to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

pub fn description() -> &'static str {
    "Show a stock purchase card so the user can confirm buying shares of a stock."
}

pub fn input_schema() -> Value {
    json!({
        "type": "object",
        "required": ["symbol", "price"],
        "additionalProperties": false,
        "properties": {
            "symbol": {
                "type": "string",
                "description": "The name or symbol of the stock"
            },
            "price": {
                "type": "number",
                "description": "The price of the stock"
            },
            "numberOfShares": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_SHARES,
                "description": "The number of shares to purchase. Omit if the user did not say."
            }
        }
    })
}

pub async fn run(
    input: PurchaseInput,
    mut ctx: ToolContext,
    _feed: RenderFeed,
) -> Result<Display, ToolError> {
    let amount = input.amount();
    let record = PurchaseRecord {
        symbol: input.symbol.clone(),
        price: input.price,
        default_amount: amount,
        status: PurchaseStatus::RequiresAction,
        total: None,
    };
    ctx.state.append(record.to_message()).await?;
    ctx.state.done().await?;

    tracing::info!(call_id = %ctx.call_id, symbol = %input.symbol, amount, "Purchase proposed");
    Ok(Display::Purchase {
        symbol: input.symbol,
        price: input.price,
        amount,
        status: PurchaseStatus::RequiresAction,
    })
}
