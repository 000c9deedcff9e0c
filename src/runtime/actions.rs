//! Confirming actions: a progress handle now, the transcript update later

use super::session::{Session, SessionError};
use super::traits::Authenticator;
use crate::stream::{Display, PurchaseStatus, StreamableUi, UiEntry, UiReader};
use crate::tools::{format_usd, validate_order, PurchaseRecord, PURCHASE_ENTRY_NAME};
use crate::transcript::{Message, MutableAiState, StateError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Handles returned by [`Session::confirm_purchase`] before any work is done
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    /// Progress of the purchase itself
    pub purchasing_ui: UiReader,
    /// System message announcing the result
    pub new_message: UiEntry,
}

#[derive(Debug, Clone)]
struct Order {
    symbol: String,
    price: f64,
    amount: u32,
}

impl Order {
    fn total(&self) -> f64 {
        f64::from(self.amount) * self.price
    }
}

impl Session {
    /// Buy `amount` shares of `symbol` at `price`.
    ///
    /// Returns the progress handles at once. In the background the purchase
    /// steps through its progress displays, then records the completed
    /// purchase and a system narration in the transcript and commits.
    pub async fn confirm_purchase(
        &self,
        symbol: &str,
        price: f64,
        amount: u32,
        auth: Arc<dyn Authenticator>,
    ) -> Result<PurchaseReceipt, SessionError> {
        self.ensure_running()?;
        self.authorize_writer(auth.as_ref()).await?;
        validate_order(symbol, price, amount).map_err(SessionError::InvalidRequest)?;

        let order = Order {
            symbol: symbol.to_string(),
            price,
            amount,
        };
        let sink = Some(self.scope.sink.clone());
        let purchasing = StreamableUi::new(
            Display::Progress {
                text: format!("Purchasing {amount} ${symbol}..."),
            },
            sink.clone(),
        );
        let system_message = StreamableUi::new(Display::Empty, sink);

        let receipt = PurchaseReceipt {
            purchasing_ui: purchasing.reader(),
            new_message: UiEntry::new(system_message.reader()),
        };

        let lease = self.state.lease(auth);
        let step = self.config().purchase_step;
        let cancel = self.scope.cancel.clone();
        let chat_id = self.chat_id().to_string();
        tracing::info!(chat_id = %chat_id, symbol, amount, "Purchase confirmed");

        self.scope.tasks.spawn(async move {
            let mut purchasing = purchasing;
            let mut system_message = system_message;
            let result = complete_purchase(
                &order,
                &mut purchasing,
                &mut system_message,
                lease,
                step,
                &cancel,
            )
            .await;

            if let Err(e) = result {
                tracing::warn!(chat_id = %chat_id, symbol = %order.symbol, error = %e, "Purchase did not complete");
                if !purchasing.is_sealed() {
                    let _ = purchasing.fail("The purchase was interrupted.");
                }
                if !system_message.is_sealed() {
                    let _ = system_message.fail("The purchase was interrupted.");
                }
            }
        });

        Ok(receipt)
    }
}

#[derive(Debug, thiserror::Error)]
enum PurchaseError {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Sealed(#[from] crate::stream::SealError),
}

async fn pause(step: Duration, cancel: &CancellationToken) -> Result<(), PurchaseError> {
    tokio::select! {
        () = cancel.cancelled() => Err(PurchaseError::Cancelled),
        () = tokio::time::sleep(step) => Ok(()),
    }
}

async fn complete_purchase(
    order: &Order,
    purchasing: &mut StreamableUi,
    system_message: &mut StreamableUi,
    mut lease: MutableAiState,
    step: Duration,
    cancel: &CancellationToken,
) -> Result<(), PurchaseError> {
    let Order {
        symbol,
        price,
        amount,
    } = order;

    pause(step, cancel).await?;
    purchasing.update(Display::Progress {
        text: format!("Purchasing {amount} ${symbol}... working on it..."),
    })?;

    pause(step, cancel).await?;
    let total = order.total();
    purchasing.done(Display::Text {
        text: format!(
            "You have successfully purchased {amount} ${symbol}. Total cost: {}",
            format_usd(total)
        ),
    })?;
    system_message.done(Display::SystemMessage {
        text: format!(
            "You have purchased {amount} shares of {symbol} at ${price}. Total cost = {}.",
            format_usd(total)
        ),
    })?;

    let record = PurchaseRecord {
        symbol: symbol.clone(),
        price: *price,
        default_amount: *amount,
        status: PurchaseStatus::Completed,
        total: Some(total),
    }
    .to_message();

    let staging = lease.get().await?;
    if staging.last().is_some_and(is_pending_purchase) {
        lease.replace_last(record).await?;
    } else {
        lease.append(record).await?;
    }
    lease
        .append(Message::system(format!(
            "[User has purchased {amount} shares of {symbol} at {price}. Total cost = {total}]"
        )))
        .await?;
    lease.done().await?;
    Ok(())
}

fn is_pending_purchase(message: &Message) -> bool {
    message.is_function_named(PURCHASE_ENTRY_NAME)
        && serde_json::from_str::<PurchaseRecord>(&message.content)
            .is_ok_and(|record| record.status == PurchaseStatus::RequiresAction)
}
