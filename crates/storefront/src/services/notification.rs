//! Post-order notifications.
//!
//! The checkout path only hands a notification to a bounded queue; a
//! background worker delivers it to the configured sink. Delivery failures
//! are logged, never retried here, and never fail the order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};
use url::Url;

use losia_core::{CustomerContact, Money, Order, PaymentMethod, ShippingAddress};

/// Errors handing a notification to the queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("notification queue is full")]
    QueueFull,
    #[error("notification worker has stopped")]
    Closed,
}

/// Errors delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered {0}")]
    Status(u16),
}

/// What gets sent for a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotification {
    pub order_code: String,
    pub total: Money,
    pub method: PaymentMethod,
    pub customer: CustomerContact,
    pub address: ShippingAddress,
}

impl From<&Order> for OrderNotification {
    fn from(order: &Order) -> Self {
        Self {
            order_code: order.code.clone(),
            total: order.draft.totals().total,
            method: order.draft.payment_method(),
            customer: order.draft.customer().clone(),
            address: order.draft.address().clone(),
        }
    }
}

/// Somewhere to deliver order notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &OrderNotification) -> Result<(), NotificationError>;
}

// =============================================================================
// Sinks
// =============================================================================

/// POSTs the notification as JSON; only the acknowledgment status matters.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: Url,
}

impl WebhookSink {
    #[must_use]
    pub const fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    #[instrument(skip_all, fields(order_code = %notification.order_code))]
    async fn deliver(&self, notification: &OrderNotification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Logs notifications instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn deliver(&self, notification: &OrderNotification) -> Result<(), NotificationError> {
        info!(
            order_code = %notification.order_code,
            total = %notification.total,
            method = %notification.method,
            email = %notification.customer.email,
            "Order notification"
        );
        Ok(())
    }
}

// =============================================================================
// NotificationDispatcher
// =============================================================================

/// Hands notifications to a background delivery worker.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<OrderNotification>,
}

impl NotificationDispatcher {
    /// Spawn the delivery worker and return its dispatcher.
    ///
    /// The worker runs until every dispatcher clone is dropped.
    #[must_use]
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<OrderNotification>(capacity.max(1));

        info!(capacity, "Spawning notification worker");
        let handle = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                match sink.deliver(&notification).await {
                    Ok(()) => {
                        info!(order_code = %notification.order_code, "Notification delivered");
                    }
                    Err(e) => error!(
                        order_code = %notification.order_code,
                        error = %e,
                        "Failed to deliver notification"
                    ),
                }
            }
            info!("Notification worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a notification without waiting.
    ///
    /// # Errors
    ///
    /// [`DispatchError::QueueFull`] or [`DispatchError::Closed`]; the
    /// notification is dropped either way.
    pub fn dispatch(&self, notification: OrderNotification) -> Result<(), DispatchError> {
        self.tx.try_send(notification).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}
