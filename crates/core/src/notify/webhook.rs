use reqwest::Client;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::NotifierConfig;

use super::types::{NotifyError, OrderCreatedEvent};
use super::Notifier;

/// Queueing `Notifier`. Cheap to clone; events are delivered by a
/// `NotifierWorker` running in the background.
#[derive(Clone)]
pub struct WebhookNotifier {
    tx: mpsc::Sender<OrderCreatedEvent>,
}

impl Notifier for WebhookNotifier {
    fn notify_order_created(&self, event: OrderCreatedEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("Dropping order notification: {}", e);
        }
    }
}

/// Background task that drains the notification queue.
pub struct NotifierWorker {
    rx: mpsc::Receiver<OrderCreatedEvent>,
    client: Client,
    webhook_url: Option<String>,
}

impl NotifierWorker {
    /// Deliver events until every `WebhookNotifier` clone is dropped.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            webhook = self.webhook_url.is_some(),
            "Notifier worker started"
        );

        while let Some(event) = self.rx.recv().await {
            match &self.webhook_url {
                Some(url) => {
                    if let Err(e) = self.deliver(url, &event).await {
                        error!(
                            target_id = %event.target_id,
                            order_id = ?event.order_id,
                            "Failed to deliver order notification: {}",
                            e
                        );
                    }
                }
                None => info!(
                    target_id = %event.target_id,
                    order_id = ?event.order_id,
                    account = %event.account_mobile,
                    quantity = event.quantity,
                    "Order created"
                ),
            }
        }

        info!("Notifier worker shutting down");
    }

    async fn deliver(&self, url: &str, event: &OrderCreatedEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(url)
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Create the notifier handle and its worker.
///
/// Spawn the worker with `tokio::spawn(worker.run())`.
pub fn create_notifier(config: &NotifierConfig) -> (WebhookNotifier, NotifierWorker) {
    let (tx, rx) = mpsc::channel(config.queue_size.max(1));
    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default();
    let webhook_url = config
        .webhook_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(String::from);

    (
        WebhookNotifier { tx },
        NotifierWorker {
            rx,
            client,
            webhook_url,
        },
    )
}
