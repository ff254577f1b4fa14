// src/notify/dispatch.rs
//! Primary-then-fallback delivery of relevant messages.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{error, info, warn};

use super::{Notification, Notifier};
use crate::ingest::types::InboundMessage;
use crate::transport::Forwarder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    Primary,
    Fallback,
}

impl DeliveryPath {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryPath::Primary => "primary",
            DeliveryPath::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered(DeliveryPath),
    Failed,
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered(_))
    }
}

/// Tries the primary notifier once; on any failure (including "not
/// configured") forwards the original message exactly once.
#[derive(Clone)]
pub struct Dispatcher {
    primary: Option<Arc<dyn Notifier>>,
    fallback: Option<Arc<dyn Forwarder>>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        primary: Option<Arc<dyn Notifier>>,
        fallback: Option<Arc<dyn Forwarder>>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout,
        }
    }

    /// Never errors; the outcome is for logging only.
    pub async fn dispatch(&self, msg: &InboundMessage, query: &str) -> DeliveryResult {
        let channel = msg.source.display_name();

        match &self.primary {
            Some(primary) => {
                let note = Notification::from_message(msg, query);
                match tokio::time::timeout(self.timeout, primary.send(&note)).await {
                    Ok(Ok(())) => {
                        info!(channel, message_id = msg.id, "notification sent");
                        return self.record(DeliveryResult::Delivered(DeliveryPath::Primary));
                    }
                    Ok(Err(e)) => {
                        warn!(channel, message_id = msg.id, error = %e, "primary delivery failed")
                    }
                    Err(_) => warn!(
                        channel,
                        message_id = msg.id,
                        timeout_secs = self.timeout.as_secs(),
                        "primary delivery timed out"
                    ),
                }
            }
            None => info!(channel, "no primary channel configured; using fallback"),
        }

        let Some(fallback) = &self.fallback else {
            error!(channel, message_id = msg.id, "no fallback available; message not delivered");
            return self.record(DeliveryResult::Failed);
        };
        match tokio::time::timeout(self.timeout, fallback.forward_to_self(&msg.source, msg.id))
            .await
        {
            Ok(Ok(())) => {
                info!(channel, message_id = msg.id, "message forwarded via fallback");
                self.record(DeliveryResult::Delivered(DeliveryPath::Fallback))
            }
            Ok(Err(e)) => {
                error!(channel, message_id = msg.id, error = %e, "fallback delivery failed");
                self.record(DeliveryResult::Failed)
            }
            Err(_) => {
                error!(channel, message_id = msg.id, "fallback delivery timed out");
                self.record(DeliveryResult::Failed)
            }
        }
    }

    fn record(&self, result: DeliveryResult) -> DeliveryResult {
        let (path, outcome) = match result {
            DeliveryResult::Delivered(p) => (p.label(), "delivered"),
            DeliveryResult::Failed => ("none", "failed"),
        };
        counter!("deliveries_total", "path" => path, "outcome" => outcome).increment(1);
        result
    }
}
