// src/ingest/mod.rs
pub mod monitor;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use tracing::{error, info};

use crate::logging::{log_safe, preview};
use crate::notify::{DeliveryResult, Dispatcher};
use crate::oracle::RelevanceOracle;
use crate::store::{QueryRegister, SourceRegistry};
use types::InboundMessage;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_events_total", "Inbound message events received.");
        describe_counter!(
            "relay_ignored_total",
            "Events from sources that are not monitored."
        );
        describe_counter!(
            "relay_handler_errors_total",
            "Events whose handler failed before a verdict."
        );
        describe_counter!("oracle_verdicts_total", "Oracle verdicts by kind.");
        describe_counter!("oracle_failures_total", "Oracle calls that failed open.");
        describe_histogram!("oracle_latency_seconds", "Oracle round-trip time.");
        describe_counter!("deliveries_total", "Delivery attempts by path and outcome.");
    });
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Source is not in the registry.
    Ignored,
    NotRelevant,
    Dispatched(DeliveryResult),
    /// Unexpected error; logged, stream continues.
    Failed,
}

/// Per-event pipeline: membership, text, verdict, delivery.
pub struct IngestRouter {
    sources: Arc<dyn SourceRegistry>,
    query: Arc<dyn QueryRegister>,
    oracle: RelevanceOracle,
    dispatcher: Dispatcher,
    ascii_logs: bool,
}

impl IngestRouter {
    pub fn new(
        sources: Arc<dyn SourceRegistry>,
        query: Arc<dyn QueryRegister>,
        oracle: RelevanceOracle,
        dispatcher: Dispatcher,
    ) -> Self {
        ensure_metrics_described();
        Self {
            sources,
            query,
            oracle,
            dispatcher,
            ascii_logs: false,
        }
    }

    pub fn with_ascii_logs(mut self, on: bool) -> Self {
        self.ascii_logs = on;
        self
    }

    /// Handle one event. Never errors; concurrent calls are independent.
    pub async fn on_message(&self, msg: InboundMessage) -> RouteOutcome {
        counter!("relay_events_total").increment(1);
        match self.route(&msg).await {
            Ok(outcome) => outcome,
            Err(e) => {
                counter!("relay_handler_errors_total").increment(1);
                error!(
                    channel = %log_safe(msg.source.display_name(), self.ascii_logs),
                    message_id = msg.id,
                    error = %format!("{e:#}"),
                    "message handler failed"
                );
                RouteOutcome::Failed
            }
        }
    }

    async fn route(&self, msg: &InboundMessage) -> Result<RouteOutcome> {
        let name = msg.source.display_name();
        let shown = log_safe(name, self.ascii_logs);

        // Fresh snapshot per event so control-surface edits apply immediately.
        if !self.sources.contains(name)? {
            counter!("relay_ignored_total").increment(1);
            info!(channel = %shown, "source not monitored; ignoring");
            return Ok(RouteOutcome::Ignored);
        }

        let text = msg.text_or_placeholder();
        let query = self.query.get();
        info!(
            channel = %shown,
            message_id = msg.id,
            text = %log_safe(&preview(text), self.ascii_logs),
            "new message from monitored source"
        );

        let verdict = self.oracle.evaluate(text, &query).await;
        if !verdict.is_relevant() {
            info!(channel = %shown, message_id = msg.id, "message not relevant; skipping");
            return Ok(RouteOutcome::NotRelevant);
        }

        self.log_relevant(msg);
        let delivery = self.dispatcher.dispatch(msg, &query).await;
        info!(
            channel = %shown,
            message_id = msg.id,
            delivered = delivery.is_delivered(),
            "relevant message handled"
        );
        Ok(RouteOutcome::Dispatched(delivery))
    }

    /// Console block for a relevant message.
    fn log_relevant(&self, msg: &InboundMessage) {
        let a = self.ascii_logs;
        let media = msg.media.as_ref().map(|m| m.label()).unwrap_or_default();
        let forwarded_from = msg
            .forward
            .as_ref()
            .map(|f| f.display_name().to_string())
            .unwrap_or_default();
        info!(
            channel = %log_safe(msg.source.display_name(), a),
            handle = msg.source.public_handle().unwrap_or("-"),
            sender = %log_safe(&msg.sender_name(), a),
            date = %msg.formatted_date(),
            message_id = msg.id,
            text = %log_safe(msg.text_or_placeholder(), a),
            media = %media,
            forwarded_from = %log_safe(&forwarded_from, a),
            "RELEVANT MESSAGE"
        );
    }
}
