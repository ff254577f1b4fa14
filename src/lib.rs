// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod control;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod oracle;
pub mod store;
pub mod telegram;
pub mod transport;

pub use crate::config::RelayConfig;
pub use crate::ingest::types::InboundMessage;
pub use crate::ingest::{IngestRouter, RouteOutcome};
pub use crate::oracle::{RelevanceOracle, Verdict};

use tracing::{info, warn};

/// One-off smoke test of the oracle configuration. Never panics; logs the
/// verdict for a sample message and returns it.
pub async fn run_oracle_probe(cfg: &RelayConfig) -> anyhow::Result<Verdict> {
    let oracle = RelevanceOracle::from_config(&cfg.oracle)?;
    if !oracle.is_enabled() {
        warn!("oracle probe: no MISTRAL_API_KEY; every message will be treated as relevant");
    }
    let sample = "Breaking: heavy rain expected across the north tonight, roads may close.";
    let query = "weather warnings";
    let verdict = oracle.evaluate(sample, query).await;
    info!(
        provider = oracle.provider_name(),
        verdict = verdict.label(),
        "oracle probe finished"
    );
    Ok(verdict)
}
