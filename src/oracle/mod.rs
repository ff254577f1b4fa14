// src/oracle/mod.rs
//! Relevance oracle: asks an LLM whether a message matches the query.
//!
//! Every failure path answers "relevant": the oracle may delay a message but
//! never drops it.

pub mod prompts;
pub mod provider;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::config::OracleConfig;
pub use provider::{MistralProvider, MockProvider, Provider};

/// Parsed oracle reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Relevant,
    NotRelevant,
    /// Reply matched neither marker; carries the raw text. Treated as relevant.
    Unknown(String),
}

impl Verdict {
    pub fn is_relevant(&self) -> bool {
        !matches!(self, Verdict::NotRelevant)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Relevant => "relevant",
            Verdict::NotRelevant => "not_relevant",
            Verdict::Unknown(_) => "unknown",
        }
    }
}

/// Strip, upper-case, then test `NOT RELEVANT` before `RELEVANT`.
pub fn parse_verdict(raw: &str) -> Verdict {
    let norm = raw.trim().to_uppercase();
    if norm.starts_with("NOT RELEVANT") {
        Verdict::NotRelevant
    } else if norm.starts_with("RELEVANT") {
        Verdict::Relevant
    } else {
        Verdict::Unknown(raw.trim().to_string())
    }
}

/// Slots for the free-form analysis template.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub channel_name: String,
    pub sender_name: String,
    pub message_date: String,
    pub message_text: String,
    pub user_query: String,
}

/// Chosen once at startup; `Disabled` never touches the network.
#[derive(Clone)]
pub enum RelevanceOracle {
    Enabled {
        provider: Arc<dyn Provider>,
        timeout: Duration,
        analysis_template: Option<String>,
    },
    Disabled,
}

impl std::fmt::Debug for RelevanceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelevanceOracle::Enabled {
                provider, timeout, ..
            } => f
                .debug_struct("Enabled")
                .field("provider", &provider.name())
                .field("timeout", timeout)
                .finish(),
            RelevanceOracle::Disabled => f.write_str("Disabled"),
        }
    }
}

impl RelevanceOracle {
    /// `Disabled` when no usable API key is configured.
    pub fn from_config(cfg: &OracleConfig) -> Result<Self> {
        let Some(key) = cfg.api_key() else {
            return Ok(RelevanceOracle::Disabled);
        };
        let provider = MistralProvider::new(cfg, key)?;
        Ok(RelevanceOracle::Enabled {
            provider: Arc::new(provider),
            timeout: Duration::from_secs(cfg.timeout_secs),
            analysis_template: cfg.analysis_template.clone(),
        })
    }

    pub fn with_provider(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        RelevanceOracle::Enabled {
            provider,
            timeout,
            analysis_template: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RelevanceOracle::Enabled { .. })
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            RelevanceOracle::Enabled { provider, .. } => provider.name(),
            RelevanceOracle::Disabled => "disabled",
        }
    }

    /// One bounded call, no retry. Never errors.
    pub async fn evaluate(&self, message_text: &str, query: &str) -> Verdict {
        let RelevanceOracle::Enabled {
            provider, timeout, ..
        } = self
        else {
            counter!("oracle_verdicts_total", "verdict" => "disabled").increment(1);
            return Verdict::Relevant;
        };

        let prompt = prompts::relevance_prompt(message_text, query);
        let started = Instant::now();
        let reply = tokio::time::timeout(*timeout, provider.complete(&prompt)).await;
        histogram!("oracle_latency_seconds").record(started.elapsed().as_secs_f64());

        let raw = match reply {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                counter!("oracle_failures_total", "cause" => "error").increment(1);
                warn!(error = %e, "oracle call failed; treating message as relevant");
                return Verdict::Relevant;
            }
            Err(_) => {
                counter!("oracle_failures_total", "cause" => "timeout").increment(1);
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "oracle call timed out; treating message as relevant"
                );
                return Verdict::Relevant;
            }
        };

        let verdict = parse_verdict(&raw);
        counter!("oracle_verdicts_total", "verdict" => verdict.label()).increment(1);
        match &verdict {
            Verdict::Unknown(text) => warn!(
                reply = %text,
                "unexpected oracle reply; treating message as relevant"
            ),
            v => info!(verdict = v.label(), "oracle verdict"),
        }
        verdict
    }

    /// Free-form summary of one message. `None` on any failure.
    pub async fn analyze(&self, req: &AnalysisRequest) -> Option<String> {
        let RelevanceOracle::Enabled {
            provider,
            timeout,
            analysis_template,
        } = self
        else {
            return None;
        };

        let template = analysis_template
            .as_deref()
            .unwrap_or(prompts::DEFAULT_ANALYSIS_TEMPLATE);
        let prompt = prompts::render(
            template,
            &[
                ("channel_name", req.channel_name.as_str()),
                ("sender_name", req.sender_name.as_str()),
                ("message_date", req.message_date.as_str()),
                ("message_text", req.message_text.as_str()),
                ("user_query", req.user_query.as_str()),
            ],
        );

        match tokio::time::timeout(*timeout, provider.complete(&prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(Ok(_)) => {
                warn!("oracle analysis came back empty");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "oracle analysis failed");
                None
            }
            Err(_) => {
                warn!("oracle analysis timed out");
                None
            }
        }
    }
}
