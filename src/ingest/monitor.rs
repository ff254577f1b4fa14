// src/ingest/monitor.rs
//! Owns the transport: startup validation, one task per event, shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{IngestRouter, RouteOutcome};
use crate::logging::log_safe;
use crate::store::SourceRegistry;
use crate::transport::Transport;

const POLL_BACKOFF_START: Duration = Duration::from_secs(1);
const POLL_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Result of resolving every registered source once at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: Vec<String>,
    pub invalid: Vec<(String, String)>,
}

pub struct Monitor {
    transport: Arc<dyn Transport>,
    router: Arc<IngestRouter>,
    sources: Arc<dyn SourceRegistry>,
    grace: Duration,
    ascii_logs: bool,
}

impl Monitor {
    pub fn new(
        transport: Arc<dyn Transport>,
        router: Arc<IngestRouter>,
        sources: Arc<dyn SourceRegistry>,
        grace: Duration,
    ) -> Self {
        Self {
            transport,
            router,
            sources,
            grace,
            ascii_logs: false,
        }
    }

    pub fn with_ascii_logs(mut self, on: bool) -> Self {
        self.ascii_logs = on;
        self
    }

    /// Try to resolve every registered source. Diagnostic only: membership is
    /// still decided per event against the registry.
    pub async fn validate_sources(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        let names = match self.sources.list() {
            Ok(n) => n,
            Err(e) => {
                error!(error = %format!("{e:#}"), "cannot read source registry");
                return report;
            }
        };
        info!(count = names.len(), "validating monitored sources");
        for name in names {
            let shown = log_safe(&name, self.ascii_logs).into_owned();
            match self.transport.resolve_entity(&name).await {
                Ok(found) if found.display_name() == name => {
                    info!(source = %shown, id = found.id, "source validated");
                    report.valid.push(name);
                }
                Ok(found) => {
                    // Posts are matched by display name, so a handle alone never matches.
                    let title = found.display_name().to_string();
                    warn!(
                        source = %shown,
                        register_as = %log_safe(&title, self.ascii_logs),
                        "source resolves under another name; its posts will be ignored"
                    );
                    report
                        .invalid
                        .push((name, format!("posts arrive as '{title}'; register that name")));
                }
                Err(e) => {
                    warn!(source = %shown, error = %e, "source not found or not accessible");
                    report.invalid.push((name, e.to_string()));
                }
            }
        }
        if report.valid.is_empty() {
            warn!("no monitored source could be validated; add one with /addchannel");
        }
        report
    }

    /// Connect, validate, then handle events until `shutdown` resolves.
    /// In-flight handlers get the grace period; the rest are aborted.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let me = self
            .transport
            .connect()
            .await
            .context("connecting transport")?;
        info!(
            id = me.id,
            username = me.username.as_deref().unwrap_or("-"),
            name = %log_safe(&me.display_name, self.ascii_logs),
            "transport connected"
        );
        self.validate_sources().await;

        tokio::pin!(shutdown);
        let mut tasks: JoinSet<RouteOutcome> = JoinSet::new();
        let mut backoff = POLL_BACKOFF_START;

        loop {
            while let Some(done) = tasks.try_join_next() {
                log_join(done);
            }

            let batch = tokio::select! {
                _ = &mut shutdown => break,
                res = self.transport.poll_events() => res,
            };

            match batch {
                Ok(events) => {
                    backoff = POLL_BACKOFF_START;
                    for ev in events {
                        let router = Arc::clone(&self.router);
                        tasks.spawn(async move { router.on_message(ev).await });
                    }
                }
                Err(e) => {
                    warn!(error = %e, retry_in_secs = backoff.as_secs(), "poll failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(POLL_BACKOFF_MAX);
                }
            }
        }

        info!(in_flight = tasks.len(), "shutdown requested; draining handlers");
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(done) = tasks.join_next().await {
                log_join(done);
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                aborted = tasks.len(),
                "grace period elapsed; aborting remaining handlers"
            );
            tasks.abort_all();
        }
        info!("monitor stopped");
        Ok(())
    }
}

fn log_join(res: Result<RouteOutcome, tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!(error = %e, "message handler panicked");
        }
    }
}
