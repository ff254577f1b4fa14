//! channel-relay: watches Telegram channels, asks an LLM whether each new post
//! matches the current query and relays the relevant ones to one recipient.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use channel_relay::api::{self, AdminState};
use channel_relay::config::RelayConfig;
use channel_relay::control::{ControlBot, ControlSurface};
use channel_relay::ingest::monitor::Monitor;
use channel_relay::ingest::IngestRouter;
use channel_relay::logging;
use channel_relay::metrics::Metrics;
use channel_relay::notify::{Dispatcher, Notifier, TelegramNotifier};
use channel_relay::oracle::RelevanceOracle;
use channel_relay::store::{JsonQueryStore, JsonSourceStore, QueryRegister, SourceRegistry};
use channel_relay::telegram::BotApi;
use channel_relay::transport;

#[tokio::main]
async fn main() {
    // Load .env when present; real environment variables win.
    let _ = dotenvy::dotenv();

    let cfg = match RelayConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init(&cfg.logging) {
        eprintln!("logging setup failed: {e:#}");
        std::process::exit(2);
    }

    if let Err(e) = run(cfg).await {
        error!(error = %format!("{e:#}"), "relay stopped with an error");
        std::process::exit(1);
    }
}

async fn run(cfg: RelayConfig) -> Result<()> {
    let metrics = Metrics::init()?;

    let sources: Arc<dyn SourceRegistry> =
        Arc::new(JsonSourceStore::new(&cfg.storage.sources_path));
    let query: Arc<dyn QueryRegister> = Arc::new(JsonQueryStore::new(&cfg.storage.query_path));

    let oracle = RelevanceOracle::from_config(&cfg.oracle)?;
    if oracle.is_enabled() {
        info!(provider = oracle.provider_name(), model = %cfg.oracle.model, "AI relevance filtering enabled");
    } else {
        warn!("AI relevance filtering disabled (no MISTRAL_API_KEY); every message counts as relevant");
    }
    info!(query = %query.get(), "current search query");

    let dispatch_timeout = Duration::from_secs(cfg.notify.timeout_secs);
    let transports = transport::build(&cfg)?;
    info!(kind = ?cfg.transport.kind, "transport configured");

    let notify_api = cfg
        .notify
        .bot_token
        .as_deref()
        .map(|t| BotApi::with_base_url(&cfg.notify.api_base, t))
        .transpose()?;
    let primary: Option<Arc<dyn Notifier>> = match (&notify_api, &cfg.notify.recipient) {
        (Some(api), Some(recipient)) => Some(Arc::new(
            TelegramNotifier::new(api.clone(), recipient.clone())
                .with_timeout(cfg.notify.timeout_secs),
        )),
        _ => {
            warn!("BOT_TOKEN or USER_CHAT_ID missing; relevant messages will only be forwarded");
            None
        }
    };
    let dispatcher = Dispatcher::new(
        primary,
        Some(transports.forwarder.clone()),
        dispatch_timeout,
    );

    let router = Arc::new(
        IngestRouter::new(sources.clone(), query.clone(), oracle.clone(), dispatcher)
            .with_ascii_logs(cfg.logging.ascii_only),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };
    let mut background = Vec::new();

    match notify_api {
        Some(api) => {
            let surface = Arc::new(ControlSurface::new(
                sources.clone(),
                query.clone(),
                oracle.clone(),
                cfg.notify.recipient.clone(),
            )
            .with_resolver(transports.transport.clone())
            .with_directory(transports.directory.clone()));
            let bot = ControlBot::new(api, surface, cfg.transport.poll_timeout_secs)
                .with_reply_timeout(dispatch_timeout);
            background.push(tokio::spawn(bot.run(stopped(stop_rx.clone()))));
        }
        None => info!("no BOT_TOKEN; control bot not started"),
    }

    if let Some(addr) = cfg.admin.bind {
        let app = api::router(
            AdminState {
                sources: sources.clone(),
                query: query.clone(),
            },
            Some(&metrics),
        );
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding admin API on {addr}"))?;
        info!(%addr, "admin API listening");
        let shutdown = stopped(stop_rx.clone());
        background.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "admin API failed");
            }
        }));
    }

    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received; shutting down"),
            Err(e) => {
                error!(error = %e, "cannot listen for Ctrl-C; stop the process externally");
                std::future::pending::<()>().await;
            }
        }
    };

    let monitor = Monitor::new(
        transports.transport,
        router,
        sources,
        Duration::from_secs(cfg.shutdown_grace_secs),
    )
    .with_ascii_logs(cfg.logging.ascii_only);
    let result = monitor.run(ctrl_c).await;

    let _ = stop_tx.send(true);
    for handle in background {
        if tokio::time::timeout(Duration::from_secs(cfg.shutdown_grace_secs), handle)
            .await
            .is_err()
        {
            warn!("background task did not stop in time");
        }
    }
    result
}
