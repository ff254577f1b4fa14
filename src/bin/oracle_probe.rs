// src/bin/oracle_probe.rs
//! Quick manual check of the oracle settings:
//! `MISTRAL_API_KEY=... cargo run --bin oracle-probe`

use channel_relay::config::RelayConfig;
use channel_relay::{logging, run_oracle_probe};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cfg = match RelayConfig::load_unvalidated_with(|k| std::env::var(k).ok()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e:#}");
            std::process::exit(2);
        }
    };
    if let Err(e) = logging::init(&cfg.logging) {
        eprintln!("logging disabled: {e:#}");
    }

    match run_oracle_probe(&cfg).await {
        Ok(v) => println!("verdict: {v:?}"),
        Err(e) => {
            eprintln!("oracle probe failed: {e:#}");
            std::process::exit(1);
        }
    }
}
