// src/logging.rs
//! Tracing setup plus the ASCII-safe rendering used for log fields.

use std::borrow::Cow;
use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Max characters of message text shown in log previews.
pub const PREVIEW_CHARS: usize = 100;

/// Install the global subscriber: compact or JSON on stderr, plus an optional log file.
/// `RUST_LOG` wins over the default `info` filter.
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match &cfg.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    let (compact, json) = if cfg.json {
        (None, Some(fmt::layer().json().with_target(false)))
    } else {
        (Some(fmt::layer().compact().with_target(false)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(json)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

/// Replace every non-ASCII char with `?`. Borrowed when already ASCII.
pub fn ascii_lossy(s: &str) -> Cow<'_, str> {
    if s.is_ascii() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect())
}

/// Render a value for a log field, ASCII-only when the operator asked for it.
pub fn log_safe(s: &str, ascii_only: bool) -> Cow<'_, str> {
    if ascii_only {
        ascii_lossy(s)
    } else {
        Cow::Borrowed(s)
    }
}

/// First [`PREVIEW_CHARS`] characters, with `...` when cut.
pub fn preview(s: &str) -> Cow<'_, str> {
    match s.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => Cow::Owned(format!("{}...", &s[..idx])),
        None => Cow::Borrowed(s),
    }
}
