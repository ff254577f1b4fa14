// src/store/mod.rs
//! Durable state shared between the relay and its control surface.
//!
//! Reads are never cached: every call fetches the current snapshot so a change
//! made by another process (or another task) is visible to the next event.

pub mod file;

use anyhow::{bail, Result};

pub use file::{JsonQueryStore, JsonSourceStore};

/// Query used until someone sets one.
pub const DEFAULT_QUERY: &str = "Find all messages that have words on it.";

/// Set of monitored source display names.
pub trait SourceRegistry: Send + Sync {
    /// Sorted snapshot of the monitored names.
    fn list(&self) -> Result<Vec<String>>;
    /// `Ok(false)` if the name was already present.
    fn add(&self, name: &str) -> Result<bool>;
    /// `Ok(false)` if the name was not present.
    fn remove(&self, name: &str) -> Result<bool>;

    /// Exact, case-sensitive membership test against a fresh snapshot.
    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.list()?.iter().any(|s| s == name))
    }
}

/// The single current query.
pub trait QueryRegister: Send + Sync {
    /// Current query, or [`DEFAULT_QUERY`] when unset or unreadable.
    fn get(&self) -> String;
    fn set(&self, query: &str) -> Result<()>;
}

/// Trim and drop one leading `@`. Rejects names that end up empty.
pub fn normalize_source_name(raw: &str) -> Result<String> {
    let t = raw.trim();
    let t = t.strip_prefix('@').unwrap_or(t).trim();
    if t.is_empty() {
        bail!("source name is empty");
    }
    Ok(t.to_string())
}
