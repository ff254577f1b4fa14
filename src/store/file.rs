// src/store/file.rs
//! JSON-file stores with whole-file atomic replace (write temp, then rename).

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::{normalize_source_name, QueryRegister, SourceRegistry, DEFAULT_QUERY};

pub const DEFAULT_SOURCES_PATH: &str = "state/channels.json";
pub const DEFAULT_QUERY_PATH: &str = "state/user_query.json";

/// Monitored sources persisted as `{"channels": [...]}`.
#[derive(Debug)]
pub struct JsonSourceStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process; readers never take it.
    write_lock: Mutex<()>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SourcesDoc {
    channels: Vec<String>,
}

// Hand-edited files may be a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum SourcesAny {
    Doc(SourcesDoc),
    List(Vec<String>),
}

impl JsonSourceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_set(&self) -> Result<BTreeSet<String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        let any: SourcesAny = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        let items = match any {
            SourcesAny::Doc(d) => d.channels,
            SourcesAny::List(v) => v,
        };
        Ok(clean_set(items))
    }

    fn write_set(&self, set: &BTreeSet<String>) -> Result<()> {
        let doc = SourcesDoc {
            channels: set.iter().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&doc).context("serializing channel list")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("writing {}", self.path.display()))
    }

    fn modify<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeSet<String>) -> bool,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("source store lock poisoned"))?;
        let mut set = self.read_set()?;
        if !f(&mut set) {
            return Ok(false);
        }
        self.write_set(&set)?;
        Ok(true)
    }
}

impl SourceRegistry for JsonSourceStore {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.read_set()?.into_iter().collect())
    }

    fn add(&self, name: &str) -> Result<bool> {
        let name = normalize_source_name(name)?;
        self.modify(|set| set.insert(name))
    }

    fn remove(&self, name: &str) -> Result<bool> {
        let name = normalize_source_name(name)?;
        self.modify(|set| set.remove(&name))
    }
}

/// Current query persisted as `{"query": "..."}`.
#[derive(Debug)]
pub struct JsonQueryStore {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueryDoc {
    query: String,
}

impl JsonQueryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let doc: QueryDoc = serde_json::from_str(&raw).ok()?;
        (!doc.query.trim().is_empty()).then_some(doc.query)
    }
}

impl QueryRegister for JsonQueryStore {
    fn get(&self) -> String {
        self.read().unwrap_or_else(|| DEFAULT_QUERY.to_string())
    }

    fn set(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            bail!("query is empty");
        }
        let doc = QueryDoc {
            query: query.to_string(),
        };
        let json = serde_json::to_vec_pretty(&doc).context("serializing query")?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

fn clean_set(items: Vec<String>) -> BTreeSet<String> {
    items
        .into_iter()
        .filter_map(|it| normalize_source_name(&it).ok())
        .collect()
}

/// Write `bytes` next to `path` under a unique temp name, fsync, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    let tmp = path.with_file_name(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    let res = (|| {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}
