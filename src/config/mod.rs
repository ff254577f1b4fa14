// src/config/mod.rs
//! Runtime configuration: optional TOML file for non-secret settings, then
//! environment overrides. Secrets (tokens, keys, recipient) only come from the
//! environment.

pub mod oracle;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

pub use oracle::OracleConfig;

use crate::store::file::{DEFAULT_QUERY_PATH, DEFAULT_SOURCES_PATH};
use crate::telegram::DEFAULT_API_BASE;

pub const ENV_CONFIG_PATH: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

pub const ENV_TRANSPORT_TOKEN: &str = "TRANSPORT_BOT_TOKEN";
pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_RECIPIENT: &str = "USER_CHAT_ID";
pub const ENV_ORACLE_KEY: &str = "MISTRAL_API_KEY";
pub const ENV_TRANSPORT_KIND: &str = "RELAY_TRANSPORT";
pub const ENV_API_ID: &str = "TELEGRAM_API_ID";
pub const ENV_API_HASH: &str = "TELEGRAM_API_HASH";

pub const DEFAULT_SESSION_PATH: &str = "state/relay.session";

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

/// Where channel posts are read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// A bot that is a member of the monitored channels.
    #[default]
    Bot,
    /// A logged-in user account (MTProto); sees every joined channel.
    UserAccount,
}

impl std::str::FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "bot" => Ok(Self::Bot),
            "user" | "user_account" => Ok(Self::UserAccount),
            other => bail!("unknown transport '{other}' (expected bot or user_account)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    #[serde(skip)]
    pub bot_token: String,
    pub api_base: String,
    /// Long-poll window passed to `getUpdates`, or the idle wait for MTProto updates.
    pub poll_timeout_secs: u64,
    #[serde(skip)]
    pub api_id: Option<i32>,
    #[serde(skip)]
    pub api_hash: Option<String>,
    /// Login phone; prompted for on the terminal when unset.
    #[serde(skip)]
    pub phone: Option<String>,
    pub session_path: PathBuf,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Bot,
            bot_token: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: 30,
            api_id: None,
            api_hash: None,
            phone: None,
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    #[serde(skip)]
    pub bot_token: Option<String>,
    /// Chat id (numeric or `@name`) receiving notifications and forwards.
    #[serde(skip)]
    pub recipient: Option<String>,
    pub api_base: String,
    /// Bound on every outbound delivery call.
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            recipient: None,
            api_base: default_api_base(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub sources_path: PathBuf,
    pub query_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from(DEFAULT_SOURCES_PATH),
            query_path: PathBuf::from(DEFAULT_QUERY_PATH),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address of the admin HTTP API; disabled when unset.
    pub bind: Option<SocketAddr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    /// Render display names and previews as lossy ASCII in logs.
    pub ascii_only: bool,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub transport: TransportConfig,
    pub notify: NotifyConfig,
    pub oracle: OracleConfig,
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
    /// How long in-flight handlers may run after a shutdown request.
    pub shutdown_grace_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            notify: NotifyConfig::default(),
            oracle: OracleConfig::default(),
            storage: StorageConfig::default(),
            admin: AdminConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_grace_secs: 15,
        }
    }
}

impl RelayConfig {
    /// Load from the process environment (call `dotenvy::dotenv()` first).
    pub fn load() -> Result<Self> {
        Self::load_with(|k| std::env::var(k).ok())
    }

    /// Load using `env` as the variable lookup:
    /// 1) `$RELAY_CONFIG_PATH` (must exist)
    /// 2) `config/relay.toml` when present
    /// 3) built-in defaults
    ///
    /// then apply environment overrides and validate.
    pub fn load_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = Self::load_unvalidated_with(env)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Same layering as [`load_with`](Self::load_with) without the transport
    /// checks; for tools that only need the oracle or the stores.
    pub fn load_unvalidated_with<F>(env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match env(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::from_file(&p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(&env)?;
        cfg.oracle.sanitize();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    fn apply_env<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| env(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_TRANSPORT_KIND) {
            self.transport.kind = v.parse()?;
        }
        if let Some(v) = get(ENV_TRANSPORT_TOKEN) {
            self.transport.bot_token = v;
        }
        // The lower-case names are what older .env files use.
        if let Some(v) = get(ENV_API_ID).or_else(|| get("api_id")) {
            let id = v
                .parse::<i32>()
                .map_err(|e| anyhow!("{ENV_API_ID} '{v}' is not a number: {e}"))?;
            self.transport.api_id = Some(id);
        }
        if let Some(v) = get(ENV_API_HASH).or_else(|| get("api_hash")) {
            self.transport.api_hash = Some(v);
        }
        if let Some(v) = get("TELEGRAM_PHONE") {
            self.transport.phone = Some(v);
        }
        if let Some(v) = get("RELAY_SESSION_PATH") {
            self.transport.session_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_BOT_TOKEN) {
            self.notify.bot_token = Some(v);
        }
        if let Some(v) = get(ENV_RECIPIENT) {
            self.notify.recipient = Some(v);
        }
        if let Some(v) = get(ENV_ORACLE_KEY) {
            self.oracle.api_key = Some(v);
        }
        if let Some(v) = get("MISTRAL_MODEL") {
            self.oracle.model = v;
        }
        if let Some(v) = get("TELEGRAM_API_BASE") {
            self.transport.api_base = v.clone();
            self.notify.api_base = v;
        }
        if let Some(v) = get("RELAY_SOURCES_PATH") {
            self.storage.sources_path = PathBuf::from(v);
        }
        if let Some(v) = get("RELAY_QUERY_PATH") {
            self.storage.query_path = PathBuf::from(v);
        }
        if let Some(v) = get("RELAY_ADMIN_ADDR") {
            let addr = v
                .parse::<SocketAddr>()
                .map_err(|e| anyhow!("RELAY_ADMIN_ADDR '{v}' is not a socket address: {e}"))?;
            self.admin.bind = Some(addr);
        }
        if let Some(v) = get("RELAY_LOG_FORMAT") {
            self.logging.json = v.eq_ignore_ascii_case("json");
        }
        if let Some(v) = get("RELAY_LOG_ASCII") {
            self.logging.ascii_only = env_flag(&v);
        }
        if let Some(v) = get("RELAY_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self.transport.kind {
            TransportKind::Bot => {
                if self.transport.bot_token.trim().is_empty() {
                    bail!(
                        "{ENV_TRANSPORT_TOKEN} is not set; the relay cannot receive channel posts without transport credentials"
                    );
                }
                if self.notify.bot_token.as_deref() == Some(self.transport.bot_token.as_str()) {
                    bail!(
                        "{ENV_BOT_TOKEN} and {ENV_TRANSPORT_TOKEN} must be different bots (both would long-poll the same update queue)"
                    );
                }
            }
            TransportKind::UserAccount => {
                if self.transport.api_id.is_none() || self.transport.api_hash.is_none() {
                    bail!(
                        "{ENV_API_ID} and {ENV_API_HASH} are required for the user-account transport"
                    );
                }
            }
        }
        if self.transport.poll_timeout_secs == 0 {
            bail!("transport.poll_timeout_secs must be > 0");
        }
        Ok(())
    }
}

fn env_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn missing_transport_token_is_fatal() {
        let err = RelayConfig::load_with(lookup(&[(ENV_CONFIG_PATH, "")])).unwrap_err();
        assert!(err.to_string().contains(ENV_TRANSPORT_TOKEN), "{err}");
    }

    #[test]
    fn env_fills_secrets_and_oracle_stays_optional() {
        let cfg = RelayConfig::load_with(lookup(&[
            (ENV_TRANSPORT_TOKEN, "111:listener"),
            (ENV_BOT_TOKEN, "222:notifier"),
            (ENV_RECIPIENT, "123456"),
        ]))
        .unwrap();
        assert_eq!(cfg.transport.bot_token, "111:listener");
        assert_eq!(cfg.notify.bot_token.as_deref(), Some("222:notifier"));
        assert_eq!(cfg.notify.recipient.as_deref(), Some("123456"));
        assert!(cfg.oracle.api_key().is_none());
    }

    #[test]
    fn same_token_twice_is_rejected() {
        let err = RelayConfig::load_with(lookup(&[
            (ENV_TRANSPORT_TOKEN, "same"),
            (ENV_BOT_TOKEN, "same"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("must be different"), "{err}");
    }

    #[test]
    fn bad_admin_addr_is_a_config_error() {
        let err = RelayConfig::load_with(lookup(&[
            (ENV_TRANSPORT_TOKEN, "t"),
            ("RELAY_ADMIN_ADDR", "not-an-addr"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("RELAY_ADMIN_ADDR"));
    }

    #[test]
    fn toml_sections_parse_with_defaults() {
        let cfg = RelayConfig::from_toml_str(
            r#"
            shutdown_grace_secs = 3
            [oracle]
            model = "mistral-small"
            [admin]
            bind = "127.0.0.1:9090"
            [logging]
            ascii_only = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.shutdown_grace_secs, 3);
        assert_eq!(cfg.oracle.model, "mistral-small");
        assert_eq!(cfg.oracle.max_tokens, 500);
        assert_eq!(cfg.admin.bind.unwrap().port(), 9090);
        assert!(cfg.logging.ascii_only);
        assert_eq!(cfg.transport.poll_timeout_secs, 30);
    }

    #[test]
    fn unvalidated_load_skips_transport_checks() {
        let cfg =
            RelayConfig::load_unvalidated_with(lookup(&[(ENV_ORACLE_KEY, "k")])).unwrap();
        assert!(cfg.transport.bot_token.is_empty());
        assert_eq!(cfg.oracle.api_key(), Some("k"));
    }

    #[test]
    fn user_account_needs_api_credentials_not_a_bot_token() {
        let err = RelayConfig::load_with(lookup(&[(ENV_TRANSPORT_KIND, "user_account")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_API_ID), "{err}");

        let cfg = RelayConfig::load_with(lookup(&[
            (ENV_TRANSPORT_KIND, "user"),
            ("api_id", "12345"),
            ("api_hash", "abcdef"),
            ("RELAY_SESSION_PATH", "state/me.session"),
        ]))
        .unwrap();
        assert_eq!(cfg.transport.kind, TransportKind::UserAccount);
        assert_eq!(cfg.transport.api_id, Some(12345));
        assert_eq!(cfg.transport.api_hash.as_deref(), Some("abcdef"));
        assert_eq!(cfg.transport.session_path, PathBuf::from("state/me.session"));
    }

    #[test]
    fn bad_transport_settings_are_config_errors() {
        assert!(RelayConfig::load_with(lookup(&[(ENV_TRANSPORT_KIND, "carrier-pigeon")])).is_err());
        let err = RelayConfig::load_with(lookup(&[
            (ENV_TRANSPORT_KIND, "user_account"),
            (ENV_API_ID, "twelve"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(ENV_API_ID), "{err}");
    }

    #[test]
    fn transport_kind_reads_from_toml() {
        let cfg = RelayConfig::from_toml_str("[transport]\nkind = \"user_account\"\n").unwrap();
        assert_eq!(cfg.transport.kind, TransportKind::UserAccount);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(env_flag("1"));
        assert!(env_flag("TRUE"));
        assert!(!env_flag("0"));
        assert!(!env_flag("nope"));
    }
}
