// src/transport/mod.rs
//! Real-time messaging transport: where inbound channel posts come from.

pub mod bot_api;
pub mod peer;
#[cfg(feature = "user-account")]
pub mod user_account;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{RelayConfig, TransportKind};
use crate::ingest::types::{InboundMessage, SourceDescriptor};
use crate::telegram::BotApi;

pub use bot_api::BotApiTransport;
#[cfg(feature = "user-account")]
pub use user_account::UserAccountTransport;

/// The identity the transport is logged in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Authenticate once. Failure is fatal for the monitor.
    async fn connect(&self) -> Result<SelfIdentity>;

    /// Next batch of new-message events; may be empty after a quiet poll window.
    async fn poll_events(&self) -> Result<Vec<InboundMessage>>;

    /// Look up a source by display name or handle.
    async fn resolve_entity(&self, name: &str) -> Result<SourceDescriptor>;
}

/// Fallback delivery: forward the original message to the transport's own
/// destination.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward_to_self(&self, source: &SourceDescriptor, message_id: i64) -> Result<()>;
}

/// Channels and groups the logged-in account belongs to.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<SourceDescriptor>>;
}

/// One transport seen through each of its roles.
#[derive(Clone)]
pub struct TransportSet {
    pub transport: Arc<dyn Transport>,
    pub forwarder: Arc<dyn Forwarder>,
    /// Only account-backed transports can list their chats.
    pub directory: Option<Arc<dyn ChatDirectory>>,
}

/// Build the configured transport.
pub fn build(cfg: &RelayConfig) -> Result<TransportSet> {
    let forward_timeout = Duration::from_secs(cfg.notify.timeout_secs);
    match cfg.transport.kind {
        TransportKind::Bot => {
            let t = Arc::new(
                BotApiTransport::new(
                    BotApi::with_base_url(&cfg.transport.api_base, &cfg.transport.bot_token)?,
                    cfg.transport.poll_timeout_secs,
                )
                .with_self_chat(cfg.notify.recipient.clone(), forward_timeout),
            );
            Ok(TransportSet {
                transport: t.clone(),
                forwarder: t,
                directory: None,
            })
        }
        TransportKind::UserAccount => build_user_account(cfg),
    }
}

#[cfg(feature = "user-account")]
fn build_user_account(cfg: &RelayConfig) -> Result<TransportSet> {
    let t = Arc::new(UserAccountTransport::from_config(&cfg.transport)?);
    Ok(TransportSet {
        transport: t.clone(),
        forwarder: t.clone(),
        directory: Some(t),
    })
}

#[cfg(not(feature = "user-account"))]
fn build_user_account(_cfg: &RelayConfig) -> Result<TransportSet> {
    anyhow::bail!(
        "transport kind user_account needs a build with `--features user-account`"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_transport_has_no_directory() {
        let mut cfg = RelayConfig::default();
        cfg.transport.bot_token = "111:listen".into();
        let set = build(&cfg).unwrap();
        assert!(set.directory.is_none());
    }

    #[cfg(not(feature = "user-account"))]
    #[test]
    fn user_account_needs_the_feature() {
        let mut cfg = RelayConfig::default();
        cfg.transport.kind = TransportKind::UserAccount;
        let err = build(&cfg).err().expect("build must fail");
        assert!(err.to_string().contains("user-account"), "{err}");
    }
}
