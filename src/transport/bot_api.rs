// src/transport/bot_api.rs
//! Bot API transport: long-polls `getUpdates` for a bot that is a member of
//! the monitored channels.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::debug;

use super::peer::looks_like_handle;
use super::{Forwarder, SelfIdentity, Transport};
use crate::ingest::types::{InboundMessage, SourceDescriptor};
use crate::store::normalize_source_name;
use crate::telegram::types::ForwardMessage;
use crate::telegram::BotApi;

const ALLOWED_UPDATES: &[&str] = &["channel_post", "message"];

pub struct BotApiTransport {
    api: BotApi,
    poll_timeout_secs: u64,
    /// Where fallback forwards go; forwarding is unavailable without it.
    self_chat: Option<String>,
    forward_timeout: Duration,
    offset: Mutex<i64>,
    /// Chats observed in updates, keyed by display name and by handle.
    seen: Mutex<HashMap<String, SourceDescriptor>>,
}

impl BotApiTransport {
    pub fn new(api: BotApi, poll_timeout_secs: u64) -> Self {
        Self {
            api,
            poll_timeout_secs,
            self_chat: None,
            forward_timeout: Duration::from_secs(10),
            offset: Mutex::new(0),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_self_chat(mut self, chat: Option<String>, timeout: Duration) -> Self {
        self.self_chat = chat;
        self.forward_timeout = timeout;
        self
    }

    fn remember(&self, source: &SourceDescriptor) {
        let Ok(mut seen) = self.seen.lock() else {
            return;
        };
        seen.insert(source.display_name().to_string(), source.clone());
        if let Some(h) = source.public_handle() {
            seen.insert(h.to_string(), source.clone());
        }
    }

    fn lookup_seen(&self, name: &str) -> Option<SourceDescriptor> {
        self.seen.lock().ok()?.get(name).cloned()
    }
}

#[async_trait]
impl Transport for BotApiTransport {
    async fn connect(&self) -> Result<SelfIdentity> {
        let me = self.api.get_me().await?;
        let display_name = match &me.last_name {
            Some(last) => format!("{} {last}", me.first_name),
            None => me.first_name.clone(),
        };
        Ok(SelfIdentity {
            id: me.id,
            username: me.username,
            display_name,
        })
    }

    async fn poll_events(&self) -> Result<Vec<InboundMessage>> {
        let offset = *self
            .offset
            .lock()
            .map_err(|_| anyhow!("offset lock poisoned"))?;
        let batch = self
            .api
            .get_updates(offset, self.poll_timeout_secs, ALLOWED_UPDATES)
            .await?;

        if let Some(next) = batch.next_offset {
            let mut guard = self
                .offset
                .lock()
                .map_err(|_| anyhow!("offset lock poisoned"))?;
            *guard = (*guard).max(next);
        }

        let mut out = Vec::with_capacity(batch.updates.len());
        for upd in batch.updates {
            let Some(msg) = upd.into_message() else {
                continue;
            };
            if msg.chat.kind == "private" {
                debug!(chat_id = msg.chat.id, "skipping private chat message");
                continue;
            }
            let inbound = msg.into_inbound();
            self.remember(&inbound.source);
            out.push(inbound);
        }
        Ok(out)
    }

    async fn resolve_entity(&self, name: &str) -> Result<SourceDescriptor> {
        let name = normalize_source_name(name)?;
        if let Some(found) = self.lookup_seen(&name) {
            return Ok(found);
        }
        if !looks_like_handle(&name) {
            bail!("'{name}' has not posted since startup and is not a public handle");
        }
        let chat = self.api.get_chat(&format!("@{name}")).await?;
        let descriptor = chat.descriptor();
        self.remember(&descriptor);
        Ok(descriptor)
    }
}

#[async_trait]
impl Forwarder for BotApiTransport {
    async fn forward_to_self(&self, source: &SourceDescriptor, message_id: i64) -> Result<()> {
        let Some(chat) = &self.self_chat else {
            bail!("no self chat configured for forwarding");
        };
        let fwd = ForwardMessage {
            chat_id: chat.clone(),
            from_chat_id: source.id,
            message_id,
        };
        self.api.forward_message(&fwd, self.forward_timeout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seen_chats_resolve_without_network() {
        let api = BotApi::with_base_url("http://127.0.0.1:1", "t").unwrap();
        let t = BotApiTransport::new(api, 1);
        let src = SourceDescriptor {
            id: -1001,
            title: Some("Gaza Now".into()),
            handle: Some("gazanow".into()),
        };
        t.remember(&src);
        assert_eq!(t.resolve_entity("Gaza Now").await.unwrap(), src);
        assert_eq!(t.resolve_entity("@gazanow").await.unwrap(), src);
        assert!(t.resolve_entity("Other Title").await.is_err());
    }

    #[tokio::test]
    async fn forwarding_without_self_chat_fails() {
        let api = BotApi::with_base_url("http://127.0.0.1:1", "t").unwrap();
        let t = BotApiTransport::new(api, 1);
        assert!(t
            .forward_to_self(&SourceDescriptor::default(), 1)
            .await
            .is_err());
    }
}
