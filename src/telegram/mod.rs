// src/telegram/mod.rs
//! Thin Bot API client shared by the transport, the notifier and the control bot.

pub mod types;

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use types::{ApiResponse, Chat, ForwardMessage, Message, SendMessage, Update, User};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Replies longer than this are split before sending.
pub const REPLY_CHUNK_CHARS: usize = 3500;

/// A `getUpdates` reply decoded entry by entry.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    /// Offset acknowledging every entry in the batch, decodable or not.
    pub next_offset: Option<i64>,
    pub updates: Vec<Update>,
}

impl UpdateBatch {
    /// Entries that do not decode are skipped; their ids still advance the offset.
    pub fn decode(raw: Vec<Value>) -> Self {
        let mut batch = Self::default();
        for entry in raw {
            let id = entry.get("update_id").and_then(Value::as_i64);
            if let Some(id) = id {
                batch.next_offset = Some(batch.next_offset.map_or(id + 1, |o| o.max(id + 1)));
            }
            match serde_json::from_value::<Update>(entry) {
                Ok(update) => batch.updates.push(update),
                Err(e) => warn!(update_id = ?id, error = %e, "skipping undecodable update"),
            }
        }
        batch
    }
}

/// One bot identity talking to the Bot API over HTTPS.
#[derive(Clone)]
pub struct BotApi {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("base", &self.base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl BotApi {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(DEFAULT_API_BASE, token)
    }

    /// Point at another server (a local Bot API server, or a fake one in tests).
    pub fn with_base_url(base: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("channel-relay/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building Bot API HTTP client")?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base, self.token)
    }

    /// POST `body` to `method`; success means HTTP 200 and `ok: true`.
    /// Errors never include the request URL (it carries the token).
    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self.http.post(self.method_url(method)).json(body);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| anyhow!("{method}: {}", e.without_url()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            bail!("{method}: HTTP {status}: {}", text.trim());
        }
        let parsed: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| anyhow!("{method}: decoding reply: {}", e.without_url()))?;
        if !parsed.ok {
            bail!(
                "{method}: {}",
                parsed.description.as_deref().unwrap_or("request rejected")
            );
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("{method}: reply has no result"))
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({}), Some(Duration::from_secs(10)))
            .await
    }

    /// Long-poll for updates after `offset`. The HTTP timeout exceeds the poll window.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout_secs: u64,
        allowed_updates: &[&str],
    ) -> Result<UpdateBatch> {
        let body = json!({
            "offset": offset,
            "timeout": poll_timeout_secs,
            "allowed_updates": allowed_updates,
        });
        let raw: Vec<Value> = self
            .call(
                "getUpdates",
                &body,
                Some(Duration::from_secs(poll_timeout_secs + 10)),
            )
            .await?;
        Ok(UpdateBatch::decode(raw))
    }

    /// `chat_id` may be numeric or `@handle`.
    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat> {
        self.call(
            "getChat",
            &json!({ "chat_id": chat_id }),
            Some(Duration::from_secs(10)),
        )
        .await
    }

    pub async fn send_message(&self, msg: &SendMessage, timeout: Duration) -> Result<Message> {
        self.call("sendMessage", msg, Some(timeout)).await
    }

    /// Send a plain reply, split into chunks below Telegram's size limit.
    pub async fn send_text(&self, chat_id: &str, text: &str, timeout: Duration) -> Result<()> {
        for chunk in split_message(text, REPLY_CHUNK_CHARS) {
            self.send_message(&SendMessage::plain(chat_id, chunk), timeout)
                .await?;
        }
        Ok(())
    }

    pub async fn forward_message(&self, fwd: &ForwardMessage, timeout: Duration) -> Result<Message> {
        self.call("forwardMessage", fwd, Some(timeout)).await
    }
}

/// Split `text` into pieces of at most `max_chars` characters, preferring
/// newline then space boundaries.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let cut = match remaining.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(remaining.to_string());
                break;
            }
        };
        let window = &remaining[..cut];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecodable_updates_are_skipped_but_acknowledged() {
        let batch = UpdateBatch::decode(vec![
            json!({"update_id": 7, "channel_post": {"message_id": "not a number"}}),
            json!({"update_id": 5}),
            json!({"no_id": true}),
        ]);
        assert_eq!(batch.next_offset, Some(8));
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].update_id, 5);
        assert!(UpdateBatch::decode(Vec::new()).next_offset.is_none());
    }

    #[test]
    fn method_url_joins_base_and_token() {
        let api = BotApi::with_base_url("http://127.0.0.1:9/", "123:abc").unwrap();
        assert_eq!(api.method_url("getMe"), "http://127.0.0.1:9/bot123:abc/getMe");
    }

    #[test]
    fn debug_output_hides_token() {
        let api = BotApi::new("123:secret").unwrap();
        let dbg = format!("{api:?}");
        assert!(!dbg.contains("secret"));
    }

    #[test]
    fn split_short_text_is_single_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello"]);
        assert_eq!(split_message("", 10), vec![""]);
    }

    #[test]
    fn split_prefers_newlines() {
        let msg = format!("{}\n{}", "a".repeat(20), "b".repeat(30));
        let chunks = split_message(&msg, 40);
        assert_eq!(chunks, vec!["a".repeat(20), "b".repeat(30)]);
    }

    #[test]
    fn split_counts_chars_not_bytes() {
        let msg = "ё".repeat(25);
        let chunks = split_message(&msg, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), msg);
    }
}
