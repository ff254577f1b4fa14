// src/notify/mod.rs
//! Notification model, rendering and delivery.

pub mod dispatch;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::ingest::types::{InboundMessage, SourceDescriptor};

pub use dispatch::{DeliveryPath, DeliveryResult, Dispatcher};
pub use telegram::TelegramNotifier;

pub const LINK_BUTTON_TEXT: &str = "🔗 Open Original Message";

/// Everything the recipient sees about one relevant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_name: String,
    pub handle: Option<String>,
    pub sender_name: String,
    pub date: String,
    pub query: String,
    pub link: Option<String>,
    pub body: String,
}

impl Notification {
    pub fn from_message(msg: &InboundMessage, query: &str) -> Self {
        Self {
            channel_name: msg.source.display_name().to_string(),
            handle: msg.source.public_handle().map(str::to_string),
            sender_name: msg.sender_name(),
            date: msg.formatted_date(),
            query: query.to_string(),
            link: deep_link(&msg.source, msg.id),
            body: msg.text_or_placeholder().to_string(),
        }
    }

    /// Legacy-Markdown body. Every dynamic field is escaped.
    pub fn render(&self) -> String {
        let mut out = String::from("🎯 *RELEVANT MESSAGE FOUND*\n\n");
        out.push_str(&format!("*Channel:* {}\n", escape_markdown(&self.channel_name)));
        if let Some(h) = &self.handle {
            out.push_str(&format!("*Username:* @{}\n", escape_markdown(h)));
        }
        out.push_str(&format!("*Sender:* {}\n", escape_markdown(&self.sender_name)));
        out.push_str(&format!("*Date:* {}\n", self.date));
        out.push_str(&format!("*Query:* {}\n\n", escape_markdown(&self.query)));
        if let Some(link) = &self.link {
            out.push_str(&format!("🔗 [Click to view original message]({link})\n\n"));
        }
        out.push_str("*Message:*\n");
        out.push_str(&escape_markdown(&self.body));
        out
    }
}

/// `t.me` link to a message: by handle when public, else by internal id
/// with the `-100` prefix stripped. `None` when the id is unknown.
pub fn deep_link(source: &SourceDescriptor, message_id: i64) -> Option<String> {
    if let Some(handle) = source.public_handle() {
        return Some(format!("https://t.me/{handle}/{message_id}"));
    }
    if source.id == 0 {
        return None;
    }
    let id = source.id.to_string();
    let stripped = id
        .strip_prefix("-100")
        .or_else(|| id.strip_prefix('-'))
        .unwrap_or(&id);
    Some(format!("https://t.me/c/{stripped}/{message_id}"))
}

/// Escape the legacy-Markdown control characters `_ * ` [`.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Primary delivery channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn src(id: i64, handle: Option<&str>) -> SourceDescriptor {
        SourceDescriptor {
            id,
            title: Some("Chan".into()),
            handle: handle.map(Into::into),
        }
    }

    #[test]
    fn links_by_handle_and_by_internal_id() {
        assert_eq!(
            deep_link(&src(-1009, Some("abc")), 42).as_deref(),
            Some("https://t.me/abc/42")
        );
        assert_eq!(
            deep_link(&src(-1001234567890, None), 7).as_deref(),
            Some("https://t.me/c/1234567890/7")
        );
        assert_eq!(
            deep_link(&src(-4242, None), 1).as_deref(),
            Some("https://t.me/c/4242/1")
        );
        assert_eq!(deep_link(&src(0, None), 1), None);
    }

    #[test]
    fn escaping_covers_markdown_controls() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
        assert_eq!(escape_markdown("שלום"), "שלום");
    }

    #[test]
    fn render_includes_fields_and_keeps_unicode() {
        let msg = InboundMessage {
            id: 5,
            source: SourceDescriptor {
                id: -1001,
                title: Some("חדשות".into()),
                handle: Some("my_news".into()),
            },
            sender: None,
            text: Some("*breaking* news".into()),
            date: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            media: None,
            forward: None,
        };
        let n = Notification::from_message(&msg, "news");
        let text = n.render();
        assert!(text.starts_with("🎯 *RELEVANT MESSAGE FOUND*"));
        assert!(text.contains("*Channel:* חדשות\n"));
        assert!(text.contains("*Username:* @my\\_news\n"));
        assert!(text.contains("*Sender:* Unknown\n"));
        assert!(text.contains("*Date:* 2024-03-01 12:00:00\n"));
        assert!(text.contains("(https://t.me/my_news/5)"));
        assert!(text.ends_with("\\*breaking\\* news"));
    }
}
