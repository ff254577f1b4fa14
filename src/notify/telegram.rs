// src/notify/telegram.rs
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{Notification, Notifier, LINK_BUTTON_TEXT};
use crate::telegram::types::{InlineKeyboardButton, InlineKeyboardMarkup, SendMessage};
use crate::telegram::BotApi;

/// Sends notifications with the notification bot to one recipient chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    api: BotApi,
    recipient: String,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(api: BotApi, recipient: impl Into<String>) -> Self {
        Self {
            api,
            recipient: recipient.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn payload(&self, n: &Notification) -> SendMessage {
        SendMessage {
            chat_id: self.recipient.clone(),
            text: n.render(),
            parse_mode: Some("Markdown".to_string()),
            reply_markup: n.link.as_ref().map(|url| InlineKeyboardMarkup {
                inline_keyboard: vec![vec![InlineKeyboardButton {
                    text: LINK_BUTTON_TEXT.to_string(),
                    url: url.clone(),
                }]],
            }),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.api
            .send_message(&self.payload(notification), self.timeout)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(link: Option<&str>) -> Notification {
        Notification {
            channel_name: "C".into(),
            handle: None,
            sender_name: "S".into(),
            date: "2024-01-01 00:00:00".into(),
            query: "q".into(),
            link: link.map(Into::into),
            body: "b".into(),
        }
    }

    #[test]
    fn payload_carries_button_only_with_link() {
        let api = BotApi::with_base_url("http://127.0.0.1:1", "t").unwrap();
        let n = TelegramNotifier::new(api, "42");

        let with = serde_json::to_value(n.payload(&note(Some("https://t.me/x/1")))).unwrap();
        assert_eq!(with["chat_id"], "42");
        assert_eq!(with["parse_mode"], "Markdown");
        assert_eq!(
            with["reply_markup"]["inline_keyboard"][0][0]["url"],
            "https://t.me/x/1"
        );

        let without = serde_json::to_value(n.payload(&note(None))).unwrap();
        assert!(without.get("reply_markup").is_none());
    }
}
