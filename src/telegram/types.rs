// src/telegram/types.rs
//! The subset of Bot API objects the relay reads or writes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::types::{
    ForwardOrigin, InboundMessage, MediaDescriptor, SenderDescriptor, SourceDescriptor,
};

/// Envelope of every Bot API reply.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

impl Update {
    /// Posts in channels and messages in groups both count as source messages.
    pub fn into_message(self) -> Option<Message> {
        self.channel_post.or(self.message)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Chat {
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: self.id,
            // Private chats have no title; fall back to the person's name.
            title: self.title.clone().or_else(|| self.person_name()),
            handle: self.username.clone(),
        }
    }

    fn person_name(&self) -> Option<String> {
        let first = self.first_name.as_deref()?;
        Some(match self.last_name.as_deref() {
            Some(last) => format!("{first} {last}"),
            None => first.to_string(),
        })
    }

    fn as_sender(&self) -> SenderDescriptor {
        SenderDescriptor {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            title: self.title.clone(),
            handle: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    fn as_sender(&self) -> SenderDescriptor {
        SenderDescriptor {
            first_name: Some(self.first_name.clone()),
            last_name: self.last_name.clone(),
            title: None,
            handle: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageOrigin {
    User { sender_user: User },
    HiddenUser { sender_user_name: String },
    Chat { sender_chat: Chat },
    Channel { chat: Chat },
}

impl MessageOrigin {
    fn from_name(&self) -> Option<String> {
        match self {
            MessageOrigin::User { sender_user } => sender_user.as_sender().display_name(),
            MessageOrigin::HiddenUser { sender_user_name } => Some(sender_user_name.clone()),
            MessageOrigin::Chat { sender_chat } => sender_chat.as_sender().display_name(),
            MessageOrigin::Channel { chat } => chat.as_sender().display_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sticker {
    #[serde(default)]
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub sender_chat: Option<Chat>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub forward_origin: Option<MessageOrigin>,
    #[serde(default)]
    pub photo: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub video: Option<serde_json::Value>,
    #[serde(default)]
    pub audio: Option<serde_json::Value>,
    #[serde(default)]
    pub voice: Option<serde_json::Value>,
    #[serde(default)]
    pub animation: Option<serde_json::Value>,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub sticker: Option<Sticker>,
}

impl Message {
    fn media(&self) -> Option<MediaDescriptor> {
        // Animations also carry a `document`; check them first.
        if self.animation.is_some() {
            return Some(MediaDescriptor::Animation);
        }
        if self.photo.is_some() {
            return Some(MediaDescriptor::Photo);
        }
        if self.video.is_some() {
            return Some(MediaDescriptor::Video);
        }
        if self.audio.is_some() {
            return Some(MediaDescriptor::Audio);
        }
        if self.voice.is_some() {
            return Some(MediaDescriptor::Voice);
        }
        if let Some(s) = &self.sticker {
            return Some(MediaDescriptor::Sticker {
                emoji: s.emoji.clone(),
            });
        }
        self.document.as_ref().map(|d| MediaDescriptor::Document {
            file_name: d.file_name.clone(),
        })
    }

    fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.date, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Map to the transport-neutral model. Captions count as text.
    pub fn into_inbound(self) -> InboundMessage {
        let sender = match (&self.from, &self.sender_chat) {
            (_, Some(chat)) => Some(chat.as_sender()),
            (Some(user), None) => Some(user.as_sender()),
            (None, None) => None,
        };
        let media = self.media();
        let forward = self.forward_origin.as_ref().map(|o| ForwardOrigin {
            from_name: o.from_name(),
        });
        let date = self.timestamp();
        InboundMessage {
            id: self.message_id,
            source: self.chat.descriptor(),
            sender,
            text: self.text.or(self.caption),
            date,
            media,
            forward,
        }
    }
}

/// Body of `sendMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessage {
    pub chat_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

impl SendMessage {
    pub fn plain(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            parse_mode: None,
            reply_markup: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub url: String,
}

/// Body of `forwardMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct ForwardMessage {
    pub chat_id: String,
    pub from_chat_id: i64,
    pub message_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_post_with_caption_and_photo() {
        let raw = json!({
            "update_id": 10,
            "channel_post": {
                "message_id": 42,
                "date": 1_700_000_000,
                "chat": {"id": -1001234567890i64, "type": "channel", "title": "Daily", "username": "daily"},
                "sender_chat": {"id": -1001234567890i64, "type": "channel", "title": "Daily"},
                "caption": "look at this",
                "photo": [{"file_id": "a"}]
            }
        });
        let upd: Update = serde_json::from_value(raw).unwrap();
        let msg = upd.into_message().unwrap().into_inbound();
        assert_eq!(msg.id, 42);
        assert_eq!(msg.source.display_name(), "Daily");
        assert_eq!(msg.source.public_handle(), Some("daily"));
        assert_eq!(msg.text.as_deref(), Some("look at this"));
        assert_eq!(msg.media, Some(MediaDescriptor::Photo));
        assert_eq!(msg.sender_name(), "Daily");
    }

    #[test]
    fn forwarded_group_message_from_user() {
        let raw = json!({
            "update_id": 11,
            "message": {
                "message_id": 7,
                "date": 1_700_000_100,
                "chat": {"id": -100555, "type": "supergroup", "title": "Group"},
                "from": {"id": 1, "is_bot": false, "first_name": "Ada", "last_name": "L"},
                "forward_origin": {"type": "hidden_user", "sender_user_name": "Someone", "date": 1},
                "sticker": {"emoji": "🔥"}
            }
        });
        let upd: Update = serde_json::from_value(raw).unwrap();
        let msg = upd.into_message().unwrap().into_inbound();
        assert_eq!(msg.sender_name(), "Ada L");
        assert_eq!(msg.forward.unwrap().display_name(), "Someone");
        assert_eq!(
            msg.media,
            Some(MediaDescriptor::Sticker {
                emoji: Some("🔥".into())
            })
        );
        assert!(msg.text.is_none());
    }

    #[test]
    fn updates_without_messages_are_skipped() {
        let upd: Update =
            serde_json::from_value(json!({"update_id": 3, "edited_message": {}})).unwrap();
        assert!(upd.into_message().is_none());
    }

    #[test]
    fn send_message_omits_absent_fields() {
        let body = serde_json::to_value(SendMessage::plain("1", "hi")).unwrap();
        assert_eq!(body, json!({"chat_id": "1", "text": "hi"}));
    }
}
