// src/ingest/types.rs
//! Inbound message model shared by the transport, router and dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder submitted to the oracle when a message carries no text.
pub const NON_TEXT_PLACEHOLDER: &str = "[Non-text content]";

/// Display name used when a source has neither a title nor a handle.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Display name used when the sender cannot be described at all.
pub const UNKNOWN_SENDER: &str = "Unknown";

/// The chat a message was posted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Transport-internal numeric id (supergroups/channels carry the `-100` prefix).
    pub id: i64,
    pub title: Option<String>,
    /// Public handle without the leading `@`.
    pub handle: Option<String>,
}

impl SourceDescriptor {
    /// Title, else handle, else `Unknown`. Never fails.
    pub fn display_name(&self) -> &str {
        non_empty(self.title.as_deref())
            .or_else(|| non_empty(self.handle.as_deref()))
            .unwrap_or(UNKNOWN_SOURCE)
    }

    pub fn public_handle(&self) -> Option<&str> {
        non_empty(self.handle.as_deref())
    }
}

/// Whoever authored the message: a user, or a chat posting on its own behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderDescriptor {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub handle: Option<String>,
}

impl SenderDescriptor {
    /// Precedence: first (+ last) name, then title, then `@handle`.
    pub fn display_name(&self) -> Option<String> {
        if let Some(first) = non_empty(self.first_name.as_deref()) {
            return Some(match non_empty(self.last_name.as_deref()) {
                Some(last) => format!("{first} {last}"),
                None => first.to_string(),
            });
        }
        if let Some(title) = non_empty(self.title.as_deref()) {
            return Some(title.to_string());
        }
        non_empty(self.handle.as_deref()).map(|h| format!("@{h}"))
    }
}

/// Kind of non-text payload attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaDescriptor {
    Photo,
    Video,
    Audio,
    Voice,
    Animation,
    Document { file_name: Option<String> },
    Sticker { emoji: Option<String> },
    Other { label: String },
}

impl MediaDescriptor {
    pub fn label(&self) -> String {
        match self {
            MediaDescriptor::Photo => "Photo".into(),
            MediaDescriptor::Video => "Video".into(),
            MediaDescriptor::Audio => "Audio".into(),
            MediaDescriptor::Voice => "Voice".into(),
            MediaDescriptor::Animation => "Animation".into(),
            MediaDescriptor::Document { file_name: Some(n) } => format!("Document ({n})"),
            MediaDescriptor::Document { file_name: None } => "Document".into(),
            MediaDescriptor::Sticker { emoji: Some(e) } => format!("Sticker {e}"),
            MediaDescriptor::Sticker { emoji: None } => "Sticker".into(),
            MediaDescriptor::Other { label } => label.clone(),
        }
    }
}

/// Where a forwarded message originally came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardOrigin {
    pub from_name: Option<String>,
}

impl ForwardOrigin {
    pub fn display_name(&self) -> &str {
        non_empty(self.from_name.as_deref()).unwrap_or(UNKNOWN_SENDER)
    }
}

/// One inbound "new message" event, consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: i64,
    pub source: SourceDescriptor,
    pub sender: Option<SenderDescriptor>,
    pub text: Option<String>,
    pub date: DateTime<Utc>,
    pub media: Option<MediaDescriptor>,
    pub forward: Option<ForwardOrigin>,
}

impl InboundMessage {
    /// Message text, or [`NON_TEXT_PLACEHOLDER`] when empty or absent.
    pub fn text_or_placeholder(&self) -> &str {
        match self.text.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => NON_TEXT_PLACEHOLDER,
        }
    }

    pub fn sender_name(&self) -> String {
        self.sender
            .as_ref()
            .and_then(SenderDescriptor::display_name)
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    }

    pub fn formatted_date(&self) -> String {
        self.date.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(text: Option<&str>) -> InboundMessage {
        InboundMessage {
            id: 1,
            source: SourceDescriptor::default(),
            sender: None,
            text: text.map(str::to_string),
            date: Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap(),
            media: None,
            forward: None,
        }
    }

    #[test]
    fn source_name_prefers_title_then_handle() {
        let mut s = SourceDescriptor {
            id: -100,
            title: Some("Daily News".into()),
            handle: Some("daily".into()),
        };
        assert_eq!(s.display_name(), "Daily News");
        s.title = Some("  ".into());
        assert_eq!(s.display_name(), "daily");
        s.handle = None;
        assert_eq!(s.display_name(), UNKNOWN_SOURCE);
    }

    #[test]
    fn sender_precedence() {
        let full = SenderDescriptor {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            title: Some("Ignored".into()),
            handle: Some("ada".into()),
        };
        assert_eq!(full.display_name().as_deref(), Some("Ada Lovelace"));

        let chat = SenderDescriptor {
            title: Some("Channel Admins".into()),
            handle: Some("admins".into()),
            ..Default::default()
        };
        assert_eq!(chat.display_name().as_deref(), Some("Channel Admins"));

        let handle_only = SenderDescriptor {
            handle: Some("ghost".into()),
            ..Default::default()
        };
        assert_eq!(handle_only.display_name().as_deref(), Some("@ghost"));
        assert_eq!(SenderDescriptor::default().display_name(), None);
    }

    #[test]
    fn empty_text_becomes_placeholder() {
        assert_eq!(msg(None).text_or_placeholder(), NON_TEXT_PLACEHOLDER);
        assert_eq!(msg(Some("   ")).text_or_placeholder(), NON_TEXT_PLACEHOLDER);
        assert_eq!(msg(Some("hello")).text_or_placeholder(), "hello");
    }

    #[test]
    fn date_is_formatted_utc() {
        assert_eq!(msg(None).formatted_date(), "2025-03-04 05:06:07");
        assert_eq!(msg(None).sender_name(), UNKNOWN_SENDER);
    }
}
