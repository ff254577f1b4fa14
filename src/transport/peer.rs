// src/transport/peer.rs
//! Chat-id and media helpers shared by the transports.

use crate::ingest::types::MediaDescriptor;

/// Offset applied to channel and supergroup ids in their public (Bot API) form.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Public handles are 5-32 chars of `[A-Za-z0-9_]`.
pub fn looks_like_handle(name: &str) -> bool {
    (5..=32).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `-100…` id of a channel or supergroup from its bare MTProto id.
pub fn channel_chat_id(bare: i64) -> i64 {
    -(CHANNEL_ID_OFFSET + bare)
}

/// Negative id of a basic group from its bare MTProto id.
pub fn basic_group_chat_id(bare: i64) -> i64 {
    -bare
}

/// Media kind of a document from its MIME type.
pub fn media_from_mime(mime: Option<&str>, file_name: &str) -> MediaDescriptor {
    let mime = mime.unwrap_or_default().to_ascii_lowercase();
    match mime.as_str() {
        "image/gif" => MediaDescriptor::Animation,
        "audio/ogg" => MediaDescriptor::Voice,
        m if m.starts_with("video/") => MediaDescriptor::Video,
        m if m.starts_with("audio/") => MediaDescriptor::Audio,
        m if m.starts_with("image/") => MediaDescriptor::Photo,
        _ => MediaDescriptor::Document {
            file_name: Some(file_name.trim())
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_shape() {
        assert!(looks_like_handle("daily_news"));
        assert!(!looks_like_handle("Gaza Now"));
        assert!(!looks_like_handle("abc"));
    }

    #[test]
    fn marked_ids_match_bot_api_form() {
        assert_eq!(channel_chat_id(1234567890), -1001234567890);
        assert_eq!(basic_group_chat_id(42), -42);
    }

    #[test]
    fn documents_map_by_mime() {
        assert_eq!(media_from_mime(Some("video/mp4"), "clip.mp4"), MediaDescriptor::Video);
        assert_eq!(media_from_mime(Some("audio/ogg"), ""), MediaDescriptor::Voice);
        assert_eq!(media_from_mime(Some("audio/mpeg"), "a.mp3"), MediaDescriptor::Audio);
        assert_eq!(
            media_from_mime(Some("application/pdf"), "report.pdf"),
            MediaDescriptor::Document {
                file_name: Some("report.pdf".into())
            }
        );
        assert_eq!(
            media_from_mime(None, " "),
            MediaDescriptor::Document { file_name: None }
        );
    }
}
