use crate::models::MessageType;

/// Maximum characters kept in a room's last-message preview
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Label shown in room lists for image messages
pub const IMAGE_PREVIEW: &str = "Photo";

/// Project a message onto the preview stored on its room
pub fn preview(message_type: MessageType, content: &str) -> String {
    match message_type {
        MessageType::Image => IMAGE_PREVIEW.to_string(),
        MessageType::Text | MessageType::System => {
            content.chars().take(PREVIEW_MAX_CHARS).collect()
        }
    }
}

/// Resolve a client-supplied type label, falling back to TEXT
pub fn resolve_message_type(label: Option<&str>) -> MessageType {
    match label {
        None => MessageType::Text,
        Some(raw) => MessageType::parse(raw).unwrap_or_else(|| {
            tracing::warn!(message_type = raw, "unknown message type, storing as TEXT");
            MessageType::Text
        }),
    }
}
