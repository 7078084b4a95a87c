use std::fmt;

use chrono::{DateTime, Duration, Utc};

use super::chat::ChatId;

/// Largest clock difference tolerated when matching a server echo to a placeholder.
pub const ECHO_MATCH_WINDOW_SECS: i64 = 5;

/// Identity of a message: either assigned by the server or a local placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(String),
    Local(u64),
}

impl MessageId {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Server(id) => Some(id),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => f.write_str(id),
            Self::Local(seq) => write!(f, "local-{seq}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderType {
    #[default]
    Customer,
    Agent,
}

/// Kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Document,
    Location,
    Sticker,
}

impl MessageType {
    /// Returns a preview label for the content kind, or None for plain text.
    pub fn display_label(&self) -> Option<&'static str> {
        match self {
            MessageType::Text => None,
            MessageType::Image => Some("[Image]"),
            MessageType::Audio => Some("[Audio]"),
            MessageType::Video => Some("[Video]"),
            MessageType::Document => Some("[Document]"),
            MessageType::Location => Some("[Location]"),
            MessageType::Sticker => Some("[Sticker]"),
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Audio => "audio",
            MessageType::Video => "video",
            MessageType::Document => "document",
            MessageType::Location => "location",
            MessageType::Sticker => "sticker",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "audio" => Some(MessageType::Audio),
            "video" => Some(MessageType::Video),
            "document" | "file" => Some(MessageType::Document),
            "location" => Some(MessageType::Location),
            "sticker" => Some(MessageType::Sticker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_type: SenderType,
    pub sender_user_id: Option<String>,
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Returns the preview content: media label + content, or just content for text.
    pub fn preview(&self) -> String {
        match (self.message_type.display_label(), self.content.is_empty()) {
            (Some(label), true) => label.to_owned(),
            (Some(label), false) => format!("{} {}", label, self.content),
            (None, _) => self.content.clone(),
        }
    }

    /// Whether `echo` is the server copy of this local placeholder.
    pub fn is_echoed_by(&self, echo: &Message) -> bool {
        self.id.is_local()
            && !echo.id.is_local()
            && self.chat_id == echo.chat_id
            && self.sender_user_id == echo.sender_user_id
            && self.message_type == echo.message_type
            && self.content == echo.content
            && (self.timestamp - echo.timestamp).abs()
                <= Duration::seconds(ECHO_MATCH_WINDOW_SECS)
    }
}
