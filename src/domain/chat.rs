use chrono::{DateTime, Utc};

use super::mutation::{ChatField, ChatMutation};

pub type ChatId = String;
pub type AgentId = String;
pub type TagId = String;
pub type OrgId = String;

/// Messaging platform the customer writes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Line,
    Telegram,
    WhatsApp,
    Messenger,
}

impl Platform {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Line => "LINE",
            Self::Telegram => "TELEGRAM",
            Self::WhatsApp => "WHATSAPP",
            Self::Messenger => "MESSENGER",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "LINE" => Some(Self::Line),
            "TELEGRAM" => Some(Self::Telegram),
            "WHATSAPP" => Some(Self::WhatsApp),
            "MESSENGER" => Some(Self::Messenger),
            _ => None,
        }
    }
}

/// Lifecycle status of a chat on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Closed,
}

impl ChatStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Assigned => "Assigned",
            Self::InProgress => "InProgress",
            Self::Closed => "Closed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "inprogress" | "in_progress" | "in-progress" => Some(Self::InProgress),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Hand-off state of an assignment.
///
/// On the wire this is a nullable boolean: `null` means the chat was never
/// offered, `false` means an offer awaits the agent's answer, `true` means
/// the agent accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptState {
    #[default]
    NotOffered,
    Offered,
    Accepted,
}

impl AcceptState {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            None => Self::NotOffered,
            Some(false) => Self::Offered,
            Some(true) => Self::Accepted,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::NotOffered => None,
            Self::Offered => Some(false),
            Self::Accepted => Some(true),
        }
    }

    pub fn is_pending(self) -> bool {
        self == Self::Offered
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub org_id: OrgId,
    /// Connected channel the chat arrived through.
    pub channel_id: Option<String>,
    pub display_name: String,
    pub platform: Platform,
    pub latest_message_preview: Option<String>,
    pub latest_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub assigned_agent_id: Option<AgentId>,
    pub accept_state: AcceptState,
    pub tag_id: Option<TagId>,
    pub note: Option<String>,
    pub status: ChatStatus,
}

impl ChatSummary {
    /// Assigns every field present in `mutation`. Returns whether anything changed.
    pub fn apply(&mut self, mutation: &ChatMutation) -> bool {
        let before = self.clone();

        if let Some(note) = &mutation.note {
            self.note = note.clone();
        }
        if let Some(tag_id) = &mutation.tag_id {
            self.tag_id = tag_id.clone();
        }
        if let Some(status) = mutation.status {
            self.status = status;
        }
        if let Some(agent) = &mutation.assigned_agent_id {
            self.assigned_agent_id = agent.clone();
        }
        if let Some(accept_state) = mutation.accept_state {
            self.accept_state = accept_state;
        }
        if let Some(unread_count) = mutation.unread_count {
            self.unread_count = unread_count;
        }

        *self != before
    }

    /// Captures the current values of `fields` as a patch that restores them.
    pub fn capture(&self, fields: &[ChatField]) -> ChatMutation {
        let mut patch = ChatMutation::new(self.chat_id.clone());
        for field in fields {
            match field {
                ChatField::Note => patch.note = Some(self.note.clone()),
                ChatField::Tag => patch.tag_id = Some(self.tag_id.clone()),
                ChatField::Status => patch.status = Some(self.status),
                ChatField::AssignedAgent => {
                    patch.assigned_agent_id = Some(self.assigned_agent_id.clone())
                }
                ChatField::Acceptance => patch.accept_state = Some(self.accept_state),
                ChatField::Unread => patch.unread_count = Some(self.unread_count),
            }
        }
        patch
    }
}
